//! Outbound courier notifications. Delivery is at-least-once; receivers
//! are expected to be idempotent.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::NotifyError;

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, courier_id: Uuid, message: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when no webhook is configured.
pub struct LogGateway;

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn notify(&self, courier_id: Uuid, message: &str) -> Result<(), NotifyError> {
        info!(courier_id = %courier_id, message, "courier notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    courier_id: Uuid,
    message: &'a str,
}

/// Posts notifications as JSON to an SMS/push relay.
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
}

impl WebhookGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationGateway for WebhookGateway {
    async fn notify(&self, courier_id: Uuid, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                courier_id,
                message,
            })
            .send()
            .await
            .map_err(|err| NotifyError::Unavailable(err.to_string()))?;

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|err| NotifyError::Failed(err.to_string()))
    }
}
