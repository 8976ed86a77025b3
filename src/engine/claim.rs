use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::courier::{Claim, ClaimToken, Courier};
use crate::observability::metrics::Metrics;
use crate::store::{with_deadline, CourierStore};

/// Claim, release and confirm a courier. Each call is one conditional
/// update on the courier record; there is no in-process locking.
pub struct ClaimService {
    couriers: Arc<dyn CourierStore>,
    deadline: Duration,
    metrics: Metrics,
}

impl ClaimService {
    pub fn new(couriers: Arc<dyn CourierStore>, deadline: Duration, metrics: Metrics) -> Self {
        Self {
            couriers,
            deadline,
            metrics,
        }
    }

    /// Reserves `courier_id` for `order_id`. Fails with `AlreadyClaimed` when
    /// the courier is not `available`.
    pub async fn claim(&self, courier_id: Uuid, order_id: Uuid) -> Result<ClaimToken, StoreError> {
        let claim = Claim {
            token: ClaimToken::generate(),
            order_id,
            claimed_at: Utc::now(),
        };
        let token = claim.token;

        let result = with_deadline(
            self.deadline,
            self.couriers.conditional_claim(courier_id, claim),
        )
        .await;

        let label = match &result {
            Ok(_) => "claimed",
            Err(StoreError::AlreadyClaimed(_)) => "already_claimed",
            Err(_) => "error",
        };
        self.metrics.claims_total.with_label_values(&[label]).inc();

        result.map(|_| {
            debug!(courier_id = %courier_id, order_id = %order_id, claim_token = %token, "courier claimed");
            token
        })
    }

    pub async fn release(&self, courier_id: Uuid, token: ClaimToken) -> Result<Courier, StoreError> {
        with_deadline(
            self.deadline,
            self.couriers.conditional_release(courier_id, token),
        )
        .await
    }

    pub async fn confirm(
        &self,
        courier_id: Uuid,
        token: ClaimToken,
        order_id: Uuid,
    ) -> Result<Courier, StoreError> {
        with_deadline(
            self.deadline,
            self.couriers.conditional_confirm(courier_id, token, order_id),
        )
        .await
    }
}
