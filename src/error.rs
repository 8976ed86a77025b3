use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::OrderStatus;

/// A lifecycle move that is not permitted from the current status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot apply {event} to order in status {from}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub event: &'static str,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("stale version: expected {expected}, found {actual}")]
    StaleVersion { expected: u64, actual: u64 },

    #[error("courier {0} is already claimed")]
    AlreadyClaimed(Uuid),

    #[error("claim token does not match for courier {0}")]
    TokenMismatch(Uuid),

    #[error("position report for courier {0} is out of order")]
    OutOfOrder(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification failed: {0}")]
    Failed(String),

    #[error("notification gateway unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("stale version: {0}")]
    StaleVersion(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::StaleVersion(_) => "stale_version",
            AppError::Unavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StoreError::StaleVersion { .. } => AppError::StaleVersion(err.to_string()),
            StoreError::InvalidTransition(inner) => AppError::InvalidTransition(inner.to_string()),
            StoreError::AlreadyClaimed(_) | StoreError::TokenMismatch(_) => {
                AppError::InvalidTransition(err.to_string())
            }
            StoreError::OutOfOrder(_) => AppError::BadRequest(err.to_string()),
            StoreError::Unavailable(msg) => AppError::Unavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::StaleVersion(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message
        }));

        (status, body).into_response()
    }
}
