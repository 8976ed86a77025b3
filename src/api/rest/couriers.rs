use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::tracking::{IngestOutcome, RejectReason};
use crate::error::AppError;
use crate::geo::is_valid;
use crate::models::courier::{Availability, Courier, GeoPoint};
use crate::models::order::OrderStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id", get(get_courier))
        .route("/couriers/:id/availability", patch(update_availability))
        .route("/couriers/:id/position", post(report_position))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub position: GeoPoint,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub availability: Availability,
}

#[derive(Deserialize)]
pub struct PositionReportRequest {
    pub lng: f64,
    pub lat: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct PositionReportResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
}

impl From<IngestOutcome> for PositionReportResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Accepted { transitioned } => Self {
                accepted: true,
                reason: None,
                order_status: transitioned,
            },
            IngestOutcome::Rejected { reason } => Self {
                accepted: false,
                reason: Some(reason),
                order_status: None,
            },
        }
    }
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if !is_valid(&payload.position) {
        return Err(AppError::BadRequest(
            "position must be a valid coordinate".to_string(),
        ));
    }

    let courier = Courier::onboard(payload.name, payload.position, Utc::now());
    state.couriers.insert(courier.clone()).await?;
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Courier>>, AppError> {
    Ok(Json(state.couriers.list().await?))
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Courier>, AppError> {
    Ok(Json(state.couriers.get(id).await?))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Courier>, AppError> {
    if !matches!(
        payload.availability,
        Availability::Available | Availability::Offline
    ) {
        return Err(AppError::BadRequest(format!(
            "availability {} is managed by dispatch",
            payload.availability
        )));
    }

    Ok(Json(
        state
            .couriers
            .set_availability(id, payload.availability)
            .await?,
    ))
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PositionReportRequest>,
) -> Json<PositionReportResponse> {
    let outcome = state
        .ingest
        .report_position(id, GeoPoint::new(payload.lng, payload.lat), payload.timestamp)
        .await;
    Json(outcome.into())
}
