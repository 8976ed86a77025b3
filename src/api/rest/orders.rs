use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::is_valid;
use crate::models::assignment::DispatchOutcome;
use crate::models::courier::GeoPoint;
use crate::models::order::{Order, OrderEvent, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/dispatch", post(dispatch_order))
        .route("/orders/:id/advance", post(advance_order))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub event: OrderEvent,
    pub status_version: u64,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if !is_valid(&payload.pickup) || !is_valid(&payload.dropoff) {
        return Err(AppError::BadRequest(
            "pickup and dropoff must be valid coordinates".to_string(),
        ));
    }

    let order = Order::place(payload.pickup, payload.dropoff, Utc::now());
    state.orders.insert(order.clone()).await?;

    info!(order_id = %order.id, "order placed");
    Ok(Json(order))
}

async fn list_orders(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders.list().await?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.load(id).await?))
}

async fn dispatch_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchOutcome>, AppError> {
    match state.coordinator.dispatch(id).await {
        DispatchOutcome::InvalidTransition { from } => Err(AppError::InvalidTransition(format!(
            "order {id} cannot be dispatched from {from}"
        ))),
        outcome => Ok(Json(outcome)),
    }
}

async fn advance_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .lifecycle
        .advance(id, payload.status_version, payload.event)
        .await?;

    if order.status == OrderStatus::Ready && state.config.auto_dispatch {
        let coordinator = state.coordinator.clone();
        tokio::spawn(async move {
            let outcome = coordinator.dispatch(id).await;
            info!(order_id = %id, outcome = outcome.label(), "auto-dispatch finished");
        });
    }

    Ok(Json(order))
}
