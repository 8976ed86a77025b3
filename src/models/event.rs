use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;
use crate::models::order::{Order, OrderStatus};

/// Pushed to tracking subscribers. Delivery is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    Position {
        courier_id: Uuid,
        order_id: Option<Uuid>,
        position: GeoPoint,
        at: DateTime<Utc>,
    },
    OrderStatus {
        order_id: Uuid,
        courier_id: Option<Uuid>,
        status: OrderStatus,
        status_version: u64,
        at: DateTime<Utc>,
    },
}

impl TrackingEvent {
    pub fn status_changed(order: &Order) -> Self {
        TrackingEvent::OrderStatus {
            order_id: order.id,
            courier_id: order.courier_id,
            status: order.status,
            status_version: order.status_version,
            at: order.updated_at,
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            TrackingEvent::Position { order_id, .. } => *order_id,
            TrackingEvent::OrderStatus { order_id, .. } => Some(*order_id),
        }
    }
}
