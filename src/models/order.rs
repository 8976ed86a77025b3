use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Preparing,
    Ready,
    Dispatched,
    ArrivedPickup,
    ArrivedDropoff,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Dispatched,
        OrderStatus::ArrivedPickup,
        OrderStatus::ArrivedDropoff,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Position along the delivery path. `Cancelled` sits off the path.
    pub fn rank(self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Accepted => Some(1),
            OrderStatus::Preparing => Some(2),
            OrderStatus::Ready => Some(3),
            OrderStatus::Dispatched => Some(4),
            OrderStatus::ArrivedPickup => Some(5),
            OrderStatus::ArrivedDropoff => Some(6),
            OrderStatus::Delivered => Some(7),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Statuses in which the order must carry a courier binding.
    pub fn requires_courier(self) -> bool {
        matches!(
            self,
            OrderStatus::Dispatched
                | OrderStatus::ArrivedPickup
                | OrderStatus::ArrivedDropoff
                | OrderStatus::Delivered
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Accepted | OrderStatus::Preparing | OrderStatus::Ready
        )
    }

    /// Dispatched but not yet delivered: the courier is out on the road.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            OrderStatus::Dispatched | OrderStatus::ArrivedPickup | OrderStatus::ArrivedDropoff
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Dispatched => "dispatched",
            OrderStatus::ArrivedPickup => "arrived_pickup",
            OrderStatus::ArrivedDropoff => "arrived_dropoff",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Accept,
    StartPreparing,
    MarkReady,
    DispatchTo { courier_id: Uuid },
    ArrivedAtPickup,
    ArrivedAtDropoff,
    ConfirmDelivery,
    Cancel,
    AbortDispatch,
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Accept => "accept",
            OrderEvent::StartPreparing => "start_preparing",
            OrderEvent::MarkReady => "mark_ready",
            OrderEvent::DispatchTo { .. } => "dispatch_to",
            OrderEvent::ArrivedAtPickup => "arrived_at_pickup",
            OrderEvent::ArrivedAtDropoff => "arrived_at_dropoff",
            OrderEvent::ConfirmDelivery => "confirm_delivery",
            OrderEvent::Cancel => "cancel",
            OrderEvent::AbortDispatch => "abort_dispatch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub courier_id: Option<Uuid>,
    pub status_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn place(pickup: GeoPoint, dropoff: GeoPoint, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            pickup,
            dropoff,
            courier_id: None,
            status_version: 0,
            created_at: at,
            updated_at: at,
        }
    }
}
