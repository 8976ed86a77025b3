use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DispatchPolicy;
use crate::engine::events::EventSink;
use crate::engine::lifecycle::Lifecycle;
use crate::error::StoreError;
use crate::geo::{haversine_m, is_valid};
use crate::models::courier::{Availability, Courier, GeoPoint};
use crate::models::event::TrackingEvent;
use crate::models::order::{Order, OrderEvent, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::store::{with_deadline, CourierStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidPosition,
    OutOfOrder,
    UnknownCourier,
    StoreUnavailable,
}

impl RejectReason {
    fn label(self) -> &'static str {
        match self {
            RejectReason::InvalidPosition => "invalid_position",
            RejectReason::OutOfOrder => "out_of_order",
            RejectReason::UnknownCourier => "unknown_courier",
            RejectReason::StoreUnavailable => "store_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// `transitioned` carries the order's new status when this report
    /// triggered an arrival.
    Accepted { transitioned: Option<OrderStatus> },
    Rejected { reason: RejectReason },
}

/// Accepts courier position reports and turns proximity to the bound
/// order's pickup or dropoff into lifecycle transitions.
pub struct PositionIngest {
    couriers: Arc<dyn CourierStore>,
    lifecycle: Arc<Lifecycle>,
    events: Arc<dyn EventSink>,
    policy: DispatchPolicy,
    metrics: Metrics,
}

impl PositionIngest {
    pub fn new(
        couriers: Arc<dyn CourierStore>,
        lifecycle: Arc<Lifecycle>,
        events: Arc<dyn EventSink>,
        policy: DispatchPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            couriers,
            lifecycle,
            events,
            policy,
            metrics,
        }
    }

    pub async fn report_position(
        &self,
        courier_id: Uuid,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> IngestOutcome {
        let outcome = self.ingest(courier_id, position, at).await;

        let label = match &outcome {
            IngestOutcome::Accepted { .. } => "accepted",
            IngestOutcome::Rejected { reason } => reason.label(),
        };
        self.metrics
            .position_reports_total
            .with_label_values(&[label])
            .inc();

        outcome
    }

    async fn ingest(&self, courier_id: Uuid, position: GeoPoint, at: DateTime<Utc>) -> IngestOutcome {
        if !is_valid(&position) {
            return IngestOutcome::Rejected {
                reason: RejectReason::InvalidPosition,
            };
        }

        let courier = match with_deadline(
            self.policy.store_timeout,
            self.couriers.update_position(courier_id, position, at),
        )
        .await
        {
            Ok(courier) => courier,
            Err(err) => {
                let reason = match err {
                    StoreError::OutOfOrder(_) => RejectReason::OutOfOrder,
                    StoreError::NotFound(_) => RejectReason::UnknownCourier,
                    _ => RejectReason::StoreUnavailable,
                };
                debug!(courier_id = %courier_id, error = %err, "position report rejected");
                return IngestOutcome::Rejected { reason };
            }
        };

        self.events.publish(TrackingEvent::Position {
            courier_id,
            order_id: courier.active_order_id,
            position,
            at,
        });

        IngestOutcome::Accepted {
            transitioned: self.evaluate_proximity(&courier).await,
        }
    }

    async fn evaluate_proximity(&self, courier: &Courier) -> Option<OrderStatus> {
        if courier.availability != Availability::Busy {
            return None;
        }
        let order_id = courier.active_order_id?;

        let order = match self.lifecycle.load(order_id).await {
            Ok(order) => order,
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "could not load bound order");
                return None;
            }
        };
        if order.courier_id != Some(courier.id) {
            return None;
        }

        let event = arrival_event(&order, courier.position, &self.policy)?;

        match self
            .lifecycle
            .apply(order.id, order.status_version, event)
            .await
        {
            Ok(updated) => Some(updated.status),
            Err(StoreError::StaleVersion { .. }) => {
                debug!(order_id = %order.id, "arrival already recorded by a concurrent writer");
                None
            }
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "arrival transition failed");
                None
            }
        }
    }
}

/// Arrival fires once the courier is strictly closer than the radius.
fn arrival_event(order: &Order, position: GeoPoint, policy: &DispatchPolicy) -> Option<OrderEvent> {
    match order.status {
        OrderStatus::Dispatched if haversine_m(&position, &order.pickup) < policy.pickup_radius_m => {
            Some(OrderEvent::ArrivedAtPickup)
        }
        OrderStatus::ArrivedPickup
            if haversine_m(&position, &order.dropoff) < policy.dropoff_radius_m =>
        {
            Some(OrderEvent::ArrivedAtDropoff)
        }
        _ => None,
    }
}
