use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::events::EventSink;
use crate::engine::state_machine;
use crate::error::{StoreError, TransitionError};
use crate::models::event::TrackingEvent;
use crate::models::order::{Order, OrderEvent};
use crate::observability::metrics::Metrics;
use crate::store::{with_deadline, CourierStore, OrderStore};

/// Commits order transitions through the store's versioned update and
/// publishes the result. Ending a dispatched order also hands its courier
/// back to the pool.
pub struct Lifecycle {
    orders: Arc<dyn OrderStore>,
    couriers: Arc<dyn CourierStore>,
    events: Arc<dyn EventSink>,
    deadline: Duration,
    metrics: Metrics,
}

impl Lifecycle {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        couriers: Arc<dyn CourierStore>,
        events: Arc<dyn EventSink>,
        deadline: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            couriers,
            events,
            deadline,
            metrics,
        }
    }

    pub async fn load(&self, order_id: Uuid) -> Result<Order, StoreError> {
        with_deadline(self.deadline, self.orders.get(order_id)).await
    }

    /// Applies `event` if the stored order is still at `expected_version`.
    pub async fn apply(
        &self,
        order_id: Uuid,
        expected_version: u64,
        event: OrderEvent,
    ) -> Result<Order, StoreError> {
        let releases_courier = matches!(
            event,
            OrderEvent::ConfirmDelivery | OrderEvent::AbortDispatch
        );
        let bound_courier = if releases_courier {
            let current = self.load(order_id).await?;
            if current.status_version != expected_version {
                return Err(StoreError::StaleVersion {
                    expected: expected_version,
                    actual: current.status_version,
                });
            }
            current.courier_id
        } else {
            None
        };

        let at = Utc::now();
        let mutation = event.clone();
        let updated = with_deadline(
            self.deadline,
            self.orders.conditional_update(
                order_id,
                expected_version,
                Box::new(move |current: &Order| {
                    state_machine::transition(current, &mutation, at)
                }),
            ),
        )
        .await?;

        self.metrics
            .lifecycle_transitions_total
            .with_label_values(&[&updated.status.to_string()])
            .inc();
        info!(
            order_id = %order_id,
            event = event.name(),
            status = %updated.status,
            status_version = updated.status_version,
            "order transitioned"
        );
        self.events.publish(TrackingEvent::status_changed(&updated));

        if let Some(courier_id) = bound_courier {
            self.release_courier(courier_id, order_id).await;
        }

        Ok(updated)
    }

    /// Entry point for transitions requested from outside the core. Courier
    /// binding is only reachable through the claim-protected dispatch saga.
    pub async fn advance(
        &self,
        order_id: Uuid,
        expected_version: u64,
        event: OrderEvent,
    ) -> Result<Order, StoreError> {
        if let OrderEvent::DispatchTo { .. } = event {
            let current = self.load(order_id).await?;
            return Err(StoreError::InvalidTransition(TransitionError {
                from: current.status,
                event: event.name(),
            }));
        }

        self.apply(order_id, expected_version, event).await
    }

    async fn release_courier(&self, courier_id: Uuid, order_id: Uuid) {
        match with_deadline(
            self.deadline,
            self.couriers.release_assignment(courier_id, order_id),
        )
        .await
        {
            Ok(_) => info!(courier_id = %courier_id, order_id = %order_id, "courier returned to pool"),
            Err(err) => warn!(
                courier_id = %courier_id,
                order_id = %order_id,
                error = %err,
                "failed to return courier to pool; reconciler will retry"
            ),
        }
    }
}
