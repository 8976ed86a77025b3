//! Dispatch saga: claim a courier, bind it to the order, confirm the claim,
//! then notify. A failed bind releases the claim; anything the saga cannot
//! clean up itself is left for the reconciler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DispatchPolicy;
use crate::engine::claim::ClaimService;
use crate::engine::lifecycle::Lifecycle;
use crate::engine::matcher::CourierMatcher;
use crate::error::{NotifyError, StoreError};
use crate::models::assignment::{AssignmentAttempt, AttemptOutcome, DispatchOutcome, FailureReason};
use crate::models::courier::ClaimToken;
use crate::models::order::{Order, OrderEvent, OrderStatus};
use crate::notify::NotificationGateway;
use crate::observability::metrics::Metrics;

pub struct AssignmentCoordinator {
    lifecycle: Arc<Lifecycle>,
    matcher: CourierMatcher,
    claims: Arc<ClaimService>,
    gateway: Arc<dyn NotificationGateway>,
    policy: DispatchPolicy,
    metrics: Metrics,
}

impl AssignmentCoordinator {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        matcher: CourierMatcher,
        claims: Arc<ClaimService>,
        gateway: Arc<dyn NotificationGateway>,
        policy: DispatchPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            lifecycle,
            matcher,
            claims,
            gateway,
            policy,
            metrics,
        }
    }

    /// Assigns the nearest claimable courier to a `ready` order. Safe to
    /// call repeatedly: an order already dispatched reports its courier
    /// without claiming again.
    pub async fn dispatch(&self, order_id: Uuid) -> DispatchOutcome {
        let start = Instant::now();

        let outcome = match self.run_saga(order_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "dispatch aborted");
                DispatchOutcome::Failed {
                    reason: failure_reason(&err),
                }
            }
        };

        let label = outcome.label();
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        self.metrics.dispatch_total.with_label_values(&[label]).inc();

        outcome
    }

    async fn run_saga(&self, order_id: Uuid) -> Result<DispatchOutcome, StoreError> {
        let order = self.lifecycle.load(order_id).await?;
        if let Some(outcome) = settled_outcome(&order) {
            return Ok(outcome);
        }

        let candidates = self
            .matcher
            .find_candidates(order.pickup, self.policy.radius_m, self.policy.candidate_limit)
            .await?;
        if candidates.is_empty() {
            info!(order_id = %order_id, radius_m = self.policy.radius_m, "no courier within radius");
            return Ok(self
                .settle_lost_race(order_id, DispatchOutcome::NoCourierAvailable)
                .await);
        }

        let mut attempt = AssignmentAttempt::new(order_id, candidates);
        let mut adapter_failures = 0;

        while let Some(courier_id) = attempt.next_candidate() {
            match self.claims.claim(courier_id, order_id).await {
                Ok(token) => {
                    let outcome = self.bind(&mut attempt, order, courier_id, token).await;
                    debug!(order_id = %order_id, outcome = ?attempt.outcome, "assignment attempt finished");
                    return Ok(outcome);
                }
                Err(StoreError::AlreadyClaimed(_)) => {
                    debug!(order_id = %order_id, courier_id = %courier_id, "candidate already claimed");
                }
                Err(err) => {
                    adapter_failures += 1;
                    warn!(
                        order_id = %order_id,
                        courier_id = %courier_id,
                        error = %err,
                        "claim failed; trying next candidate"
                    );
                }
            }
        }

        attempt.finish(AttemptOutcome::Failed);
        if adapter_failures == attempt.candidates.len() {
            return Ok(DispatchOutcome::Failed {
                reason: FailureReason::AdapterUnavailable,
            });
        }

        info!(order_id = %order_id, candidates = attempt.candidates.len(), "all candidates taken");
        Ok(self
            .settle_lost_race(order_id, DispatchOutcome::NoCourierAvailable)
            .await)
    }

    async fn bind(
        &self,
        attempt: &mut AssignmentAttempt,
        mut order: Order,
        courier_id: Uuid,
        token: ClaimToken,
    ) -> DispatchOutcome {
        let mut retried = false;

        loop {
            let event = OrderEvent::DispatchTo { courier_id };
            let err = match self
                .lifecycle
                .apply(order.id, order.status_version, event)
                .await
            {
                Ok(bound) => return self.complete(attempt, &bound, courier_id, token).await,
                Err(err) => err,
            };

            match err {
                StoreError::StaleVersion { .. } if !retried => {
                    retried = true;
                    let current = match self.lifecycle.load(order.id).await {
                        Ok(current) => current,
                        Err(load_err) => {
                            self.compensate(attempt, courier_id, token).await;
                            return DispatchOutcome::Failed {
                                reason: failure_reason(&load_err),
                            };
                        }
                    };

                    if current.status == OrderStatus::Ready {
                        debug!(order_id = %order.id, "order version moved; retrying bind");
                        order = current;
                        continue;
                    }

                    self.compensate(attempt, courier_id, token).await;
                    return match settled_outcome(&current) {
                        Some(outcome @ DispatchOutcome::Assigned { .. }) => outcome,
                        _ => DispatchOutcome::Failed {
                            reason: FailureReason::OrderChangedConcurrently,
                        },
                    };
                }
                StoreError::StaleVersion { .. } | StoreError::InvalidTransition(_) => {
                    self.compensate(attempt, courier_id, token).await;
                    return self
                        .settle_lost_race(
                            order.id,
                            DispatchOutcome::Failed {
                                reason: FailureReason::OrderChangedConcurrently,
                            },
                        )
                        .await;
                }
                err => return self.recover_unknown_bind(attempt, &order, courier_id, token, err).await,
            }
        }
    }

    /// The bind call failed without a definite answer; it may or may not
    /// have committed. Re-read to decide between rolling forward and
    /// compensating. If even that fails the claim is left to age out.
    async fn recover_unknown_bind(
        &self,
        attempt: &mut AssignmentAttempt,
        order: &Order,
        courier_id: Uuid,
        token: ClaimToken,
        err: StoreError,
    ) -> DispatchOutcome {
        warn!(order_id = %order.id, courier_id = %courier_id, error = %err, "bind outcome unknown");

        match self.lifecycle.load(order.id).await {
            Ok(current) if current.courier_id == Some(courier_id) => {
                self.complete(attempt, &current, courier_id, token).await
            }
            Ok(_) => {
                self.compensate(attempt, courier_id, token).await;
                DispatchOutcome::Failed {
                    reason: failure_reason(&err),
                }
            }
            Err(reload_err) => {
                attempt.finish(AttemptOutcome::Failed);
                warn!(
                    order_id = %order.id,
                    courier_id = %courier_id,
                    error = %reload_err,
                    "leaving claim for reconciliation"
                );
                DispatchOutcome::Failed {
                    reason: failure_reason(&err),
                }
            }
        }
    }

    /// A concurrent dispatcher may have bound the order while this run was
    /// losing candidates. Its assignment wins over the local `fallback`.
    async fn settle_lost_race(&self, order_id: Uuid, fallback: DispatchOutcome) -> DispatchOutcome {
        match self.lifecycle.load(order_id).await {
            Ok(current) => match settled_outcome(&current) {
                Some(assigned @ DispatchOutcome::Assigned { .. }) => {
                    debug!(order_id = %order_id, "order was dispatched by a concurrent run");
                    assigned
                }
                _ => fallback,
            },
            Err(err) => {
                debug!(order_id = %order_id, error = %err, "re-read after losing failed");
                fallback
            }
        }
    }

    async fn complete(
        &self,
        attempt: &mut AssignmentAttempt,
        order: &Order,
        courier_id: Uuid,
        token: ClaimToken,
    ) -> DispatchOutcome {
        if let Err(err) = self.claims.confirm(courier_id, token, order.id).await {
            warn!(
                order_id = %order.id,
                courier_id = %courier_id,
                error = %err,
                "claim confirmation failed; reconciler will roll it forward"
            );
        }

        attempt.finish(AttemptOutcome::Succeeded);
        info!(order_id = %order.id, courier_id = %courier_id, "order assigned");
        self.notify_in_background(courier_id, order);

        DispatchOutcome::Assigned { courier_id }
    }

    async fn compensate(&self, attempt: &mut AssignmentAttempt, courier_id: Uuid, token: ClaimToken) {
        match self.claims.release(courier_id, token).await {
            Ok(_) => {
                attempt.finish(AttemptOutcome::Compensated);
                info!(order_id = %attempt.order_id, courier_id = %courier_id, "claim released");
            }
            Err(err) => {
                attempt.finish(AttemptOutcome::Failed);
                warn!(
                    order_id = %attempt.order_id,
                    courier_id = %courier_id,
                    error = %err,
                    "claim release failed; reconciler will release it"
                );
            }
        }
    }

    fn notify_in_background(&self, courier_id: Uuid, order: &Order) {
        let message = format!(
            "New delivery {}: pick up at ({:.5}, {:.5})",
            order.id, order.pickup.lat, order.pickup.lng
        );
        let delivery = NotificationDelivery {
            gateway: self.gateway.clone(),
            timeout: self.policy.notify_timeout,
            max_retries: self.policy.notify_max_retries,
            retry_delay: self.policy.notify_retry_delay,
            metrics: self.metrics.clone(),
        };

        tokio::spawn(async move { delivery.deliver(courier_id, message).await });
    }
}

struct NotificationDelivery {
    gateway: Arc<dyn NotificationGateway>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    metrics: Metrics,
}

impl NotificationDelivery {
    async fn deliver(self, courier_id: Uuid, message: String) {
        for attempt in 0..=self.max_retries {
            let result = match tokio::time::timeout(
                self.timeout,
                self.gateway.notify(courier_id, &message),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Unavailable("deadline exceeded".to_string())),
            };

            match result {
                Ok(()) => {
                    self.metrics
                        .notifications_total
                        .with_label_values(&["delivered"])
                        .inc();
                    return;
                }
                Err(err) => {
                    self.metrics
                        .notifications_total
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(courier_id = %courier_id, attempt, error = %err, "courier notification failed");
                }
            }

            if attempt < self.max_retries {
                sleep(self.retry_delay * (attempt + 1)).await;
            }
        }

        self.metrics
            .notifications_total
            .with_label_values(&["abandoned"])
            .inc();
        error!(courier_id = %courier_id, "courier notification abandoned");
    }
}

/// Outcome for an order that is not eligible to start a new saga.
fn settled_outcome(order: &Order) -> Option<DispatchOutcome> {
    match (order.status, order.courier_id) {
        (OrderStatus::Ready, _) => None,
        (OrderStatus::Dispatched, Some(courier_id)) => Some(DispatchOutcome::Assigned { courier_id }),
        (status, _) => Some(DispatchOutcome::InvalidTransition { from: status }),
    }
}

fn failure_reason(err: &StoreError) -> FailureReason {
    match err {
        StoreError::NotFound(_) => FailureReason::OrderNotFound,
        StoreError::StaleVersion { .. } | StoreError::InvalidTransition(_) => {
            FailureReason::OrderChangedConcurrently
        }
        _ => FailureReason::AdapterUnavailable,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{failure_reason, settled_outcome};
    use crate::error::StoreError;
    use crate::models::assignment::{DispatchOutcome, FailureReason};
    use crate::models::courier::GeoPoint;
    use crate::models::order::{Order, OrderStatus};

    fn order_in(status: OrderStatus, courier_id: Option<Uuid>) -> Order {
        let mut order = Order::place(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.1, 0.1), Utc::now());
        order.status = status;
        order.courier_id = courier_id;
        order
    }

    #[test]
    fn ready_order_starts_a_saga() {
        assert_eq!(settled_outcome(&order_in(OrderStatus::Ready, None)), None);
    }

    #[test]
    fn dispatched_order_reports_its_courier() {
        let courier_id = Uuid::from_u128(5);
        assert_eq!(
            settled_outcome(&order_in(OrderStatus::Dispatched, Some(courier_id))),
            Some(DispatchOutcome::Assigned { courier_id })
        );
    }

    #[test]
    fn other_statuses_are_not_dispatchable() {
        for status in [OrderStatus::Pending, OrderStatus::Cancelled, OrderStatus::Delivered] {
            assert_eq!(
                settled_outcome(&order_in(status, None)),
                Some(DispatchOutcome::InvalidTransition { from: status })
            );
        }
    }

    #[test]
    fn store_errors_map_to_closed_failure_set() {
        assert_eq!(
            failure_reason(&StoreError::NotFound("order x".into())),
            FailureReason::OrderNotFound
        );
        assert_eq!(
            failure_reason(&StoreError::StaleVersion {
                expected: 1,
                actual: 2
            }),
            FailureReason::OrderChangedConcurrently
        );
        assert_eq!(
            failure_reason(&StoreError::Unavailable("down".into())),
            FailureReason::AdapterUnavailable
        );
    }
}
