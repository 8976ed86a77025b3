use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::DispatchPolicy;
use crate::engine::claim::ClaimService;
use crate::engine::lifecycle::Lifecycle;
use crate::error::StoreError;
use crate::models::courier::{Availability, Courier};
use crate::observability::metrics::Metrics;
use crate::store::{with_deadline, CourierStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale claims handed back to `available`.
    pub released: usize,
    /// Stale claims whose order was already bound, promoted to `busy`.
    pub confirmed: usize,
    /// Busy couriers whose order had already ended.
    pub unbound: usize,
    pub failed: usize,
}

/// Periodic cleanup for claims abandoned between claim and confirm, and
/// for couriers left busy after their order ended.
pub struct Reconciler {
    couriers: Arc<dyn CourierStore>,
    lifecycle: Arc<Lifecycle>,
    claims: Arc<ClaimService>,
    policy: DispatchPolicy,
    metrics: Metrics,
}

impl Reconciler {
    pub fn new(
        couriers: Arc<dyn CourierStore>,
        lifecycle: Arc<Lifecycle>,
        claims: Arc<ClaimService>,
        policy: DispatchPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            couriers,
            lifecycle,
            claims,
            policy,
            metrics,
        }
    }

    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.policy.reconcile_interval.as_secs(),
            claim_timeout_secs = self.policy.claim_timeout.as_secs(),
            "reconciler started"
        );

        let mut ticker = interval(self.policy.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.sweep(Utc::now()).await {
                Ok(report) if report != SweepReport::default() => {
                    info!(?report, "reconciliation sweep");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "reconciliation sweep failed"),
            }
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let timeout = chrono::Duration::from_std(self.policy.claim_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let stale = with_deadline(
            self.policy.store_timeout,
            self.couriers.claims_older_than(now - timeout),
        )
        .await?;
        for courier in stale {
            self.resolve_claim(&courier, &mut report).await;
        }

        let couriers = with_deadline(self.policy.store_timeout, self.couriers.list()).await?;
        for courier in couriers
            .iter()
            .filter(|courier| courier.availability == Availability::Busy)
        {
            self.resolve_busy(courier, &mut report).await;
        }

        Ok(report)
    }

    async fn resolve_claim(&self, courier: &Courier, report: &mut SweepReport) {
        let Some(claim) = courier.claim.clone() else {
            return;
        };

        let bound = match self.lifecycle.load(claim.order_id).await {
            Ok(order) => order.courier_id == Some(courier.id) && order.status.is_in_flight(),
            Err(StoreError::NotFound(_)) => false,
            Err(err) => {
                warn!(courier_id = %courier.id, order_id = %claim.order_id, error = %err, "cannot resolve stale claim");
                report.failed += 1;
                return;
            }
        };

        let (action, result) = if bound {
            (
                "confirmed",
                self.claims
                    .confirm(courier.id, claim.token, claim.order_id)
                    .await,
            )
        } else {
            ("released", self.claims.release(courier.id, claim.token).await)
        };

        match result {
            Ok(_) => {
                if bound {
                    report.confirmed += 1;
                } else {
                    report.released += 1;
                }
                self.metrics
                    .reconciled_claims_total
                    .with_label_values(&[action])
                    .inc();
                info!(courier_id = %courier.id, order_id = %claim.order_id, action, "stale claim resolved");
            }
            // the claim moved on between the scan and this update
            Err(StoreError::TokenMismatch(_)) => {}
            Err(err) => {
                report.failed += 1;
                warn!(courier_id = %courier.id, error = %err, "stale claim update failed");
            }
        }
    }

    async fn resolve_busy(&self, courier: &Courier, report: &mut SweepReport) {
        let Some(order_id) = courier.active_order_id else {
            return;
        };

        let still_bound = match self.lifecycle.load(order_id).await {
            Ok(order) => order.courier_id == Some(courier.id) && order.status.is_in_flight(),
            Err(StoreError::NotFound(_)) => false,
            Err(_) => return,
        };
        if still_bound {
            return;
        }

        match with_deadline(
            self.policy.store_timeout,
            self.couriers.release_assignment(courier.id, order_id),
        )
        .await
        {
            Ok(_) => {
                report.unbound += 1;
                self.metrics
                    .reconciled_claims_total
                    .with_label_values(&["unbound"])
                    .inc();
            }
            Err(StoreError::TokenMismatch(_)) => {}
            Err(err) => {
                report.failed += 1;
                warn!(courier_id = %courier.id, order_id = %order_id, error = %err, "failed to unbind courier");
            }
        }
    }
}
