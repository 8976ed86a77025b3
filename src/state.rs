use std::sync::Arc;

use crate::config::Config;
use crate::engine::assignment::AssignmentCoordinator;
use crate::engine::claim::ClaimService;
use crate::engine::events::{BroadcastSink, EventSink};
use crate::engine::lifecycle::Lifecycle;
use crate::engine::matcher::CourierMatcher;
use crate::engine::reconciler::Reconciler;
use crate::engine::tracking::PositionIngest;
use crate::notify::{LogGateway, NotificationGateway, WebhookGateway};
use crate::observability::metrics::Metrics;
use crate::store::memory::{MemoryCourierStore, MemoryOrderStore};
use crate::store::{CourierStore, OrderStore};

pub struct AppState {
    pub config: Config,
    pub orders: Arc<dyn OrderStore>,
    pub couriers: Arc<dyn CourierStore>,
    pub lifecycle: Arc<Lifecycle>,
    pub coordinator: Arc<AssignmentCoordinator>,
    pub ingest: PositionIngest,
    pub reconciler: Arc<Reconciler>,
    pub events: BroadcastSink,
    pub metrics: Metrics,
}

impl AppState {
    /// In-memory stores, with the webhook gateway when one is configured.
    pub fn new(config: Config) -> Self {
        let gateway: Arc<dyn NotificationGateway> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookGateway::new(url.clone())),
            None => Arc::new(LogGateway),
        };

        Self::with_adapters(
            config,
            Arc::new(MemoryOrderStore::new()),
            Arc::new(MemoryCourierStore::new()),
            gateway,
        )
    }

    pub fn with_adapters(
        config: Config,
        orders: Arc<dyn OrderStore>,
        couriers: Arc<dyn CourierStore>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        let metrics = Metrics::new();
        let policy = config.policy.clone();
        let events = BroadcastSink::new(config.event_buffer_size);
        let sink: Arc<dyn EventSink> = Arc::new(events.clone());

        let lifecycle = Arc::new(Lifecycle::new(
            orders.clone(),
            couriers.clone(),
            sink.clone(),
            policy.store_timeout,
            metrics.clone(),
        ));
        let claims = Arc::new(ClaimService::new(
            couriers.clone(),
            policy.store_timeout,
            metrics.clone(),
        ));
        let coordinator = Arc::new(AssignmentCoordinator::new(
            lifecycle.clone(),
            CourierMatcher::new(couriers.clone(), policy.store_timeout),
            claims.clone(),
            gateway,
            policy.clone(),
            metrics.clone(),
        ));
        let ingest = PositionIngest::new(
            couriers.clone(),
            lifecycle.clone(),
            sink,
            policy.clone(),
            metrics.clone(),
        );
        let reconciler = Arc::new(Reconciler::new(
            couriers.clone(),
            lifecycle.clone(),
            claims,
            policy,
            metrics.clone(),
        ));

        Self {
            config,
            orders,
            couriers,
            lifecycle,
            coordinator,
            ingest,
            reconciler,
            events,
            metrics,
        }
    }
}
