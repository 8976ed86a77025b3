#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_dispatch::config::Config;
use courier_dispatch::engine::state_machine;
use courier_dispatch::error::{NotifyError, StoreError};
use courier_dispatch::models::courier::{
    Availability, Claim, ClaimToken, Courier, CourierCandidate, GeoPoint,
};
use courier_dispatch::models::order::{Order, OrderEvent, OrderStatus};
use courier_dispatch::notify::NotificationGateway;
use courier_dispatch::state::AppState;
use courier_dispatch::store::memory::{MemoryCourierStore, MemoryOrderStore};
use courier_dispatch::store::{CourierStore, OrderMutator, OrderStore};
use uuid::Uuid;

pub const PICKUP: GeoPoint = GeoPoint {
    lng: 79.86,
    lat: 6.93,
};
pub const DROPOFF: GeoPoint = GeoPoint {
    lng: 79.87,
    lat: 6.95,
};

const METERS_PER_DEGREE_LAT: f64 = 111_195.0;

pub fn north_of(point: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(point.lng, point.lat + meters / METERS_PER_DEGREE_LAT)
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auto_dispatch = false;
    config.policy.notify_retry_delay = Duration::from_millis(5);
    config
}

#[derive(Default)]
pub struct RecordingGateway {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingGateway {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn notify(&self, _courier_id: Uuid, _message: &str) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotifyError::Failed("sms relay rejected message".to_string()));
        }
        Ok(())
    }
}

pub fn state_with(orders: Arc<dyn OrderStore>, gateway: Arc<dyn NotificationGateway>) -> Arc<AppState> {
    Arc::new(AppState::with_adapters(
        test_config(),
        orders,
        Arc::new(MemoryCourierStore::new()),
        gateway,
    ))
}

/// Store calls in tests that simulate a hung adapter sleep far past this.
pub fn short_deadline_config() -> Config {
    let mut config = test_config();
    config.policy.store_timeout = Duration::from_millis(50);
    config
}

pub fn state_from(
    config: Config,
    orders: Arc<dyn OrderStore>,
    couriers: Arc<dyn CourierStore>,
) -> Arc<AppState> {
    Arc::new(AppState::with_adapters(
        config,
        orders,
        couriers,
        Arc::new(RecordingGateway::default()),
    ))
}

pub fn state() -> Arc<AppState> {
    state_with(
        Arc::new(MemoryOrderStore::new()),
        Arc::new(RecordingGateway::default()),
    )
}

pub async fn ready_order(state: &AppState) -> Order {
    let mut order = Order::place(PICKUP, DROPOFF, Utc::now());
    order.status = OrderStatus::Ready;
    order.status_version = 3;
    state.orders.insert(order.clone()).await.unwrap();
    order
}

pub async fn courier_at(state: &AppState, position: GeoPoint) -> Courier {
    let courier = Courier::onboard("rider", position, Utc::now());
    state.couriers.insert(courier.clone()).await.unwrap();
    courier
}

const HUNG_CALL: Duration = Duration::from_secs(5);

fn unreachable(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} unreachable"))
}

/// How the order store misbehaves on versioned writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// The write lands but the caller sees a transport error.
    CommitThenError,
    /// The write never returns.
    Hang,
    /// The write fails and the store stays unreachable until `heal`.
    Outage,
}

pub struct FlakyOrders {
    inner: MemoryOrderStore,
    fault: WriteFault,
    down: AtomicBool,
}

impl FlakyOrders {
    pub fn new(fault: WriteFault) -> Self {
        Self {
            inner: MemoryOrderStore::new(),
            fault,
            down: AtomicBool::new(false),
        }
    }

    pub fn heal(&self) {
        self.down.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(unreachable("order store"));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for FlakyOrders {
    async fn get(&self, id: Uuid) -> Result<Order, StoreError> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        self.check()?;
        self.inner.insert(order).await
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        self.check()?;
        self.inner.list().await
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected_version: u64,
        mutator: OrderMutator,
    ) -> Result<Order, StoreError> {
        self.check()?;
        match self.fault {
            WriteFault::CommitThenError => {
                self.inner
                    .conditional_update(id, expected_version, mutator)
                    .await?;
                Err(unreachable("order store"))
            }
            WriteFault::Hang => {
                tokio::time::sleep(HUNG_CALL).await;
                self.inner
                    .conditional_update(id, expected_version, mutator)
                    .await
            }
            WriteFault::Outage => {
                self.down.store(true, Ordering::SeqCst);
                Err(unreachable("order store"))
            }
        }
    }
}

/// Interference on the courier side of a dispatch.
pub enum CourierScript {
    /// Every claim attempt fails as if the store were unreachable.
    ClaimsUnavailable,
    /// The candidate scan never returns.
    ScanHangs,
    /// Right after the first scan, another dispatcher claims, binds and
    /// confirms the nearest candidate for the ready order in `orders`.
    RivalWinsAfterScan { orders: Arc<dyn OrderStore> },
}

pub struct ScriptedCouriers {
    inner: MemoryCourierStore,
    script: CourierScript,
    rival_ran: AtomicBool,
}

impl ScriptedCouriers {
    pub fn new(script: CourierScript) -> Self {
        Self {
            inner: MemoryCourierStore::new(),
            script,
            rival_ran: AtomicBool::new(false),
        }
    }

    async fn rival_dispatch(
        &self,
        orders: &Arc<dyn OrderStore>,
        courier_id: Uuid,
    ) -> Result<(), StoreError> {
        let order = orders
            .list()
            .await?
            .into_iter()
            .find(|order| order.status == OrderStatus::Ready)
            .ok_or_else(|| StoreError::NotFound("ready order".to_string()))?;

        let claim = Claim {
            token: ClaimToken::generate(),
            order_id: order.id,
            claimed_at: Utc::now(),
        };
        let token = claim.token;
        self.inner.conditional_claim(courier_id, claim).await?;
        orders
            .conditional_update(
                order.id,
                order.status_version,
                Box::new(move |current: &Order| {
                    state_machine::transition(
                        current,
                        &OrderEvent::DispatchTo { courier_id },
                        Utc::now(),
                    )
                }),
            )
            .await?;
        self.inner
            .conditional_confirm(courier_id, token, order.id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CourierStore for ScriptedCouriers {
    async fn get(&self, id: Uuid) -> Result<Courier, StoreError> {
        self.inner.get(id).await
    }

    async fn insert(&self, courier: Courier) -> Result<(), StoreError> {
        self.inner.insert(courier).await
    }

    async fn list(&self) -> Result<Vec<Courier>, StoreError> {
        self.inner.list().await
    }

    async fn nearest_available(
        &self,
        point: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> Result<Vec<CourierCandidate>, StoreError> {
        if let CourierScript::ScanHangs = self.script {
            tokio::time::sleep(HUNG_CALL).await;
        }

        let rows = self.inner.nearest_available(point, radius_m, limit).await?;

        if let CourierScript::RivalWinsAfterScan { orders } = &self.script {
            if let Some(first) = rows.first() {
                if !self.rival_ran.swap(true, Ordering::SeqCst) {
                    self.rival_dispatch(orders, first.courier_id).await?;
                }
            }
        }

        Ok(rows)
    }

    async fn conditional_claim(&self, courier_id: Uuid, claim: Claim) -> Result<Courier, StoreError> {
        if let CourierScript::ClaimsUnavailable = self.script {
            return Err(unreachable("courier store"));
        }
        self.inner.conditional_claim(courier_id, claim).await
    }

    async fn conditional_release(
        &self,
        courier_id: Uuid,
        token: ClaimToken,
    ) -> Result<Courier, StoreError> {
        self.inner.conditional_release(courier_id, token).await
    }

    async fn conditional_confirm(
        &self,
        courier_id: Uuid,
        token: ClaimToken,
        order_id: Uuid,
    ) -> Result<Courier, StoreError> {
        self.inner
            .conditional_confirm(courier_id, token, order_id)
            .await
    }

    async fn release_assignment(
        &self,
        courier_id: Uuid,
        order_id: Uuid,
    ) -> Result<Courier, StoreError> {
        self.inner.release_assignment(courier_id, order_id).await
    }

    async fn set_availability(
        &self,
        courier_id: Uuid,
        availability: Availability,
    ) -> Result<Courier, StoreError> {
        self.inner.set_availability(courier_id, availability).await
    }

    async fn update_position(
        &self,
        courier_id: Uuid,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Courier, StoreError> {
        self.inner.update_position(courier_id, position, at).await
    }

    async fn claims_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Courier>, StoreError> {
        self.inner.claims_older_than(cutoff).await
    }
}
