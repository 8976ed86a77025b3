//! DashMap-backed stores. Each conditional update runs under the shard
//! write lock of its record, which gives per-record compare-and-set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::geo::haversine_m;
use crate::models::courier::{Availability, Claim, ClaimToken, Courier, CourierCandidate, GeoPoint};
use crate::models::order::Order;
use crate::store::{CourierStore, OrderMutator, OrderStore};

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: DashMap<Uuid, Order>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, id: Uuid) -> Result<Order, StoreError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
    }

    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected_version: u64,
        mutator: OrderMutator,
    ) -> Result<Order, StoreError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;

        if entry.status_version != expected_version {
            return Err(StoreError::StaleVersion {
                expected: expected_version,
                actual: entry.status_version,
            });
        }

        let mut next = mutator(&*entry)?;
        next.id = entry.id;
        next.status_version = expected_version + 1;
        *entry = next.clone();

        Ok(next)
    }
}

#[derive(Default)]
pub struct MemoryCourierStore {
    couriers: DashMap<Uuid, Courier>,
}

impl MemoryCourierStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, courier_id: Uuid, apply: F) -> Result<Courier, StoreError>
    where
        F: FnOnce(&mut Courier) -> Result<(), StoreError>,
    {
        let mut entry = self
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| StoreError::NotFound(format!("courier {courier_id}")))?;

        let mut next = entry.value().clone();
        apply(&mut next)?;
        *entry = next.clone();

        Ok(next)
    }
}

fn owns_claim(courier: &Courier, token: ClaimToken) -> bool {
    courier.availability == Availability::Claimed && courier.claim_token() == Some(token)
}

#[async_trait]
impl CourierStore for MemoryCourierStore {
    async fn get(&self, id: Uuid) -> Result<Courier, StoreError> {
        self.couriers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("courier {id}")))
    }

    async fn insert(&self, courier: Courier) -> Result<(), StoreError> {
        self.couriers.insert(courier.id, courier);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Courier>, StoreError> {
        Ok(self
            .couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn nearest_available(
        &self,
        point: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> Result<Vec<CourierCandidate>, StoreError> {
        let mut candidates: Vec<CourierCandidate> = self
            .couriers
            .iter()
            .filter_map(|entry| {
                let courier = entry.value();
                if courier.availability != Availability::Available {
                    return None;
                }

                let distance_m = haversine_m(&courier.position, &point);
                (distance_m <= radius_m).then(|| CourierCandidate {
                    courier_id: courier.id,
                    distance_m,
                    position_updated_at: courier.position_updated_at,
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.rank_cmp(b));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn conditional_claim(&self, courier_id: Uuid, claim: Claim) -> Result<Courier, StoreError> {
        self.update(courier_id, |courier| {
            if courier.availability != Availability::Available {
                return Err(StoreError::AlreadyClaimed(courier_id));
            }
            courier.availability = Availability::Claimed;
            courier.claim = Some(claim);
            Ok(())
        })
    }

    async fn conditional_release(
        &self,
        courier_id: Uuid,
        token: ClaimToken,
    ) -> Result<Courier, StoreError> {
        self.update(courier_id, |courier| {
            if !owns_claim(courier, token) {
                return Err(StoreError::TokenMismatch(courier_id));
            }
            courier.availability = Availability::Available;
            courier.claim = None;
            Ok(())
        })
    }

    async fn conditional_confirm(
        &self,
        courier_id: Uuid,
        token: ClaimToken,
        order_id: Uuid,
    ) -> Result<Courier, StoreError> {
        self.update(courier_id, |courier| {
            if !owns_claim(courier, token) {
                return Err(StoreError::TokenMismatch(courier_id));
            }
            courier.availability = Availability::Busy;
            courier.claim = None;
            courier.active_order_id = Some(order_id);
            Ok(())
        })
    }

    async fn release_assignment(
        &self,
        courier_id: Uuid,
        order_id: Uuid,
    ) -> Result<Courier, StoreError> {
        self.update(courier_id, |courier| {
            if courier.availability != Availability::Busy
                || courier.active_order_id != Some(order_id)
            {
                return Err(StoreError::TokenMismatch(courier_id));
            }
            courier.availability = Availability::Available;
            courier.active_order_id = None;
            Ok(())
        })
    }

    async fn set_availability(
        &self,
        courier_id: Uuid,
        availability: Availability,
    ) -> Result<Courier, StoreError> {
        self.update(courier_id, |courier| {
            let permitted = matches!(
                (courier.availability, availability),
                (Availability::Available | Availability::Offline, Availability::Available)
                    | (Availability::Available | Availability::Offline, Availability::Offline)
            );
            if !permitted {
                return Err(StoreError::AlreadyClaimed(courier_id));
            }
            courier.availability = availability;
            Ok(())
        })
    }

    async fn update_position(
        &self,
        courier_id: Uuid,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Courier, StoreError> {
        self.update(courier_id, |courier| {
            if at <= courier.position_updated_at {
                return Err(StoreError::OutOfOrder(courier_id));
            }
            courier.position = position;
            courier.position_updated_at = at;
            Ok(())
        })
    }

    async fn claims_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Courier>, StoreError> {
        Ok(self
            .couriers
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .claim
                    .as_ref()
                    .is_some_and(|claim| claim.claimed_at <= cutoff)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}
