//! Adapter contracts for the two externally-owned record stores.
//!
//! Every mutation is a conditional update evaluated atomically per record:
//! orders are guarded by `status_version`, couriers by `availability` and
//! the claim token. No caller holds a lock across two calls.

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{StoreError, TransitionError};
use crate::models::courier::{Availability, Claim, ClaimToken, Courier, CourierCandidate, GeoPoint};
use crate::models::order::Order;

/// Computes the next order record from the current one. Runs while the
/// store holds the record, so it must not block.
pub type OrderMutator = Box<dyn FnOnce(&Order) -> Result<Order, TransitionError> + Send>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Order, StoreError>;

    async fn insert(&self, order: Order) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Order>, StoreError>;

    /// Applies `mutator` only if the stored `status_version` equals
    /// `expected_version`. The stored result carries `expected_version + 1`.
    async fn conditional_update(
        &self,
        id: Uuid,
        expected_version: u64,
        mutator: OrderMutator,
    ) -> Result<Order, StoreError>;
}

#[async_trait]
pub trait CourierStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Courier, StoreError>;

    async fn insert(&self, courier: Courier) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Courier>, StoreError>;

    /// Available couriers within `radius_m` of `point`, nearest first, at
    /// most `limit` rows. The result is a hint; availability may change
    /// before the caller acts on it.
    async fn nearest_available(
        &self,
        point: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> Result<Vec<CourierCandidate>, StoreError>;

    /// `available -> claimed`, or `AlreadyClaimed` if the courier is in any
    /// other state.
    async fn conditional_claim(&self, courier_id: Uuid, claim: Claim) -> Result<Courier, StoreError>;

    /// `claimed -> available` if `token` still owns the claim.
    async fn conditional_release(
        &self,
        courier_id: Uuid,
        token: ClaimToken,
    ) -> Result<Courier, StoreError>;

    /// `claimed -> busy` bound to `order_id` if `token` still owns the claim.
    async fn conditional_confirm(
        &self,
        courier_id: Uuid,
        token: ClaimToken,
        order_id: Uuid,
    ) -> Result<Courier, StoreError>;

    /// `busy -> available` if the courier is still bound to `order_id`.
    async fn release_assignment(&self, courier_id: Uuid, order_id: Uuid)
    -> Result<Courier, StoreError>;

    /// Toggles between `available` and `offline`. Claimed or busy couriers
    /// are rejected.
    async fn set_availability(
        &self,
        courier_id: Uuid,
        availability: Availability,
    ) -> Result<Courier, StoreError>;

    /// Last-writer-wins by `at`; reports not newer than the stored
    /// timestamp fail with `OutOfOrder`.
    async fn update_position(
        &self,
        courier_id: Uuid,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Courier, StoreError>;

    /// Claimed couriers whose claim was taken at or before `cutoff`.
    async fn claims_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Courier>, StoreError>;
}

/// Bounds an adapter call by `deadline`; expiry is reported as the adapter
/// being unavailable.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "deadline of {}ms exceeded",
            deadline.as_millis()
        ))),
    }
}
