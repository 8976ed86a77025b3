use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::StoreError;
use crate::models::courier::{CourierCandidate, GeoPoint};
use crate::store::{with_deadline, CourierStore};

/// Produces ranked, non-binding candidate lists. Correctness against
/// concurrent dispatchers comes from the claim, not from this query.
pub struct CourierMatcher {
    couriers: Arc<dyn CourierStore>,
    deadline: Duration,
}

impl CourierMatcher {
    pub fn new(couriers: Arc<dyn CourierStore>, deadline: Duration) -> Self {
        Self { couriers, deadline }
    }

    pub async fn find_candidates(
        &self,
        pickup: GeoPoint,
        max_radius_m: f64,
        limit: usize,
    ) -> Result<Vec<Uuid>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = with_deadline(
            self.deadline,
            self.couriers.nearest_available(pickup, max_radius_m, limit),
        )
        .await?;

        Ok(rank_candidates(rows, max_radius_m, limit))
    }
}

/// Drops rows outside the radius and orders the rest by distance, then
/// freshest position report, then id. Adapters are expected to do this
/// already; it is repeated so ranking never depends on adapter behaviour.
pub fn rank_candidates(
    mut rows: Vec<CourierCandidate>,
    max_radius_m: f64,
    limit: usize,
) -> Vec<Uuid> {
    rows.retain(|row| row.distance_m <= max_radius_m);
    rows.sort_by(|a, b| a.rank_cmp(b));
    rows.into_iter()
        .take(limit)
        .map(|row| row.courier_id)
        .collect()
}
