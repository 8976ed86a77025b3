use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Claimed,
    Busy,
    Offline,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Availability::Available => "available",
            Availability::Claimed => "claimed",
            Availability::Busy => "busy",
            Availability::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Opaque reservation token handed out by a successful claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ClaimToken(pub Uuid);

impl ClaimToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub token: ClaimToken,
    pub order_id: Uuid,
    pub claimed_at: DateTime<Utc>,
}

/// `claim` is `Some` exactly while `availability` is `Claimed`, and
/// `active_order_id` is `Some` exactly while it is `Busy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub availability: Availability,
    pub position: GeoPoint,
    pub position_updated_at: DateTime<Utc>,
    pub claim: Option<Claim>,
    pub active_order_id: Option<Uuid>,
}

impl Courier {
    pub fn onboard(name: impl Into<String>, position: GeoPoint, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            availability: Availability::Available,
            position,
            position_updated_at: at,
            claim: None,
            active_order_id: None,
        }
    }

    pub fn claim_token(&self) -> Option<ClaimToken> {
        self.claim.as_ref().map(|claim| claim.token)
    }
}

/// Row returned by the geospatial "nearest available" query.
#[derive(Debug, Clone, PartialEq)]
pub struct CourierCandidate {
    pub courier_id: Uuid,
    pub distance_m: f64,
    pub position_updated_at: DateTime<Utc>,
}

impl CourierCandidate {
    /// Nearest first, then freshest position report, then id.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance_m
            .total_cmp(&other.distance_m)
            .then_with(|| other.position_updated_at.cmp(&self.position_updated_at))
            .then_with(|| self.courier_id.cmp(&other.courier_id))
    }
}
