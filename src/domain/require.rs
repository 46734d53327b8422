use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequireStatus {
    Open,
    InReview,
    Assigned,
    Completed,
    Cancelled,
}

/// The caller-supplied fields of a new trip request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTripRequire {
    pub min_budget: Decimal,
    pub max_budget: Decimal,
    pub trip_start: NaiveDate,
    pub trip_end: NaiveDate,
    pub group_size: u16,
    #[serde(default)]
    pub min_guide_rating: Option<Decimal>,
}

/// A traveler's posted need for a guide.
///
/// Mutated only by the negotiation manager; `status` moves to `Assigned`
/// exactly once, when one offer is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequire {
    pub id: Uuid,
    pub traveler: Uuid,
    pub min_budget: Decimal,
    pub max_budget: Decimal,
    pub trip_start: NaiveDate,
    pub trip_end: NaiveDate,
    pub group_size: u16,
    pub min_guide_rating: Option<Decimal>,
    pub status: RequireStatus,
    pub created_at: DateTime<Utc>,
}

impl TripRequire {
    pub fn post(traveler: Uuid, spec: NewTripRequire, now: DateTime<Utc>) -> Result<Self> {
        if spec.min_budget > spec.max_budget {
            return Err(EngineError::Validation(
                "minimum budget exceeds maximum budget".to_string(),
            ));
        }
        if spec.min_budget < Decimal::ZERO {
            return Err(EngineError::Validation(
                "budget cannot be negative".to_string(),
            ));
        }
        if spec.trip_start > spec.trip_end {
            return Err(EngineError::Validation(
                "trip start date is after the end date".to_string(),
            ));
        }
        if spec.group_size == 0 {
            return Err(EngineError::Validation(
                "group size must be at least one".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            traveler,
            min_budget: spec.min_budget,
            max_budget: spec.max_budget,
            trip_start: spec.trip_start,
            trip_end: spec.trip_end,
            group_size: spec.group_size,
            min_guide_rating: spec.min_guide_rating,
            status: RequireStatus::Open,
            created_at: now,
        })
    }

    /// Whether the request can still receive or decide offers.
    pub fn accepts_offers(&self) -> bool {
        matches!(self.status, RequireStatus::Open | RequireStatus::InReview)
    }
}
