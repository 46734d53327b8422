use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Amount;
use crate::domain::require::TripRequire;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Sent,
    Accepted,
    Rejected,
    Expired,
    Withdrawn,
}

/// A guide's price proposal against one trip request.
#[derive(Debug, Clone, Deserialize)]
pub struct Quotation {
    pub total: Amount,
    pub valid_until: NaiveDate,
    #[serde(default)]
    pub note: Option<String>,
}

/// A guide's offer on a `TripRequire`. The quotation fields are written once
/// at submission and read-only thereafter; only `status`, `decided_at` and
/// `decision_reason` change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripOffer {
    pub id: Uuid,
    pub require_id: Uuid,
    pub guide: Uuid,
    pub total: Amount,
    pub valid_until: NaiveDate,
    pub note: Option<String>,
    pub status: OfferStatus,
    pub decision_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TripOffer {
    /// Validates the quotation against the request's budget and trip window
    /// and creates the offer in `Sent`.
    pub fn submit(
        require: &TripRequire,
        guide: Uuid,
        quotation: Quotation,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !require.accepts_offers() {
            return Err(EngineError::AlreadyDecided);
        }
        let total = quotation.total.value();
        if total < require.min_budget || total > require.max_budget {
            return Err(EngineError::OutOfBudget);
        }
        if quotation.valid_until < today || quotation.valid_until > require.trip_start {
            return Err(EngineError::InvalidValidityWindow);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            require_id: require.id,
            guide,
            total: quotation.total,
            valid_until: quotation.valid_until,
            note: quotation.note,
            status: OfferStatus::Sent,
            decision_reason: None,
            created_at: now,
            decided_at: None,
        })
    }

    /// A `Sent` offer whose validity window has passed.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.status == OfferStatus::Sent && self.valid_until < today
    }

    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.decide(OfferStatus::Accepted, None, now)
    }

    pub fn reject(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.decide(OfferStatus::Rejected, reason, now)
    }

    pub fn withdraw(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.decide(OfferStatus::Withdrawn, None, now)
    }

    /// Time-driven terminal transition. Idempotent: expiring an already
    /// expired offer is a no-op.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        if self.status == OfferStatus::Sent {
            self.status = OfferStatus::Expired;
            self.decided_at = Some(now);
        }
    }

    fn decide(
        &mut self,
        status: OfferStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != OfferStatus::Sent {
            return Err(EngineError::AlreadyDecided);
        }
        self.status = status;
        self.decision_reason = reason;
        self.decided_at = Some(now);
        Ok(())
    }
}
