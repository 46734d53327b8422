use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Amount;
use crate::domain::offer::TripOffer;
use crate::domain::require::TripRequire;
use crate::error::{EngineError, Result};

/// Booking lifecycle states.
///
/// ```text
/// pending_payment ─┬─> cancelled
///                  └─> paid ─┬─> trip_started ──> trip_completed
///                            ├─> no_show_confirmed          (traveler self-report)
///                            └─> no_show_reported ─┬─> no_show_confirmed   (deadline)
///                                                  └─> no_show_disputed ─┬─> no_show_confirmed (guide wins)
///                                                                        ├─> no_show_refunded  (user wins)
///                                                                        └─> no_show_split     (split cost)
/// ```
///
/// Once money is captured the only exits are the normal or no-show paths;
/// `Cancelled` is reachable from `PendingPayment` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Cancelled,
    Paid,
    TripStarted,
    TripCompleted,
    NoShowReported,
    NoShowDisputed,
    NoShowConfirmed,
    NoShowRefunded,
    NoShowSplit,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled
                | BookingStatus::TripCompleted
                | BookingStatus::NoShowConfirmed
                | BookingStatus::NoShowRefunded
                | BookingStatus::NoShowSplit
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Paid => "paid",
            BookingStatus::TripStarted => "trip_started",
            BookingStatus::TripCompleted => "trip_completed",
            BookingStatus::NoShowReported => "no_show_reported",
            BookingStatus::NoShowDisputed => "no_show_disputed",
            BookingStatus::NoShowConfirmed => "no_show_confirmed",
            BookingStatus::NoShowRefunded => "no_show_refunded",
            BookingStatus::NoShowSplit => "no_show_split",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The settlement-touching transition currently outstanding on a booking.
///
/// Set while the per-booking lock is released for the duration of the
/// external processor call; any other transition arriving in that window is
/// answered with "still processing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Capture,
    ConfirmArrival,
    ConfirmComplete,
    ConfirmNoShow,
    ResolveDispute,
}

impl TransitionKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            TransitionKind::Capture => "confirm-payment",
            TransitionKind::ConfirmArrival => "confirm-arrival",
            TransitionKind::ConfirmComplete => "confirm-complete",
            TransitionKind::ConfirmNoShow => "confirm-no-show",
            TransitionKind::ResolveDispute => "resolve-dispute",
        }
    }
}

/// A paid-for trip, created exactly once when an offer is accepted, 1:1 with
/// the accepted offer. `total` is copied from the quotation and immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripBooking {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub require_id: Uuid,
    pub traveler: Uuid,
    pub guide: Uuid,
    pub total: Amount,
    pub status: BookingStatus,
    pub in_flight: Option<TransitionKind>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub no_show_reported_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TripBooking {
    pub fn from_accepted_offer(
        offer: &TripOffer,
        require: &TripRequire,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            offer_id: offer.id,
            require_id: require.id,
            traveler: require.traveler,
            guide: offer.guide,
            total: offer.total,
            status: BookingStatus::PendingPayment,
            in_flight: None,
            created_at: now,
            paid_at: None,
            started_at: None,
            no_show_reported_at: None,
            closed_at: None,
        }
    }

    /// Guard for a transition: the booking must be exactly in `expected` with
    /// no settlement outstanding.
    pub fn ensure(&self, expected: BookingStatus, event: &'static str) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(EngineError::PaymentPending(self.id));
        }
        if self.status != expected {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                event,
            });
        }
        Ok(())
    }

    /// Guard for actor standing: the right party, identified by id.
    pub fn ensure_party(&self, actor_id: Uuid, party: Uuid, event: &'static str) -> Result<()> {
        if actor_id != party {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                event,
            });
        }
        Ok(())
    }
}
