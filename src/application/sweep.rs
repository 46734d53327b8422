use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::dispute::DisputeResolution;
use crate::application::ledger::{LedgerRef, LedgerReconciliation};
use crate::application::lifecycle::BookingLifecycle;
use crate::application::negotiation::OfferNegotiation;
use crate::domain::booking::{BookingStatus, TransitionKind};
use crate::domain::ports::{BookingStoreRef, ClockRef};
use crate::error::{EngineError, Result};

/// What one sweep pass actually did. Empty on a quiet system.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub expired_offers: Vec<Uuid>,
    pub ledger: LedgerReconciliation,
    pub finalized: Vec<(Uuid, BookingStatus)>,
    pub auto_confirmed: Vec<Uuid>,
}

/// Periodic repair pass. Safe to run at any time, any number of times:
/// every step is keyed on state that only moves forward.
///
/// Order matters: the ledger is read-repaired first so that in-flight
/// bookings can be finalized from settled entries, and expired offers are
/// swept before the no-show deadline so a pass leaves no newly-actionable
/// work behind.
pub struct ReconciliationSweep {
    negotiation: Arc<OfferNegotiation>,
    lifecycle: Arc<BookingLifecycle>,
    disputes: Arc<DisputeResolution>,
    ledger: LedgerRef,
    bookings: BookingStoreRef,
    clock: ClockRef,
    dispute_window: Duration,
}

impl ReconciliationSweep {
    pub fn new(
        negotiation: Arc<OfferNegotiation>,
        lifecycle: Arc<BookingLifecycle>,
        disputes: Arc<DisputeResolution>,
        ledger: LedgerRef,
        bookings: BookingStoreRef,
        clock: ClockRef,
        dispute_window: Duration,
    ) -> Self {
        Self {
            negotiation,
            lifecycle,
            disputes,
            ledger,
            bookings,
            clock,
            dispute_window,
        }
    }

    pub async fn run(&self) -> Result<SweepReport> {
        let mut report = SweepReport {
            expired_offers: self.negotiation.expire_stale_offers().await?,
            ledger: self.ledger.reconcile().await?,
            ..Default::default()
        };

        for booking in self.bookings.list_in_flight().await? {
            let outcome = match booking.in_flight {
                Some(TransitionKind::ResolveDispute) => {
                    self.disputes.resolve_in_flight(booking.id).await
                }
                Some(_) => self.lifecycle.resolve_in_flight(booking.id).await,
                None => continue,
            };
            match outcome {
                Ok(Some(status)) => report.finalized.push((booking.id, status)),
                Ok(None) => {}
                Err(err) => {
                    warn!(booking_id = %booking.id, %err, "in-flight finalization failed")
                }
            }
        }

        let deadline = self.clock.now() - self.dispute_window;
        for booking in self
            .bookings
            .list_by_status(BookingStatus::NoShowReported)
            .await?
        {
            let Some(reported_at) = booking.no_show_reported_at else {
                continue;
            };
            if reported_at > deadline {
                continue;
            }
            match self.lifecycle.auto_confirm_no_show(booking.id).await {
                Ok(_) => report.auto_confirmed.push(booking.id),
                // Entries left pending are the next pass's problem.
                Err(EngineError::PaymentPending(_)) => {}
                Err(err) => {
                    warn!(booking_id = %booking.id, %err, "no-show auto-confirm failed")
                }
            }
        }

        if !report.expired_offers.is_empty()
            || !report.ledger.repaired.is_empty()
            || !report.ledger.failed.is_empty()
            || !report.finalized.is_empty()
            || !report.auto_confirmed.is_empty()
        {
            info!(
                expired = report.expired_offers.len(),
                repaired = report.ledger.repaired.len(),
                failed = report.ledger.failed.len(),
                finalized = report.finalized.len(),
                auto_confirmed = report.auto_confirmed.len(),
                "reconciliation sweep completed"
            );
        }
        Ok(report)
    }
}
