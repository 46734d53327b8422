use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::ledger::LedgerRef;
use crate::application::locks::LockRegistry;
use crate::domain::actor::{Actor, Role};
use crate::domain::booking::{BookingStatus, TransitionKind, TripBooking};
use crate::domain::dispute::{DisputeDecision, DisputeReport, DisputeStatus};
use crate::domain::payment::{EntryState, ledger_key};
use crate::domain::ports::{
    BookingStoreRef, ClockRef, DisputeStoreRef, Notification, NotifierRef, PaymentStoreRef,
};
use crate::error::{EngineError, Result};

const KEY_RESOLVE_RELEASE: &str = "resolve-release";
const KEY_RESOLVE_REFUND: &str = "resolve-refund";

/// Consumes a disputed no-show booking and an admin decision, and performs
/// the final settlement through the escrow ledger.
pub struct DisputeResolution {
    bookings: BookingStoreRef,
    disputes: DisputeStoreRef,
    payments: PaymentStoreRef,
    ledger: LedgerRef,
    locks: Arc<LockRegistry>,
    notifier: NotifierRef,
    clock: ClockRef,
}

impl DisputeResolution {
    pub fn new(
        bookings: BookingStoreRef,
        disputes: DisputeStoreRef,
        payments: PaymentStoreRef,
        ledger: LedgerRef,
        locks: Arc<LockRegistry>,
        notifier: NotifierRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            bookings,
            disputes,
            payments,
            ledger,
            locks,
            notifier,
            clock,
        }
    }

    /// Traveler contests a guide's no-show report. Evidence is an opaque
    /// reference into the external file store and is optional.
    pub async fn file(
        &self,
        actor: Actor,
        booking_id: Uuid,
        description: String,
        evidence_ref: Option<String>,
    ) -> Result<DisputeReport> {
        let _guard = self.locks.acquire(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        if !actor.is(Role::Traveler) || actor.id != booking.traveler {
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                event: "dispute-no-show",
            });
        }
        if booking.status == BookingStatus::NoShowDisputed {
            if let Some(existing) = self.disputes.get_by_booking(booking_id).await? {
                return Ok(existing);
            }
        }
        booking.ensure(BookingStatus::NoShowReported, "dispute-no-show")?;
        if description.trim().is_empty() {
            return Err(EngineError::Validation(
                "a dispute description is required".to_string(),
            ));
        }

        let now = self.clock.now();
        let dispute = DisputeReport::file(
            booking_id,
            booking.traveler,
            booking.guide,
            description,
            evidence_ref,
            now,
        );
        booking.status = BookingStatus::NoShowDisputed;
        self.bookings.store(booking.clone()).await?;
        self.disputes.store(dispute.clone()).await?;
        info!(%booking_id, dispute_id = %dispute.id, "no-show report disputed");
        self.emit(booking.guide, booking_id, "no-show-disputed").await;
        Ok(dispute)
    }

    /// Admin arbitration: records the decision and mandatory justification,
    /// settles the escrow per the decision table, and moves the booking to
    /// its decision-specific terminal status, as one unit. Re-invocation on
    /// a resolved dispute fails with `AlreadyResolved`.
    pub async fn resolve(
        &self,
        actor: Actor,
        booking_id: Uuid,
        decision: DisputeDecision,
        justification: String,
    ) -> Result<DisputeReport> {
        let (mut dispute, guide_share, refund) = {
            let guard = self.locks.acquire(booking_id).await;
            let mut booking = self.load_booking(booking_id).await?;
            if !actor.is(Role::Admin) {
                return Err(EngineError::InvalidTransition {
                    from: booking.status,
                    event: "resolve-dispute",
                });
            }

            let mut dispute = self
                .disputes
                .get_by_booking(booking_id)
                .await?
                .ok_or(EngineError::NotFound("dispute", booking_id))?;
            if dispute.status == DisputeStatus::Resolved {
                return Err(EngineError::AlreadyResolved);
            }
            booking.ensure(BookingStatus::NoShowDisputed, "resolve-dispute")?;

            // Once any settlement entry has applied, the recorded decision is
            // locked in: a retry must re-drive the same decision.
            let release_state = self.entry_state(booking_id, KEY_RESOLVE_RELEASE).await?;
            let refund_state = self.entry_state(booking_id, KEY_RESOLVE_REFUND).await?;
            let settlement_started = release_state == Some(EntryState::Applied)
                || refund_state == Some(EntryState::Applied);
            if settlement_started && dispute.decision != Some(decision) {
                return Err(EngineError::Validation(
                    "settlement already started under a different decision".to_string(),
                ));
            }

            // The decision is recorded provisionally before the settlement;
            // the dispute only becomes Resolved once the money has moved.
            dispute.record_decision(decision, justification)?;
            self.disputes.store(dispute.clone()).await?;

            let payment = self
                .payments
                .get_payment(booking_id)
                .await?
                .ok_or(EngineError::NotFound("payment", booking_id))?;
            // A share that already went out must not be paid twice on a retry.
            let guide_share = if release_state == Some(EntryState::Applied) {
                Decimal::ZERO
            } else {
                decision.guide_share(payment.total)
            };
            let refund = payment.total - payment.released - payment.refunded - guide_share;

            booking.in_flight = Some(TransitionKind::ResolveDispute);
            self.bookings.store(booking).await?;
            drop(guard);
            (dispute, guide_share, refund)
        };

        let result = self.settle(booking_id, guide_share, refund).await;

        let _guard = self.locks.acquire(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        match result {
            Ok(()) => {
                let now = self.clock.now();
                dispute.mark_resolved(now);
                booking.status = decision.terminal_status();
                booking.in_flight = None;
                booking.closed_at = Some(now);
                self.disputes.store(dispute.clone()).await?;
                self.bookings.store(booking.clone()).await?;
                info!(
                    %booking_id,
                    ?decision,
                    status = %booking.status,
                    "dispute resolved"
                );
                self.emit(booking.traveler, booking_id, "dispute-resolved").await;
                self.emit(booking.guide, booking_id, "dispute-resolved").await;
                Ok(dispute)
            }
            Err(err @ EngineError::PaymentPending(_)) => Err(err),
            Err(err) => {
                booking.in_flight = None;
                self.bookings.store(booking).await?;
                Err(err)
            }
        }
    }

    /// Sweep hook: finalizes a resolution whose settlement was interrupted.
    pub async fn resolve_in_flight(&self, booking_id: Uuid) -> Result<Option<BookingStatus>> {
        {
            let _guard = self.locks.acquire(booking_id).await;
            let booking = self.load_booking(booking_id).await?;
            if booking.in_flight != Some(TransitionKind::ResolveDispute) {
                return Ok(None);
            }
        }

        let dispute = self
            .disputes
            .get_by_booking(booking_id)
            .await?
            .ok_or(EngineError::NotFound("dispute", booking_id))?;
        let Some(decision) = dispute.decision else {
            return Ok(None);
        };

        let release_state = self.entry_state(booking_id, KEY_RESOLVE_RELEASE).await?;
        let refund_state = self.entry_state(booking_id, KEY_RESOLVE_REFUND).await?;

        if release_state == Some(EntryState::Failed) || refund_state == Some(EntryState::Failed) {
            let _guard = self.locks.acquire(booking_id).await;
            let mut booking = self.load_booking(booking_id).await?;
            booking.in_flight = None;
            self.bookings.store(booking.clone()).await?;
            warn!(%booking_id, "dispute settlement rolled back by sweep");
            return Ok(Some(booking.status));
        }
        if release_state == Some(EntryState::Pending) || refund_state == Some(EntryState::Pending) {
            return Ok(None);
        }

        // Everything applied (or the release was not needed): re-drive the
        // settlement; idempotency makes completed steps no-ops.
        let payment = self
            .payments
            .get_payment(booking_id)
            .await?
            .ok_or(EngineError::NotFound("payment", booking_id))?;
        let guide_share = match release_state {
            Some(EntryState::Applied) => Decimal::ZERO,
            _ => decision.guide_share(payment.total),
        };
        let refund = payment.total - payment.released - payment.refunded - guide_share;
        self.settle(booking_id, guide_share, refund).await?;

        let _guard = self.locks.acquire(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;
        let now = self.clock.now();
        let mut dispute = dispute;
        dispute.mark_resolved(now);
        booking.status = decision.terminal_status();
        booking.in_flight = None;
        booking.closed_at = Some(now);
        self.disputes.store(dispute).await?;
        self.bookings.store(booking.clone()).await?;
        info!(%booking_id, "dispute resolution committed by sweep");
        Ok(Some(booking.status))
    }

    async fn settle(
        &self,
        booking_id: Uuid,
        guide_share: Decimal,
        refund: Decimal,
    ) -> Result<()> {
        if guide_share > Decimal::ZERO {
            self.ledger
                .release(
                    booking_id,
                    guide_share,
                    &ledger_key(booking_id, KEY_RESOLVE_RELEASE),
                )
                .await?;
        }
        if refund > Decimal::ZERO {
            self.ledger
                .refund(
                    booking_id,
                    refund,
                    &ledger_key(booking_id, KEY_RESOLVE_REFUND),
                )
                .await?;
        }
        Ok(())
    }

    async fn emit(&self, recipient: Uuid, booking_id: Uuid, event: &'static str) {
        let notification = Notification {
            recipient,
            booking_id: Some(booking_id),
            event,
        };
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(%booking_id, %err, "notification emission failed");
        }
    }

    async fn entry_state(&self, booking_id: Uuid, suffix: &str) -> Result<Option<EntryState>> {
        Ok(self
            .payments
            .get_entry(&ledger_key(booking_id, suffix))
            .await?
            .map(|e| e.state))
    }

    async fn load_booking(&self, booking_id: Uuid) -> Result<TripBooking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(EngineError::NotFound("booking", booking_id))
    }
}
