use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::ledger::LedgerRef;
use crate::application::locks::LockRegistry;
use crate::domain::actor::{Actor, Role};
use crate::domain::booking::{BookingStatus, TransitionKind, TripBooking};
use crate::domain::payment::{EntryKind, EntryState, TripPayment, ledger_key};
use crate::domain::ports::{BookingStoreRef, ClockRef, Notification, NotifierRef, PaymentStoreRef};
use crate::error::{EngineError, Result};

const KEY_CAPTURE: &str = "capture";
const KEY_ARRIVAL_RELEASE: &str = "arrival-release";
const KEY_COMPLETE_RELEASE: &str = "complete-release";
const KEY_NO_SHOW_RELEASE: &str = "no-show-release";
const KEY_NO_SHOW_REFUND: &str = "no-show-refund";

/// One planned ledger mutation of a settlement-touching transition.
type LedgerOp = (EntryKind, Decimal, String);

/// Drives a booking through its state machine and the escrow ledger.
///
/// All mutations serialize per booking. Transitions that call the processor
/// do not hold the lock across the external call: the booking is parked in
/// an `in_flight` sub-state, the lock is released, and the transition is
/// committed (or rolled back) after the ledger reports the outcome.
pub struct BookingLifecycle {
    bookings: BookingStoreRef,
    payments: PaymentStoreRef,
    ledger: LedgerRef,
    locks: Arc<LockRegistry>,
    notifier: NotifierRef,
    clock: ClockRef,
}

impl BookingLifecycle {
    pub fn new(
        bookings: BookingStoreRef,
        payments: PaymentStoreRef,
        ledger: LedgerRef,
        locks: Arc<LockRegistry>,
        notifier: NotifierRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            bookings,
            payments,
            ledger,
            locks,
            notifier,
            clock,
        }
    }

    /// A booking that was never paid can be abandoned. Once money is
    /// captured the only exits are the normal or no-show paths.
    pub async fn cancel(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        let _guard = self.locks.acquire(booking_id).await;
        let mut booking = self.load(booking_id).await?;
        self.ensure_role(&booking, actor, Role::Traveler, booking.traveler, "cancel")?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }
        booking.ensure(BookingStatus::PendingPayment, "cancel")?;

        booking.status = BookingStatus::Cancelled;
        booking.closed_at = Some(self.clock.now());
        self.bookings.store(booking.clone()).await?;
        info!(%booking_id, "booking cancelled before payment");
        self.emit(booking.guide, booking_id, "booking-cancelled").await;
        Ok(booking)
    }

    /// Returns the processor client token for the traveler to pay with.
    /// Capture itself only happens on processor confirmation.
    pub async fn create_payment_intent(&self, actor: Actor, booking_id: Uuid) -> Result<String> {
        let _guard = self.locks.acquire(booking_id).await;
        let booking = self.load(booking_id).await?;
        self.ensure_role(&booking, actor, Role::Traveler, booking.traveler, "payment-intent")?;
        booking.ensure(BookingStatus::PendingPayment, "payment-intent")?;
        self.ledger.create_intent(booking_id).await
    }

    /// Processor confirmation callback: captures 100% of the booking total.
    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
        processor_ref: &str,
    ) -> Result<TripBooking> {
        let kind = TransitionKind::Capture;
        let ops = {
            let guard = self.locks.acquire(booking_id).await;
            let booking = self.load(booking_id).await?;
            if booking.status == BookingStatus::Paid && booking.in_flight.is_none() {
                return Ok(booking);
            }
            booking.ensure(BookingStatus::PendingPayment, kind.event_name())?;

            let payment = self.load_payment(booking_id).await?;
            // The callback is only trusted against an intent we created.
            match &payment.processor_ref {
                Some(reference) if reference == processor_ref => {}
                Some(_) => {
                    return Err(EngineError::Validation(
                        "processor reference does not match the payment intent".to_string(),
                    ));
                }
                None => {
                    return Err(EngineError::Validation(
                        "no payment intent on file".to_string(),
                    ));
                }
            }

            let ops = vec![(
                EntryKind::Capture,
                payment.total,
                ledger_key(booking_id, KEY_CAPTURE),
            )];
            self.park(booking, kind).await?;
            drop(guard);
            ops
        };

        let result = self.apply_ops(booking_id, &ops).await;
        self.finish(booking_id, BookingStatus::Paid, result).await
    }

    /// Traveler confirms the guide arrived: releases the first 50% tranche.
    pub async fn confirm_arrival(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        let kind = TransitionKind::ConfirmArrival;
        let ops = {
            let guard = self.locks.acquire(booking_id).await;
            let booking = self.load(booking_id).await?;
            self.ensure_role(&booking, actor, Role::Traveler, booking.traveler, kind.event_name())?;
            if booking.status == BookingStatus::TripStarted && booking.in_flight.is_none() {
                return Ok(booking);
            }
            booking.ensure(BookingStatus::Paid, kind.event_name())?;

            let ops = vec![(
                EntryKind::Release,
                booking.total.half(),
                ledger_key(booking_id, KEY_ARRIVAL_RELEASE),
            )];
            self.park(booking, kind).await?;
            drop(guard);
            ops
        };

        let result = self.apply_ops(booking_id, &ops).await;
        self.finish(booking_id, BookingStatus::TripStarted, result)
            .await
    }

    /// Traveler confirms the trip finished: releases the exact remainder.
    pub async fn confirm_complete(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        let kind = TransitionKind::ConfirmComplete;
        let ops = {
            let guard = self.locks.acquire(booking_id).await;
            let booking = self.load(booking_id).await?;
            self.ensure_role(&booking, actor, Role::Traveler, booking.traveler, kind.event_name())?;
            if booking.status == BookingStatus::TripCompleted && booking.in_flight.is_none() {
                return Ok(booking);
            }
            booking.ensure(BookingStatus::TripStarted, kind.event_name())?;

            let payment = self.load_payment(booking_id).await?;
            let ops = vec![(
                EntryKind::Release,
                payment.total - payment.released,
                ledger_key(booking_id, KEY_COMPLETE_RELEASE),
            )];
            self.park(booking, kind).await?;
            drop(guard);
            ops
        };

        let result = self.apply_ops(booking_id, &ops).await;
        self.finish(booking_id, BookingStatus::TripCompleted, result)
            .await
    }

    /// Traveler self-reports their own absence: immediate 50/50 settlement,
    /// no dispute possible afterwards.
    pub async fn confirm_no_show(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        {
            let _guard = self.locks.acquire(booking_id).await;
            let booking = self.load(booking_id).await?;
            self.ensure_role(
                &booking,
                actor,
                Role::Traveler,
                booking.traveler,
                TransitionKind::ConfirmNoShow.event_name(),
            )?;
        }
        self.settle_no_show(booking_id, BookingStatus::Paid).await
    }

    /// Guide reports the traveler absent. Escrow stays untouched; the
    /// dispute window starts ticking.
    pub async fn report_no_show(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        let _guard = self.locks.acquire(booking_id).await;
        let mut booking = self.load(booking_id).await?;
        self.ensure_role(&booking, actor, Role::Guide, booking.guide, "report-no-show")?;
        if booking.status == BookingStatus::NoShowReported && booking.in_flight.is_none() {
            return Ok(booking);
        }
        booking.ensure(BookingStatus::Paid, "report-no-show")?;

        booking.status = BookingStatus::NoShowReported;
        booking.no_show_reported_at = Some(self.clock.now());
        self.bookings.store(booking.clone()).await?;
        info!(%booking_id, "guide reported traveler no-show");
        self.emit(booking.traveler, booking_id, "no-show-reported").await;
        Ok(booking)
    }

    /// Deadline path: an undisputed guide report converges on the same
    /// settlement (and idempotency keys) as a traveler self-report.
    pub async fn auto_confirm_no_show(&self, booking_id: Uuid) -> Result<TripBooking> {
        self.settle_no_show(booking_id, BookingStatus::NoShowReported)
            .await
    }

    /// Finalizes a booking parked in an `in_flight` sub-state after the
    /// ledger has been reconciled: commits the transition when its entries
    /// all applied, rolls the sub-state back when one definitely failed, and
    /// completes a half-finished two-op settlement. Dispute resolutions are
    /// finalized by the dispute engine instead.
    pub async fn resolve_in_flight(&self, booking_id: Uuid) -> Result<Option<BookingStatus>> {
        let kind = {
            let _guard = self.locks.acquire(booking_id).await;
            let booking = self.load(booking_id).await?;
            match booking.in_flight {
                Some(TransitionKind::ResolveDispute) | None => return Ok(None),
                Some(kind) => kind,
            }
        };

        let target = match kind {
            TransitionKind::Capture => {
                match self.entry_state(booking_id, KEY_CAPTURE).await? {
                    Some(EntryState::Applied) => Some(BookingStatus::Paid),
                    Some(EntryState::Failed) => None,
                    _ => return Ok(None),
                }
            }
            TransitionKind::ConfirmArrival => {
                match self.entry_state(booking_id, KEY_ARRIVAL_RELEASE).await? {
                    Some(EntryState::Applied) => Some(BookingStatus::TripStarted),
                    Some(EntryState::Failed) => None,
                    _ => return Ok(None),
                }
            }
            TransitionKind::ConfirmComplete => {
                match self.entry_state(booking_id, KEY_COMPLETE_RELEASE).await? {
                    Some(EntryState::Applied) => Some(BookingStatus::TripCompleted),
                    Some(EntryState::Failed) => None,
                    _ => return Ok(None),
                }
            }
            TransitionKind::ConfirmNoShow => {
                let release = self.entry_state(booking_id, KEY_NO_SHOW_RELEASE).await?;
                let refund = self.entry_state(booking_id, KEY_NO_SHOW_REFUND).await?;
                match (release, refund) {
                    (Some(EntryState::Applied), Some(EntryState::Applied)) => {
                        Some(BookingStatus::NoShowConfirmed)
                    }
                    (Some(EntryState::Failed), _) | (_, Some(EntryState::Failed)) => None,
                    (Some(EntryState::Applied), None) => {
                        // The release committed but the refund was never
                        // attempted; finish the settlement now.
                        let payment = self.load_payment(booking_id).await?;
                        self.ledger
                            .refund(
                                booking_id,
                                payment.total - payment.released - payment.refunded,
                                &ledger_key(booking_id, KEY_NO_SHOW_REFUND),
                            )
                            .await?;
                        Some(BookingStatus::NoShowConfirmed)
                    }
                    _ => return Ok(None),
                }
            }
            TransitionKind::ResolveDispute => unreachable!("filtered above"),
        };

        let _guard = self.locks.acquire(booking_id).await;
        let mut booking = self.load(booking_id).await?;
        if booking.in_flight != Some(kind) {
            return Ok(None);
        }
        match target {
            Some(status) => {
                self.stamp(&mut booking, status);
                self.bookings.store(booking.clone()).await?;
                info!(%booking_id, %status, "in-flight transition committed by sweep");
                Ok(Some(status))
            }
            None => {
                booking.in_flight = None;
                self.bookings.store(booking.clone()).await?;
                warn!(%booking_id, ?kind, "in-flight transition rolled back by sweep");
                Ok(Some(booking.status))
            }
        }
    }

    async fn settle_no_show(
        &self,
        booking_id: Uuid,
        expected: BookingStatus,
    ) -> Result<TripBooking> {
        let kind = TransitionKind::ConfirmNoShow;
        let ops = {
            let guard = self.locks.acquire(booking_id).await;
            let booking = self.load(booking_id).await?;
            if booking.status == BookingStatus::NoShowConfirmed && booking.in_flight.is_none() {
                return Ok(booking);
            }
            booking.ensure(expected, kind.event_name())?;

            let first = booking.total.half();
            let remainder = booking.total.value() - first;
            let ops = vec![
                (
                    EntryKind::Release,
                    first,
                    ledger_key(booking_id, KEY_NO_SHOW_RELEASE),
                ),
                (
                    EntryKind::Refund,
                    remainder,
                    ledger_key(booking_id, KEY_NO_SHOW_REFUND),
                ),
            ];
            self.park(booking, kind).await?;
            drop(guard);
            ops
        };

        let result = self.apply_ops(booking_id, &ops).await;
        self.finish(booking_id, BookingStatus::NoShowConfirmed, result)
            .await
    }

    /// Parks the booking in its pending sub-state before the lock is dropped
    /// for the processor call.
    async fn park(&self, mut booking: TripBooking, kind: TransitionKind) -> Result<()> {
        booking.in_flight = Some(kind);
        self.bookings.store(booking).await
    }

    async fn apply_ops(&self, booking_id: Uuid, ops: &[LedgerOp]) -> Result<()> {
        for (kind, amount, key) in ops {
            match kind {
                EntryKind::Capture => self.ledger.capture(booking_id, *amount, key).await?,
                EntryKind::Release => self.ledger.release(booking_id, *amount, key).await?,
                EntryKind::Refund => self.ledger.refund(booking_id, *amount, key).await?,
            }
        }
        Ok(())
    }

    /// Re-acquires the lock and commits the transition, or rolls the pending
    /// sub-state back. An unknown processor outcome keeps the sub-state for
    /// the reconciliation sweep.
    async fn finish(
        &self,
        booking_id: Uuid,
        target: BookingStatus,
        result: Result<()>,
    ) -> Result<TripBooking> {
        let _guard = self.locks.acquire(booking_id).await;
        let mut booking = self.load(booking_id).await?;
        match result {
            Ok(()) => {
                self.stamp(&mut booking, target);
                self.bookings.store(booking.clone()).await?;
                info!(%booking_id, status = %target, "booking transition committed");
                self.emit(booking.traveler, booking_id, target.as_str()).await;
                self.emit(booking.guide, booking_id, target.as_str()).await;
                Ok(booking)
            }
            Err(err @ EngineError::PaymentPending(_)) => {
                // Outcome unknown: the sub-state stays visible until the
                // sweep resolves it.
                Err(err)
            }
            Err(err) => {
                booking.in_flight = None;
                self.bookings.store(booking).await?;
                Err(err)
            }
        }
    }

    fn stamp(&self, booking: &mut TripBooking, target: BookingStatus) {
        let now = self.clock.now();
        booking.status = target;
        booking.in_flight = None;
        match target {
            BookingStatus::Paid => booking.paid_at = Some(now),
            BookingStatus::TripStarted => booking.started_at = Some(now),
            _ if target.is_terminal() => booking.closed_at = Some(now),
            _ => {}
        }
    }

    fn ensure_role(
        &self,
        booking: &TripBooking,
        actor: Actor,
        role: Role,
        party: Uuid,
        event: &'static str,
    ) -> Result<()> {
        if !actor.is(role) {
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                event,
            });
        }
        booking.ensure_party(actor.id, party, event)
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

    async fn entry_state(
        &self,
        booking_id: Uuid,
        suffix: &str,
    ) -> Result<Option<EntryState>> {
        Ok(self
            .payments
            .get_entry(&ledger_key(booking_id, suffix))
            .await?
            .map(|e| e.state))
    }

    async fn load(&self, booking_id: Uuid) -> Result<TripBooking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(EngineError::NotFound("booking", booking_id))
    }

    async fn load_payment(&self, booking_id: Uuid) -> Result<TripPayment> {
        self.payments
            .get_payment(booking_id)
            .await?
            .ok_or(EngineError::NotFound("payment", booking_id))
    }
}
