use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::dispute::DisputeResolution;
use crate::application::ledger::{EscrowLedger, RetryPolicy};
use crate::application::lifecycle::BookingLifecycle;
use crate::application::locks::LockRegistry;
use crate::application::negotiation::OfferNegotiation;
use crate::application::sweep::{ReconciliationSweep, SweepReport};
use crate::domain::actor::Actor;
use crate::domain::booking::{BookingStatus, TripBooking};
use crate::domain::dispute::{DisputeDecision, DisputeReport};
use crate::domain::offer::{Quotation, TripOffer};
use crate::domain::payment::TripPayment;
use crate::domain::ports::{
    BookingStoreRef, ClockRef, DisputeStoreRef, NotifierRef, OfferStoreRef, PaymentStoreRef,
    ProcessorRef, RequireStoreRef,
};
use crate::domain::require::{NewTripRequire, TripRequire};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// How long a traveler has to contest a guide's no-show report before
    /// the sweep settles it in the guide's favor.
    pub dispute_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            dispute_window: Duration::hours(48),
        }
    }
}

/// Facade wiring the negotiation, lifecycle, ledger, dispute, and sweep
/// services over one set of stores. The interfaces layer talks only to this.
pub struct TripEngine {
    negotiation: Arc<OfferNegotiation>,
    lifecycle: Arc<BookingLifecycle>,
    disputes: Arc<DisputeResolution>,
    sweep: ReconciliationSweep,
    offers: OfferStoreRef,
    bookings: BookingStoreRef,
    payments: PaymentStoreRef,
    dispute_store: DisputeStoreRef,
}

impl TripEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requires: RequireStoreRef,
        offers: OfferStoreRef,
        bookings: BookingStoreRef,
        payments: PaymentStoreRef,
        dispute_store: DisputeStoreRef,
        processor: ProcessorRef,
        notifier: NotifierRef,
        clock: ClockRef,
        config: EngineConfig,
    ) -> Self {
        let ledger = Arc::new(EscrowLedger::new(
            Arc::clone(&payments),
            processor,
            Arc::clone(&clock),
            config.retry,
        ));
        let locks = Arc::new(LockRegistry::new());

        let negotiation = Arc::new(OfferNegotiation::new(
            requires,
            Arc::clone(&offers),
            Arc::clone(&bookings),
            Arc::clone(&payments),
            Arc::clone(&locks),
            Arc::clone(&notifier),
            Arc::clone(&clock),
        ));
        let lifecycle = Arc::new(BookingLifecycle::new(
            Arc::clone(&bookings),
            Arc::clone(&payments),
            Arc::clone(&ledger),
            Arc::clone(&locks),
            Arc::clone(&notifier),
            Arc::clone(&clock),
        ));
        let disputes = Arc::new(DisputeResolution::new(
            Arc::clone(&bookings),
            Arc::clone(&dispute_store),
            Arc::clone(&payments),
            Arc::clone(&ledger),
            Arc::clone(&locks),
            notifier,
            Arc::clone(&clock),
        ));
        let sweep = ReconciliationSweep::new(
            Arc::clone(&negotiation),
            Arc::clone(&lifecycle),
            Arc::clone(&disputes),
            ledger,
            Arc::clone(&bookings),
            clock,
            config.dispute_window,
        );

        Self {
            negotiation,
            lifecycle,
            disputes,
            sweep,
            offers,
            bookings,
            payments,
            dispute_store,
        }
    }

    // Negotiation.

    pub async fn post_require(&self, actor: Actor, spec: NewTripRequire) -> Result<TripRequire> {
        self.negotiation.post_require(actor, spec).await
    }

    pub async fn submit_offer(
        &self,
        actor: Actor,
        require_id: Uuid,
        quotation: Quotation,
    ) -> Result<TripOffer> {
        self.negotiation.submit_offer(actor, require_id, quotation).await
    }

    pub async fn accept_offer(&self, actor: Actor, offer_id: Uuid) -> Result<TripBooking> {
        self.negotiation.accept_offer(actor, offer_id).await
    }

    pub async fn reject_offer(
        &self,
        actor: Actor,
        offer_id: Uuid,
        reason: Option<String>,
    ) -> Result<TripOffer> {
        self.negotiation.reject_offer(actor, offer_id, reason).await
    }

    pub async fn withdraw_offer(&self, actor: Actor, offer_id: Uuid) -> Result<TripOffer> {
        self.negotiation.withdraw_offer(actor, offer_id).await
    }

    // Booking lifecycle.

    pub async fn cancel_booking(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        self.lifecycle.cancel(actor, booking_id).await
    }

    pub async fn create_payment_intent(&self, actor: Actor, booking_id: Uuid) -> Result<String> {
        self.lifecycle.create_payment_intent(actor, booking_id).await
    }

    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
        processor_ref: &str,
    ) -> Result<TripBooking> {
        self.lifecycle.confirm_payment(booking_id, processor_ref).await
    }

    pub async fn confirm_arrival(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        self.lifecycle.confirm_arrival(actor, booking_id).await
    }

    pub async fn confirm_complete(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        self.lifecycle.confirm_complete(actor, booking_id).await
    }

    pub async fn confirm_no_show(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        self.lifecycle.confirm_no_show(actor, booking_id).await
    }

    pub async fn report_no_show(&self, actor: Actor, booking_id: Uuid) -> Result<TripBooking> {
        self.lifecycle.report_no_show(actor, booking_id).await
    }

    // Disputes.

    pub async fn dispute_no_show(
        &self,
        actor: Actor,
        booking_id: Uuid,
        description: String,
        evidence_ref: Option<String>,
    ) -> Result<DisputeReport> {
        self.disputes
            .file(actor, booking_id, description, evidence_ref)
            .await
    }

    pub async fn resolve_dispute(
        &self,
        actor: Actor,
        booking_id: Uuid,
        decision: DisputeDecision,
        justification: String,
    ) -> Result<DisputeReport> {
        self.disputes
            .resolve(actor, booking_id, decision, justification)
            .await
    }

    // Reconciliation.

    pub async fn run_sweep(&self) -> Result<SweepReport> {
        self.sweep.run().await
    }

    // Reads.

    pub async fn booking(&self, booking_id: Uuid) -> Result<TripBooking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(EngineError::NotFound("booking", booking_id))
    }

    pub async fn booking_by_offer(&self, offer_id: Uuid) -> Result<TripBooking> {
        self.bookings
            .get_by_offer(offer_id)
            .await?
            .ok_or(EngineError::NotFound("booking", offer_id))
    }

    pub async fn payment(&self, booking_id: Uuid) -> Result<TripPayment> {
        self.payments
            .get_payment(booking_id)
            .await?
            .ok_or(EngineError::NotFound("payment", booking_id))
    }

    pub async fn offers_for(&self, require_id: Uuid) -> Result<Vec<TripOffer>> {
        self.offers.list_by_require(require_id).await
    }

    pub async fn dispute_for(&self, booking_id: Uuid) -> Result<Option<DisputeReport>> {
        self.dispute_store.get_by_booking(booking_id).await
    }

    pub async fn all_bookings(&self) -> Result<Vec<TripBooking>> {
        self.bookings.all().await
    }

    pub async fn bookings_by_status(&self, status: BookingStatus) -> Result<Vec<TripBooking>> {
        self.bookings.list_by_status(status).await
    }
}
