use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::application::locks::LockRegistry;
use crate::domain::actor::{Actor, Role};
use crate::domain::booking::TripBooking;
use crate::domain::offer::{OfferStatus, Quotation, TripOffer};
use crate::domain::payment::TripPayment;
use crate::domain::ports::{
    BookingStoreRef, ClockRef, Notification, NotifierRef, OfferStoreRef, PaymentStoreRef,
    RequireStoreRef,
};
use crate::domain::require::{NewTripRequire, RequireStatus, TripRequire};
use crate::error::{EngineError, Result};

/// Owns the trip request and offer lifecycles, up to and including the
/// atomic acceptance step that births a booking.
pub struct OfferNegotiation {
    requires: RequireStoreRef,
    offers: OfferStoreRef,
    bookings: BookingStoreRef,
    payments: PaymentStoreRef,
    locks: Arc<LockRegistry>,
    notifier: NotifierRef,
    clock: ClockRef,
}

impl OfferNegotiation {
    pub fn new(
        requires: RequireStoreRef,
        offers: OfferStoreRef,
        bookings: BookingStoreRef,
        payments: PaymentStoreRef,
        locks: Arc<LockRegistry>,
        notifier: NotifierRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            requires,
            offers,
            bookings,
            payments,
            locks,
            notifier,
            clock,
        }
    }

    pub async fn post_require(&self, actor: Actor, spec: NewTripRequire) -> Result<TripRequire> {
        self.ensure_role(actor, Role::Traveler)?;
        let require = TripRequire::post(actor.id, spec, self.clock.now())?;
        self.requires.store(require.clone()).await?;
        info!(require_id = %require.id, "trip request posted");
        Ok(require)
    }

    /// Validates the quotation against the request and creates the offer in
    /// `Sent`.
    pub async fn submit_offer(
        &self,
        actor: Actor,
        require_id: Uuid,
        quotation: Quotation,
    ) -> Result<TripOffer> {
        self.ensure_role(actor, Role::Guide)?;
        let require = self
            .requires
            .get(require_id)
            .await?
            .ok_or(EngineError::NotFound("trip request", require_id))?;

        let offer = TripOffer::submit(
            &require,
            actor.id,
            quotation,
            self.clock.today(),
            self.clock.now(),
        )?;
        self.offers.store(offer.clone()).await?;
        info!(offer_id = %offer.id, %require_id, "offer submitted");
        self.emit(require.traveler, "offer-received").await;
        Ok(offer)
    }

    /// Accepts one offer. A single atomic unit under the per-request lock:
    /// this offer becomes `Accepted`, every sibling still `Sent` becomes
    /// `Rejected`, the request becomes `Assigned`, and exactly one booking
    /// is created in `PendingPayment` together with its escrow row.
    pub async fn accept_offer(&self, actor: Actor, offer_id: Uuid) -> Result<TripBooking> {
        self.ensure_role(actor, Role::Traveler)?;

        let require_id = self
            .offers
            .get(offer_id)
            .await?
            .ok_or(EngineError::NotFound("offer", offer_id))?
            .require_id;

        let _guard = self.locks.acquire(require_id).await;

        // Re-read under the lock: a concurrent accept may have decided the
        // race before we got here.
        let mut offer = self
            .offers
            .get(offer_id)
            .await?
            .ok_or(EngineError::NotFound("offer", offer_id))?;
        let mut require = self
            .requires
            .get(require_id)
            .await?
            .ok_or(EngineError::NotFound("trip request", require_id))?;

        if actor.id != require.traveler {
            return Err(EngineError::Validation(
                "only the requesting traveler may decide this offer".to_string(),
            ));
        }
        if let Some(expired) = self.expire_if_stale(offer.clone()).await? {
            offer = expired;
        }
        if offer.status != OfferStatus::Sent || !require.accepts_offers() {
            return Err(EngineError::AlreadyDecided);
        }

        let now = self.clock.now();
        offer.accept(now)?;

        let mut rejected_guides = Vec::new();
        for mut sibling in self.offers.list_by_require(require_id).await? {
            if sibling.id != offer.id && sibling.status == OfferStatus::Sent {
                sibling.reject(Some("another offer was accepted".to_string()), now)?;
                rejected_guides.push(sibling.guide);
                self.offers.store(sibling).await?;
            }
        }

        require.status = RequireStatus::Assigned;
        let booking = TripBooking::from_accepted_offer(&offer, &require, now);
        let payment = TripPayment::new(booking.id, booking.total, now);

        self.offers.store(offer.clone()).await?;
        self.requires.store(require).await?;
        self.bookings.store(booking.clone()).await?;
        self.payments.store_payment(payment).await?;

        info!(
            %offer_id,
            booking_id = %booking.id,
            rejected = rejected_guides.len(),
            "offer accepted, booking created"
        );
        self.emit(offer.guide, "offer-accepted").await;
        for guide in rejected_guides {
            self.emit(guide, "offer-rejected").await;
        }
        Ok(booking)
    }

    pub async fn reject_offer(
        &self,
        actor: Actor,
        offer_id: Uuid,
        reason: Option<String>,
    ) -> Result<TripOffer> {
        self.ensure_role(actor, Role::Traveler)?;
        let mut offer = self.decidable_offer(offer_id).await?;

        let require = self
            .requires
            .get(offer.require_id)
            .await?
            .ok_or(EngineError::NotFound("trip request", offer.require_id))?;
        if actor.id != require.traveler {
            return Err(EngineError::Validation(
                "only the requesting traveler may decide this offer".to_string(),
            ));
        }

        offer.reject(reason, self.clock.now())?;
        self.offers.store(offer.clone()).await?;
        info!(%offer_id, "offer rejected by traveler");
        self.emit(offer.guide, "offer-rejected").await;
        Ok(offer)
    }

    pub async fn withdraw_offer(&self, actor: Actor, offer_id: Uuid) -> Result<TripOffer> {
        self.ensure_role(actor, Role::Guide)?;
        let mut offer = self.decidable_offer(offer_id).await?;
        if actor.id != offer.guide {
            return Err(EngineError::Validation(
                "only the submitting guide may withdraw this offer".to_string(),
            ));
        }

        offer.withdraw(self.clock.now())?;
        self.offers.store(offer.clone()).await?;
        info!(%offer_id, "offer withdrawn by guide");
        Ok(offer)
    }

    /// Marks every stale `Sent` offer `Expired`. Idempotent; also run by
    /// the reconciliation sweep.
    pub async fn expire_stale_offers(&self) -> Result<Vec<Uuid>> {
        let today = self.clock.today();
        let mut expired = Vec::new();
        for mut offer in self.offers.list_by_status(OfferStatus::Sent).await? {
            if offer.is_expired(today) {
                offer.expire(self.clock.now());
                expired.push(offer.id);
                self.offers.store(offer).await?;
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "stale offers expired");
        }
        Ok(expired)
    }

    /// Loads an offer, applying lazy expiry first.
    async fn decidable_offer(&self, offer_id: Uuid) -> Result<TripOffer> {
        let offer = self
            .offers
            .get(offer_id)
            .await?
            .ok_or(EngineError::NotFound("offer", offer_id))?;
        match self.expire_if_stale(offer.clone()).await? {
            Some(expired) => Ok(expired),
            None => Ok(offer),
        }
    }

    async fn expire_if_stale(&self, mut offer: TripOffer) -> Result<Option<TripOffer>> {
        if offer.is_expired(self.clock.today()) {
            offer.expire(self.clock.now());
            self.offers.store(offer.clone()).await?;
            return Ok(Some(offer));
        }
        Ok(None)
    }

    fn ensure_role(&self, actor: Actor, role: Role) -> Result<()> {
        if actor.is(role) {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "operation requires the {role:?} role"
            )))
        }
    }

    async fn emit(&self, recipient: Uuid, event: &'static str) {
        let notification = Notification {
            recipient,
            booking_id: None,
            event,
        };
        if let Err(err) = self.notifier.notify(notification).await {
            tracing::warn!(%err, "notification emission failed");
        }
    }
}
