#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use tripbook::application::engine::{EngineConfig, TripEngine};
use tripbook::application::ledger::RetryPolicy;
use tripbook::domain::actor::Actor;
use tripbook::domain::booking::TripBooking;
use tripbook::domain::money::Amount;
use tripbook::domain::offer::Quotation;
use tripbook::domain::payment::ledger_key;
use tripbook::domain::require::NewTripRequire;
use tripbook::infrastructure::clock::ManualClock;
use tripbook::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryDisputeStore, InMemoryOfferStore, InMemoryPaymentStore,
    InMemoryRequireStore,
};
use tripbook::infrastructure::notifier::RecordingNotifier;
use tripbook::infrastructure::processor::SimulatedProcessor;
use uuid::Uuid;

pub struct Harness {
    pub engine: Arc<TripEngine>,
    pub processor: Arc<SimulatedProcessor>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2026, 9, 30, 12, 0, 0).unwrap(),
        ));
        let processor = Arc::new(SimulatedProcessor::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Arc::new(TripEngine::new(
            Arc::new(InMemoryRequireStore::new()),
            Arc::new(InMemoryOfferStore::new()),
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(InMemoryDisputeStore::new()),
            Arc::clone(&processor) as _,
            Arc::clone(&notifier) as _,
            Arc::clone(&clock) as _,
            EngineConfig {
                retry: RetryPolicy::immediate(),
                ..EngineConfig::default()
            },
        ));
        Self {
            engine,
            processor,
            notifier,
            clock,
        }
    }

    pub fn require_spec(&self, min: Decimal, max: Decimal) -> NewTripRequire {
        NewTripRequire {
            min_budget: min,
            max_budget: max,
            trip_start: NaiveDate::from_ymd_opt(2026, 10, 10).unwrap(),
            trip_end: NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
            group_size: 2,
            min_guide_rating: None,
        }
    }

    pub fn quotation(&self, total: Decimal) -> Quotation {
        Quotation {
            total: Amount::new(total).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2026, 10, 5).unwrap(),
            note: None,
        }
    }

    /// Full negotiation up to an accepted offer: one request, one offer,
    /// booking in `PendingPayment`.
    pub async fn booking(&self, total: Decimal) -> (Actor, Actor, TripBooking) {
        let traveler = Actor::traveler(Uuid::new_v4());
        let guide = Actor::guide(Uuid::new_v4());
        let require = self
            .engine
            .post_require(traveler, self.require_spec(total / Decimal::TWO, total * Decimal::TWO))
            .await
            .unwrap();
        let offer = self
            .engine
            .submit_offer(guide, require.id, self.quotation(total))
            .await
            .unwrap();
        let booking = self.engine.accept_offer(traveler, offer.id).await.unwrap();
        (traveler, guide, booking)
    }

    /// A booking with the full total captured in escrow.
    pub async fn paid_booking(&self, total: Decimal) -> (Actor, Actor, TripBooking) {
        let (traveler, guide, booking) = self.booking(total).await;
        let reference = self
            .engine
            .create_payment_intent(traveler, booking.id)
            .await
            .unwrap();
        let booking = self
            .engine
            .confirm_payment(booking.id, &reference)
            .await
            .unwrap();
        (traveler, guide, booking)
    }

    pub fn key(&self, booking_id: Uuid, operation: &str) -> String {
        ledger_key(booking_id, operation)
    }
}
