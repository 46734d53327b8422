//! In-memory store implementations backing the engine in the replayer and
//! in tests. A transactional backend would implement the same traits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::booking::{BookingStatus, TripBooking};
use crate::domain::dispute::DisputeReport;
use crate::domain::offer::{OfferStatus, TripOffer};
use crate::domain::payment::{EntryState, LedgerEntry, TripPayment};
use crate::domain::ports::{BookingStore, DisputeStore, OfferStore, PaymentStore, RequireStore};
use crate::domain::require::TripRequire;
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryRequireStore {
    requires: Arc<RwLock<HashMap<Uuid, TripRequire>>>,
}

impl InMemoryRequireStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequireStore for InMemoryRequireStore {
    async fn store(&self, require: TripRequire) -> Result<()> {
        self.requires.write().await.insert(require.id, require);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TripRequire>> {
        Ok(self.requires.read().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryOfferStore {
    offers: Arc<RwLock<HashMap<Uuid, TripOffer>>>,
}

impl InMemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferStore for InMemoryOfferStore {
    async fn store(&self, offer: TripOffer) -> Result<()> {
        self.offers.write().await.insert(offer.id, offer);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TripOffer>> {
        Ok(self.offers.read().await.get(&id).cloned())
    }

    async fn list_by_require(&self, require_id: Uuid) -> Result<Vec<TripOffer>> {
        Ok(self
            .offers
            .read()
            .await
            .values()
            .filter(|o| o.require_id == require_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: OfferStatus) -> Result<Vec<TripOffer>> {
        Ok(self
            .offers
            .read()
            .await
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<Uuid, TripBooking>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn store(&self, booking: TripBooking) -> Result<()> {
        self.bookings.write().await.insert(booking.id, booking);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TripBooking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn get_by_offer(&self, offer_id: Uuid) -> Result<Option<TripBooking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.offer_id == offer_id)
            .cloned())
    }

    async fn list_by_status(&self, status: BookingStatus) -> Result<Vec<TripBooking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.status == status)
            .cloned()
            .collect())
    }

    async fn list_in_flight(&self) -> Result<Vec<TripBooking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.in_flight.is_some())
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<TripBooking>> {
        let mut bookings: Vec<_> = self.bookings.read().await.values().cloned().collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<Uuid, TripPayment>>>,
    entries: Arc<RwLock<HashMap<String, LedgerEntry>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn store_payment(&self, payment: TripPayment) -> Result<()> {
        self.payments
            .write()
            .await
            .insert(payment.booking_id, payment);
        Ok(())
    }

    async fn get_payment(&self, booking_id: Uuid) -> Result<Option<TripPayment>> {
        Ok(self.payments.read().await.get(&booking_id).cloned())
    }

    async fn store_entry(&self, entry: LedgerEntry) -> Result<()> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn get_entry(&self, key: &str) -> Result<Option<LedgerEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn entries_for(&self, booking_id: Uuid) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn pending_entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.state == EntryState::Pending)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDisputeStore {
    disputes: Arc<RwLock<HashMap<Uuid, DisputeReport>>>,
}

impl InMemoryDisputeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DisputeStore for InMemoryDisputeStore {
    async fn store(&self, dispute: DisputeReport) -> Result<()> {
        self.disputes
            .write()
            .await
            .insert(dispute.booking_id, dispute);
        Ok(())
    }

    async fn get_by_booking(&self, booking_id: Uuid) -> Result<Option<DisputeReport>> {
        Ok(self.disputes.read().await.get(&booking_id).cloned())
    }
}
