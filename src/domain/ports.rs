use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::booking::{BookingStatus, TripBooking};
use crate::domain::dispute::DisputeReport;
use crate::domain::offer::{OfferStatus, TripOffer};
use crate::domain::payment::{LedgerEntry, TripPayment};
use crate::domain::require::TripRequire;
use crate::error::Result;

pub type RequireStoreRef = Arc<dyn RequireStore>;
pub type OfferStoreRef = Arc<dyn OfferStore>;
pub type BookingStoreRef = Arc<dyn BookingStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type DisputeStoreRef = Arc<dyn DisputeStore>;
pub type ProcessorRef = Arc<dyn PaymentProcessor>;
pub type NotifierRef = Arc<dyn NotificationEmitter>;
pub type ClockRef = Arc<dyn Clock>;

#[async_trait]
pub trait RequireStore: Send + Sync {
    async fn store(&self, require: TripRequire) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<TripRequire>>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn store(&self, offer: TripOffer) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<TripOffer>>;
    async fn list_by_require(&self, require_id: Uuid) -> Result<Vec<TripOffer>>;
    async fn list_by_status(&self, status: OfferStatus) -> Result<Vec<TripOffer>>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn store(&self, booking: TripBooking) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<TripBooking>>;
    async fn get_by_offer(&self, offer_id: Uuid) -> Result<Option<TripBooking>>;
    async fn list_by_status(&self, status: BookingStatus) -> Result<Vec<TripBooking>>;
    async fn list_in_flight(&self) -> Result<Vec<TripBooking>>;
    async fn all(&self) -> Result<Vec<TripBooking>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn store_payment(&self, payment: TripPayment) -> Result<()>;
    async fn get_payment(&self, booking_id: Uuid) -> Result<Option<TripPayment>>;
    async fn store_entry(&self, entry: LedgerEntry) -> Result<()>;
    async fn get_entry(&self, key: &str) -> Result<Option<LedgerEntry>>;
    async fn entries_for(&self, booking_id: Uuid) -> Result<Vec<LedgerEntry>>;
    async fn pending_entries(&self) -> Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait DisputeStore: Send + Sync {
    async fn store(&self, dispute: DisputeReport) -> Result<()>;
    async fn get_by_booking(&self, booking_id: Uuid) -> Result<Option<DisputeReport>>;
}

/// Processor-side failure modes. `Transient` is retried with backoff;
/// `Declined` is definite and fails the ledger entry.
#[derive(Error, Debug, Clone)]
pub enum ProcessorError {
    #[error("transient processor error: {0}")]
    Transient(String),
    #[error("processor declined: {0}")]
    Declined(String),
}

pub type ProcessorResult<T> = std::result::Result<T, ProcessorError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorReceipt {
    pub reference: String,
}

/// Final status of an idempotency key as known to the processor, queried
/// during read-repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Confirmed,
    Unknown,
}

/// External payment processor. Assumed idempotency-token-capable: delivering
/// the same key twice must not move money twice on the remote side either.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_intent(
        &self,
        booking_id: Uuid,
        amount: Decimal,
    ) -> ProcessorResult<ProcessorReceipt>;

    async fn capture(
        &self,
        reference: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> ProcessorResult<ProcessorReceipt>;

    async fn release(
        &self,
        reference: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> ProcessorResult<ProcessorReceipt>;

    async fn refund(
        &self,
        reference: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> ProcessorResult<ProcessorReceipt>;

    async fn status_of(&self, idempotency_key: &str) -> ProcessorResult<RemoteStatus>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: Uuid,
    pub booking_id: Option<Uuid>,
    pub event: &'static str,
}

/// Fire-and-forget notification emitter. Failures are logged by the caller
/// and must never roll back a committed transition.
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Time source, injected so expiry and deadline logic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
