use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    FirstReleased,
    FullyReleased,
    PartiallyRefunded,
    Refunded,
}

/// The escrow position of one booking, 1:1 with it.
///
/// Core invariant: `released + refunded <= total` at all times, and
/// `released + refunded == total` once the booking reaches a terminal status
/// other than `Cancelled` (a cancelled booking was never captured).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPayment {
    pub booking_id: Uuid,
    pub total: Decimal,
    pub released: Decimal,
    pub refunded: Decimal,
    pub processor_ref: Option<String>,
    pub status: PaymentStatus,
    pub updated_at: DateTime<Utc>,
}

impl TripPayment {
    pub fn new(booking_id: Uuid, total: Amount, now: DateTime<Utc>) -> Self {
        Self {
            booking_id,
            total: total.value(),
            released: Decimal::ZERO,
            refunded: Decimal::ZERO,
            processor_ref: None,
            status: PaymentStatus::Pending,
            updated_at: now,
        }
    }

    /// Amount still held in escrow.
    pub fn headroom(&self) -> Decimal {
        self.total - self.released - self.refunded
    }

    pub fn is_settled(&self) -> bool {
        self.released + self.refunded == self.total
    }

    /// Folds an applied ledger entry into the running totals and derives the
    /// payment status. The ledger has already verified the invariant.
    pub fn apply(&mut self, kind: EntryKind, amount: Decimal, now: DateTime<Utc>) {
        match kind {
            EntryKind::Capture => {
                self.status = PaymentStatus::Paid;
            }
            EntryKind::Release => {
                self.released += amount;
                self.derive_status();
            }
            EntryKind::Refund => {
                self.refunded += amount;
                self.derive_status();
            }
        }
        self.updated_at = now;
    }

    fn derive_status(&mut self) {
        self.status = if self.refunded == self.total {
            PaymentStatus::Refunded
        } else if self.refunded > Decimal::ZERO {
            PaymentStatus::PartiallyRefunded
        } else if self.released == self.total {
            PaymentStatus::FullyReleased
        } else if self.released > Decimal::ZERO {
            PaymentStatus::FirstReleased
        } else {
            PaymentStatus::Paid
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Capture,
    Release,
    Refund,
}

/// Local commit state of one ledger mutation.
///
/// `Pending` means the processor call is (or may still be) in flight;
/// `Applied` is committed both remotely and locally; `Failed` was definitely
/// declined and may be retried under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Applied,
    Failed,
}

/// One idempotency-keyed ledger mutation. The key is deterministic,
/// `"{booking_id}:{operation}"`, so a retried delivery of the same transition
/// always lands on the same row instead of moving money twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    pub booking_id: Uuid,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn pending(
        key: String,
        booking_id: Uuid,
        kind: EntryKind,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            booking_id,
            kind,
            amount,
            state: EntryState::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Deterministic idempotency key for a ledger mutation.
pub fn ledger_key(booking_id: Uuid, operation: &str) -> String {
    format!("{booking_id}:{operation}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment(total: Decimal) -> TripPayment {
        TripPayment::new(Uuid::new_v4(), Amount::new(total).unwrap(), Utc::now())
    }

    #[test]
    fn test_capture_sets_paid() {
        let mut p = payment(dec!(5000));
        p.apply(EntryKind::Capture, dec!(5000), Utc::now());
        assert_eq!(p.status, PaymentStatus::Paid);
        assert_eq!(p.headroom(), dec!(5000));
    }

    #[test]
    fn test_release_tranches() {
        let mut p = payment(dec!(5000));
        p.apply(EntryKind::Capture, dec!(5000), Utc::now());
        p.apply(EntryKind::Release, dec!(2500), Utc::now());
        assert_eq!(p.status, PaymentStatus::FirstReleased);
        assert_eq!(p.headroom(), dec!(2500));

        p.apply(EntryKind::Release, dec!(2500), Utc::now());
        assert_eq!(p.status, PaymentStatus::FullyReleased);
        assert!(p.is_settled());
    }

    #[test]
    fn test_half_release_half_refund() {
        let mut p = payment(dec!(4000));
        p.apply(EntryKind::Capture, dec!(4000), Utc::now());
        p.apply(EntryKind::Release, dec!(2000), Utc::now());
        p.apply(EntryKind::Refund, dec!(2000), Utc::now());
        assert_eq!(p.status, PaymentStatus::PartiallyRefunded);
        assert!(p.is_settled());
    }

    #[test]
    fn test_full_refund() {
        let mut p = payment(dec!(4000));
        p.apply(EntryKind::Capture, dec!(4000), Utc::now());
        p.apply(EntryKind::Refund, dec!(4000), Utc::now());
        assert_eq!(p.status, PaymentStatus::Refunded);
        assert!(p.is_settled());
    }

    #[test]
    fn test_ledger_key_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(ledger_key(id, "confirm-arrival"), ledger_key(id, "confirm-arrival"));
        assert_ne!(ledger_key(id, "confirm-arrival"), ledger_key(id, "confirm-complete"));
    }
}
