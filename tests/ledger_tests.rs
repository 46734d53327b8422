use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use tripbook::application::ledger::{EscrowLedger, RetryPolicy};
use tripbook::domain::money::Amount;
use tripbook::domain::payment::{EntryState, PaymentStatus, TripPayment, ledger_key};
use tripbook::domain::ports::PaymentStore;
use tripbook::error::EngineError;
use tripbook::infrastructure::clock::SystemClock;
use tripbook::infrastructure::in_memory::InMemoryPaymentStore;
use tripbook::infrastructure::processor::{Fault, SimulatedProcessor};

struct LedgerFixture {
    ledger: EscrowLedger,
    payments: Arc<InMemoryPaymentStore>,
    processor: Arc<SimulatedProcessor>,
    booking_id: Uuid,
}

impl LedgerFixture {
    async fn captured(total: rust_decimal::Decimal) -> Self {
        let payments = Arc::new(InMemoryPaymentStore::new());
        let processor = Arc::new(SimulatedProcessor::new());
        let ledger = EscrowLedger::new(
            Arc::clone(&payments) as _,
            Arc::clone(&processor) as _,
            Arc::new(SystemClock::new()),
            RetryPolicy::immediate(),
        );

        let booking_id = Uuid::new_v4();
        let mut payment =
            TripPayment::new(booking_id, Amount::new(total).unwrap(), Utc::now());
        payment.processor_ref = Some("pi-test".to_string());
        payments.store_payment(payment).await.unwrap();
        ledger
            .capture(booking_id, total, &ledger_key(booking_id, "capture"))
            .await
            .unwrap();

        Self {
            ledger,
            payments,
            processor,
            booking_id,
        }
    }

    fn key(&self, operation: &str) -> String {
        ledger_key(self.booking_id, operation)
    }

    async fn payment(&self) -> TripPayment {
        self.payments
            .get_payment(self.booking_id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn entry_state(&self, key: &str) -> Option<EntryState> {
        self.payments
            .get_entry(key)
            .await
            .unwrap()
            .map(|e| e.state)
    }
}

#[tokio::test]
async fn test_overrun_is_blocked_before_the_processor_call() {
    let f = LedgerFixture::captured(dec!(5000)).await;
    f.ledger
        .release(f.booking_id, dec!(3000), &f.key("first"))
        .await
        .unwrap();

    let result = f
        .ledger
        .release(f.booking_id, dec!(3000), &f.key("second"))
        .await;
    assert!(matches!(result, Err(EngineError::LedgerOverrun(_))));

    // Nothing reached the processor and no entry was written.
    assert!(f.entry_state(&f.key("second")).await.is_none());
    assert_eq!(f.payment().await.released, dec!(3000));
}

#[tokio::test]
async fn test_pending_entries_count_against_headroom() {
    let f = LedgerFixture::captured(dec!(5000)).await;

    // First release stays pending: every retry fails transiently.
    for _ in 0..4 {
        f.processor.fail_next(&f.key("first"), Fault::Transient);
    }
    let result = f
        .ledger
        .release(f.booking_id, dec!(3000), &f.key("first"))
        .await;
    assert!(matches!(result, Err(EngineError::PaymentPending(_))));
    assert_eq!(f.entry_state(&f.key("first")).await, Some(EntryState::Pending));

    // A second release that would overdraw together with the pending one.
    let result = f
        .ledger
        .release(f.booking_id, dec!(3000), &f.key("second"))
        .await;
    assert!(matches!(result, Err(EngineError::LedgerOverrun(_))));
}

#[tokio::test]
async fn test_transient_failure_retried_to_success() {
    let f = LedgerFixture::captured(dec!(5000)).await;
    f.processor.fail_next(&f.key("release"), Fault::Transient);
    f.processor.fail_next(&f.key("release"), Fault::Transient);

    f.ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await
        .unwrap();

    assert_eq!(
        f.entry_state(&f.key("release")).await,
        Some(EntryState::Applied)
    );
    let payment = f.payment().await;
    assert_eq!(payment.released, dec!(2500));
    assert_eq!(payment.status, PaymentStatus::FirstReleased);
}

#[tokio::test]
async fn test_decline_fails_entry_and_allows_retry_under_same_key() {
    let f = LedgerFixture::captured(dec!(5000)).await;
    f.processor.fail_next(&f.key("release"), Fault::Declined);

    let result = f
        .ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await;
    assert!(matches!(result, Err(EngineError::ProcessorUnavailable)));
    assert_eq!(
        f.entry_state(&f.key("release")).await,
        Some(EntryState::Failed)
    );
    assert_eq!(f.payment().await.released, dec!(0));

    // The decline was definite, so the same key may be retried.
    f.ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await
        .unwrap();
    assert_eq!(f.payment().await.released, dec!(2500));
}

#[tokio::test]
async fn test_applied_key_is_not_charged_twice() {
    let f = LedgerFixture::captured(dec!(5000)).await;
    f.ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await
        .unwrap();
    let calls_before = f.processor.calls().len();

    f.ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await
        .unwrap();

    assert_eq!(f.processor.calls().len(), calls_before);
    assert_eq!(f.payment().await.released, dec!(2500));
}

#[tokio::test]
async fn test_reconcile_commits_remotely_confirmed_entry() {
    let f = LedgerFixture::captured(dec!(5000)).await;

    // The money moved remotely but every response was lost.
    f.processor
        .fail_next(&f.key("release"), Fault::TransientButApplied);
    for _ in 0..3 {
        f.processor.fail_next(&f.key("release"), Fault::Transient);
    }
    let result = f
        .ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await;
    assert!(matches!(result, Err(EngineError::PaymentPending(_))));
    assert_eq!(f.payment().await.released, dec!(0));

    let outcome = f.ledger.reconcile().await.unwrap();
    assert_eq!(outcome.repaired, vec![f.key("release")]);
    assert_eq!(
        f.entry_state(&f.key("release")).await,
        Some(EntryState::Applied)
    );
    assert_eq!(f.payment().await.released, dec!(2500));
}

#[tokio::test]
async fn test_reconcile_fails_entry_unknown_to_processor() {
    let f = LedgerFixture::captured(dec!(5000)).await;

    for _ in 0..4 {
        f.processor.fail_next(&f.key("release"), Fault::Transient);
    }
    let result = f
        .ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await;
    assert!(matches!(result, Err(EngineError::PaymentPending(_))));

    let outcome = f.ledger.reconcile().await.unwrap();
    assert_eq!(outcome.failed, vec![f.key("release")]);
    assert_eq!(
        f.entry_state(&f.key("release")).await,
        Some(EntryState::Failed)
    );
    assert_eq!(f.payment().await.released, dec!(0));
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let f = LedgerFixture::captured(dec!(5000)).await;
    f.processor
        .fail_next(&f.key("release"), Fault::TransientButApplied);
    for _ in 0..3 {
        f.processor.fail_next(&f.key("release"), Fault::Transient);
    }
    let _ = f
        .ledger
        .release(f.booking_id, dec!(2500), &f.key("release"))
        .await;

    f.ledger.reconcile().await.unwrap();
    let second = f.ledger.reconcile().await.unwrap();
    assert!(second.repaired.is_empty());
    assert!(second.failed.is_empty());
    assert_eq!(f.payment().await.released, dec!(2500));
}

#[tokio::test]
async fn test_capture_must_match_booking_total() {
    let payments = Arc::new(InMemoryPaymentStore::new());
    let processor = Arc::new(SimulatedProcessor::new());
    let ledger = EscrowLedger::new(
        Arc::clone(&payments) as _,
        processor as _,
        Arc::new(SystemClock::new()),
        RetryPolicy::immediate(),
    );
    let booking_id = Uuid::new_v4();
    let mut payment = TripPayment::new(booking_id, Amount::new(dec!(5000)).unwrap(), Utc::now());
    payment.processor_ref = Some("pi-test".to_string());
    payments.store_payment(payment).await.unwrap();

    let result = ledger
        .capture(booking_id, dec!(4000), &ledger_key(booking_id, "capture"))
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}
