use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::locks::LockRegistry;
use crate::domain::payment::{EntryKind, EntryState, LedgerEntry, PaymentStatus, TripPayment};
use crate::domain::ports::{
    ClockRef, PaymentStoreRef, ProcessorError, ProcessorRef, ProcessorResult, RemoteStatus,
};
use crate::error::{EngineError, Result};

/// Bounded exponential backoff for transient processor failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Immediate retries, for tests.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_ms = exp.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return exp;
        }
        let jitter = {
            use rand::Rng;
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Outcome of a read-repair pass over pending ledger entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerReconciliation {
    pub repaired: Vec<String>,
    pub failed: Vec<String>,
}

/// The only component allowed to change money state.
///
/// Every mutation is idempotency-keyed and two-phase: the entry is stored
/// `Pending`, the processor is called (with bounded backoff on transient
/// failures), and the local row is committed `Applied` only after the
/// processor confirms. An exhausted retry budget leaves the entry `Pending`
/// for the reconciliation sweep; a definite decline marks it `Failed`.
pub struct EscrowLedger {
    payments: PaymentStoreRef,
    processor: ProcessorRef,
    clock: ClockRef,
    retry: RetryPolicy,
    locks: LockRegistry,
}

impl EscrowLedger {
    pub fn new(
        payments: PaymentStoreRef,
        processor: ProcessorRef,
        clock: ClockRef,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            payments,
            processor,
            clock,
            retry,
            locks: LockRegistry::new(),
        }
    }

    /// Creates (or returns the existing) processor payment intent for a
    /// booking. Does not move money.
    pub async fn create_intent(&self, booking_id: Uuid) -> Result<String> {
        let mut payment = self.load_payment(booking_id).await?;
        if let Some(reference) = payment.processor_ref.clone() {
            return Ok(reference);
        }

        let receipt = self
            .retrying(|| self.processor.create_intent(booking_id, payment.total))
            .await
            .map_err(|err| {
                warn!(%booking_id, %err, "payment intent creation failed");
                EngineError::ProcessorUnavailable
            })?;

        payment.processor_ref = Some(receipt.reference.clone());
        payment.updated_at = self.clock.now();
        self.payments.store_payment(payment).await?;
        Ok(receipt.reference)
    }

    pub async fn capture(&self, booking_id: Uuid, amount: Decimal, key: &str) -> Result<()> {
        self.mutate(booking_id, EntryKind::Capture, amount, key).await
    }

    pub async fn release(&self, booking_id: Uuid, amount: Decimal, key: &str) -> Result<()> {
        self.mutate(booking_id, EntryKind::Release, amount, key).await
    }

    pub async fn refund(&self, booking_id: Uuid, amount: Decimal, key: &str) -> Result<()> {
        self.mutate(booking_id, EntryKind::Refund, amount, key).await
    }

    async fn mutate(
        &self,
        booking_id: Uuid,
        kind: EntryKind,
        amount: Decimal,
        key: &str,
    ) -> Result<()> {
        // Phase 1 under the per-booking ledger lock: idempotency gate,
        // invariant gate, pending entry insert.
        let reference = {
            let _guard = self.locks.acquire(booking_id).await;
            let payment = self.load_payment(booking_id).await?;

            if let Some(existing) = self.payments.get_entry(key).await? {
                match existing.state {
                    EntryState::Applied => {
                        debug!(%booking_id, key, "ledger entry already applied, no-op");
                        return Ok(());
                    }
                    EntryState::Pending => return Err(EngineError::PaymentPending(booking_id)),
                    // A definite decline may be retried under the same key.
                    EntryState::Failed => {}
                }
            }

            match kind {
                EntryKind::Capture => {
                    if amount != payment.total {
                        return Err(EngineError::Validation(
                            "capture amount must equal the booking total".to_string(),
                        ));
                    }
                }
                EntryKind::Release | EntryKind::Refund => {
                    if payment.status == PaymentStatus::Pending {
                        return Err(EngineError::Validation(
                            "no funds captured for this booking".to_string(),
                        ));
                    }
                    let in_flight: Decimal = self
                        .payments
                        .entries_for(booking_id)
                        .await?
                        .iter()
                        .filter(|e| e.state == EntryState::Pending && e.key != key)
                        .map(|e| e.amount)
                        .sum();
                    if payment.released + payment.refunded + in_flight + amount > payment.total {
                        error!(
                            %booking_id,
                            released = %payment.released,
                            refunded = %payment.refunded,
                            %in_flight,
                            requested = %amount,
                            total = %payment.total,
                            "ledger overrun prevented"
                        );
                        return Err(EngineError::LedgerOverrun(booking_id));
                    }
                }
            }

            let reference = payment.processor_ref.clone().ok_or_else(|| {
                EngineError::Validation("no payment intent on file".to_string())
            })?;

            let entry =
                LedgerEntry::pending(key.to_string(), booking_id, kind, amount, self.clock.now());
            self.payments.store_entry(entry).await?;
            reference
        };

        // Phase 2, outside the lock: the external call.
        let outcome = self
            .retrying(|| match kind {
                EntryKind::Capture => self.processor.capture(&reference, amount, key),
                EntryKind::Release => self.processor.release(&reference, amount, key),
                EntryKind::Refund => self.processor.refund(&reference, amount, key),
            })
            .await;

        match outcome {
            Ok(_receipt) => {
                self.commit_entry(key).await?;
                info!(%booking_id, key, ?kind, %amount, "ledger entry applied");
                Ok(())
            }
            Err(ProcessorError::Declined(reason)) => {
                self.fail_entry(key).await?;
                warn!(%booking_id, key, reason, "processor declined ledger entry");
                Err(EngineError::ProcessorUnavailable)
            }
            Err(ProcessorError::Transient(reason)) => {
                // Outcome unknown: leave the entry pending for the sweep.
                warn!(%booking_id, key, reason, "processor unreachable, entry left pending");
                Err(EngineError::PaymentPending(booking_id))
            }
        }
    }

    /// Read-repair pass: asks the processor for the final status of every
    /// locally pending entry and commits or fails it accordingly. A
    /// confirmed-remotely entry is committed rather than retried a second
    /// time.
    pub async fn reconcile(&self) -> Result<LedgerReconciliation> {
        let mut outcome = LedgerReconciliation::default();
        for entry in self.payments.pending_entries().await? {
            match self.processor.status_of(&entry.key).await {
                Ok(RemoteStatus::Confirmed) => {
                    self.commit_entry(&entry.key).await?;
                    info!(key = %entry.key, "pending ledger entry repaired as applied");
                    outcome.repaired.push(entry.key);
                }
                Ok(RemoteStatus::Unknown) => {
                    self.fail_entry(&entry.key).await?;
                    warn!(key = %entry.key, "pending ledger entry unknown to processor, failed");
                    outcome.failed.push(entry.key);
                }
                Err(err) => {
                    warn!(key = %entry.key, %err, "processor unreachable during reconcile");
                }
            }
        }
        Ok(outcome)
    }

    async fn commit_entry(&self, key: &str) -> Result<()> {
        let entry = self
            .payments
            .get_entry(key)
            .await?
            .ok_or_else(|| EngineError::Storage(format!("ledger entry vanished: {key}")))?;
        let _guard = self.locks.acquire(entry.booking_id).await;

        // Re-read under the lock: the sweep and a late processor response
        // may both try to commit the same entry.
        let mut entry = self
            .payments
            .get_entry(key)
            .await?
            .ok_or_else(|| EngineError::Storage(format!("ledger entry vanished: {key}")))?;
        if entry.state == EntryState::Applied {
            return Ok(());
        }
        let now = self.clock.now();
        entry.state = EntryState::Applied;
        entry.updated_at = now;
        self.payments.store_entry(entry.clone()).await?;

        let mut payment = self.load_payment(entry.booking_id).await?;
        payment.apply(entry.kind, entry.amount, now);
        self.payments.store_payment(payment).await?;
        Ok(())
    }

    async fn fail_entry(&self, key: &str) -> Result<()> {
        let Some(entry) = self.payments.get_entry(key).await? else {
            return Ok(());
        };
        let _guard = self.locks.acquire(entry.booking_id).await;
        let Some(mut entry) = self.payments.get_entry(key).await? else {
            return Ok(());
        };
        if entry.state == EntryState::Applied {
            return Ok(());
        }
        entry.state = EntryState::Failed;
        entry.updated_at = self.clock.now();
        self.payments.store_entry(entry).await?;
        Ok(())
    }

    async fn retrying<F, Fut, T>(&self, call: F) -> ProcessorResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ProcessorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(ProcessorError::Transient(reason)) if attempt + 1 < self.retry.max_attempts => {
                    debug!(attempt, reason, "transient processor failure, backing off");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn load_payment(&self, booking_id: Uuid) -> Result<TripPayment> {
        self.payments
            .get_payment(booking_id)
            .await?
            .ok_or(EngineError::NotFound("payment", booking_id))
    }
}

/// Shared handle used by the lifecycle and dispute services.
pub type LedgerRef = Arc<EscrowLedger>;
