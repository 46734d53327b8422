//! Simulated payment processor with scriptable faults. Stands in for the
//! real gateway in the replayer and in tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::ports::{
    PaymentProcessor, ProcessorError, ProcessorReceipt, ProcessorResult, RemoteStatus,
};

/// A scripted failure for the next call(s) carrying a given idempotency key.
#[derive(Debug, Clone)]
pub enum Fault {
    Transient,
    Declined,
    /// The call fails transiently on our side but the money moves remotely,
    /// so a later `status_of` reports it confirmed.
    TransientButApplied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub key: String,
    pub amount: Decimal,
}

#[derive(Default)]
struct State {
    applied: HashSet<String>,
    faults: HashMap<String, VecDeque<Fault>>,
    calls: Vec<RecordedCall>,
    intents: u64,
}

/// Idempotent by key: a second delivery of an already-applied key succeeds
/// without recording a second application.
#[derive(Default)]
pub struct SimulatedProcessor {
    state: Mutex<State>,
}

impl SimulatedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fault for the next call carrying `key`. Multiple queued
    /// faults fire in order, one per call.
    pub fn fail_next(&self, key: &str, fault: Fault) {
        let mut state = self.state.lock().unwrap();
        state.faults.entry(key.to_string()).or_default().push_back(fault);
    }

    /// Marks a key applied remotely without any call having succeeded
    /// locally, for read-repair scenarios.
    pub fn force_applied(&self, key: &str) {
        self.state.lock().unwrap().applied.insert(key.to_string());
    }

    pub fn was_applied(&self, key: &str) -> bool {
        self.state.lock().unwrap().applied.contains(key)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn perform(
        &self,
        operation: &'static str,
        key: &str,
        amount: Decimal,
    ) -> ProcessorResult<ProcessorReceipt> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            operation,
            key: key.to_string(),
            amount,
        });

        if state.applied.contains(key) {
            return Ok(ProcessorReceipt {
                reference: format!("receipt-{key}"),
            });
        }

        let fault = state
            .faults
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        match fault {
            Some(Fault::Transient) => {
                Err(ProcessorError::Transient("simulated outage".to_string()))
            }
            Some(Fault::Declined) => {
                Err(ProcessorError::Declined("simulated decline".to_string()))
            }
            Some(Fault::TransientButApplied) => {
                state.applied.insert(key.to_string());
                Err(ProcessorError::Transient(
                    "simulated lost response".to_string(),
                ))
            }
            None => {
                state.applied.insert(key.to_string());
                Ok(ProcessorReceipt {
                    reference: format!("receipt-{key}"),
                })
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    async fn create_intent(
        &self,
        booking_id: Uuid,
        _amount: Decimal,
    ) -> ProcessorResult<ProcessorReceipt> {
        let mut state = self.state.lock().unwrap();
        let fault = state
            .faults
            .get_mut("create-intent")
            .and_then(|queue| queue.pop_front());
        if let Some(Fault::Transient) = fault {
            return Err(ProcessorError::Transient("simulated outage".to_string()));
        }
        state.intents += 1;
        let serial = state.intents;
        Ok(ProcessorReceipt {
            reference: format!("pi-{booking_id}-{serial}"),
        })
    }

    async fn capture(
        &self,
        _reference: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> ProcessorResult<ProcessorReceipt> {
        self.perform("capture", idempotency_key, amount)
    }

    async fn release(
        &self,
        _reference: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> ProcessorResult<ProcessorReceipt> {
        self.perform("release", idempotency_key, amount)
    }

    async fn refund(
        &self,
        _reference: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> ProcessorResult<ProcessorReceipt> {
        self.perform("refund", idempotency_key, amount)
    }

    async fn status_of(&self, idempotency_key: &str) -> ProcessorResult<RemoteStatus> {
        let state = self.state.lock().unwrap();
        if state.applied.contains(idempotency_key) {
            Ok(RemoteStatus::Confirmed)
        } else {
            Ok(RemoteStatus::Unknown)
        }
    }
}
