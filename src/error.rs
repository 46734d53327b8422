use crate::domain::booking::BookingStatus;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error taxonomy for the booking and settlement engine.
///
/// Validation and transition errors are returned to the caller with no side
/// effects. Ledger and processor errors are never swallowed: an uncertain
/// outcome leaves the booking in an explicit pending sub-state that the
/// reconciliation sweep resolves, and the caller sees
/// [`EngineError::PaymentPending`] rather than an ambiguous success.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cannot apply {event} to a booking in state {from}")]
    InvalidTransition {
        from: BookingStatus,
        event: &'static str,
    },

    #[error("quotation total is outside the request's budget range")]
    OutOfBudget,

    #[error("offer validity must end between today and the trip start date")]
    InvalidValidityWindow,

    #[error("validation error: {0}")]
    Validation(String),

    /// Internal invariant breach: a release or refund would exceed the
    /// captured total. Logged at error level and never sent to the processor.
    #[error("ledger overrun on booking {0}: release + refund would exceed captured total")]
    LedgerOverrun(Uuid),

    #[error("payment processor unavailable")]
    ProcessorUnavailable,

    /// The outcome of a settlement call is not yet known. The booking stays
    /// in its pending sub-state until the reconciliation sweep resolves it.
    #[error("settlement still processing for booking {0}")]
    PaymentPending(Uuid),

    #[error("offer has already been decided")]
    AlreadyDecided,

    #[error("dispute has already been resolved")]
    AlreadyResolved,

    #[error("{0} not found: {1}")]
    NotFound(&'static str, Uuid),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("event error: {0}")]
    Event(#[from] serde_json::Error),

    #[error("report error: {0}")]
    Report(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
