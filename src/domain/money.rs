use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A strictly positive monetary amount, rounded to cents.
///
/// Wrapper around `rust_decimal::Decimal` so quotation totals and escrow
/// movements cannot be zero or negative by construction; deserialization
/// goes through the same validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value.round_dp(2)))
        } else {
            Err(EngineError::Validation(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// First tranche of an even split, rounded to cents. The second tranche
    /// must always be computed as `total - first` so the two sum exactly.
    pub fn half(&self) -> Decimal {
        (self.0 / Decimal::TWO).round_dp(2)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A percentage share of a total, rounded to cents. Callers settle the
/// counterparty with the exact remainder, never with a second rounding.
pub fn share_of(total: Decimal, numerator: i64, denominator: i64) -> Decimal {
    (total * Decimal::new(numerator, 0) / Decimal::new(denominator, 0)).round_dp(2)
}
