//! Amount type
//!
//! Domain primitive for monetary amounts in minor currency units.
//! All amounts are validated at construction time, ensuring invalid values
//! cannot exist past the command boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed amount for a single operation (10^15 minor units)
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Amount represents a validated, strictly positive number of minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum value is [`MAX_AMOUNT`]
///
/// # Example
/// ```
/// use ledger_engine::domain::Amount;
///
/// let amount = Amount::new(500).unwrap();
/// assert_eq!(amount.value(), 500);
/// assert_eq!(amount.debit_delta(), -500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Amount exceeds maximum allowed value ({})", MAX_AMOUNT)]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::Overflow` if value > [`MAX_AMOUNT`]
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value <= 0 {
            return Err(AmountError::NotPositive(value));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Get the underlying number of minor units.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Signed delta that adds this amount to a balance.
    pub fn credit_delta(&self) -> i64 {
        self.0
    }

    /// Signed delta that removes this amount from a balance.
    pub fn debit_delta(&self) -> i64 {
        -self.0
    }

    /// Check whether a balance covers this amount.
    pub fn is_covered_by(&self, balance: i64) -> bool {
        balance >= self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| AmountError::ParseError(e.to_string()))?;
        Amount::new(value)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
