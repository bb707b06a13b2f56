//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;
use uuid::Uuid;

use super::AmountError;

/// Domain-specific errors
///
/// These errors represent business rule violations detected before any
/// journal write. They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Transfer to same account
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// Idempotency key rejected by validation
    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    /// Insufficient funds for a debit-class operation
    #[error("Insufficient funds in account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: Uuid,
        required: i64,
        available: i64,
    },
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(account_id: Uuid, required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            account_id,
            required,
            available,
        }
    }

    /// Check if this is a validation error (rejected with no side effect)
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_) | Self::SameAccountTransfer | Self::InvalidIdempotencyKey(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_error() {
        let account = Uuid::new_v4();
        let err = DomainError::insufficient_funds(account, 150, 100);

        assert!(!err.is_validation_error());
        assert!(err.to_string().contains("150"));
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains(&account.to_string()));
    }

    #[test]
    fn test_validation_errors() {
        assert!(DomainError::SameAccountTransfer.is_validation_error());
        assert!(DomainError::from(AmountError::NotPositive(0)).is_validation_error());
        assert!(DomainError::InvalidIdempotencyKey("too long".into()).is_validation_error());
    }
}
