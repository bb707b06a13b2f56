//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod error;
pub mod transaction;

pub use amount::{Amount, AmountError, MAX_AMOUNT};
pub use error::DomainError;
pub use transaction::{AccountBalance, Transaction, TransactionStatus, TransactionType};
