//! ledger_engine Library
//!
//! Ledger transaction engine: idempotent credits, debits and transfers
//! against per-account balances, settled by a bounded worker pool.
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod audit;
pub mod domain;
pub mod handlers;
pub mod idempotency;
pub mod journal;
pub mod ledger;
pub mod metrics;
pub mod saga;
pub mod settlement;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{AccountBalance, Amount, AmountError, DomainError};
pub use domain::{Transaction, TransactionStatus, TransactionType};
pub use handlers::LedgerService;
