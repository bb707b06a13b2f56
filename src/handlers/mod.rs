//! Command Handlers module
//!
//! Each handler validates a command, resolves its idempotency key, journals
//! a pending transaction and hands off settlement.

mod commands;
mod context;
mod credit_handler;
mod debit_handler;
mod service;
mod transfer_handler;


pub use commands::*;
pub use credit_handler::CreditHandler;
pub use debit_handler::DebitHandler;
pub use service::LedgerService;
pub use transfer_handler::TransferHandler;
