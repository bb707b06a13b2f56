//! Command definitions
//!
//! Commands carry raw caller input. Amounts and idempotency keys are
//! validated by the handlers, before anything is journaled.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command to credit an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCommand {
    pub account_id: Uuid,
    /// Minor units
    pub amount: i64,
    pub idempotency_key: Option<String>,
}

impl CreditCommand {
    pub fn new(account_id: Uuid, amount: i64) -> Self {
        Self {
            account_id,
            amount,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Command to debit an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitCommand {
    pub account_id: Uuid,
    /// Minor units
    pub amount: i64,
    pub idempotency_key: Option<String>,
}

impl DebitCommand {
    pub fn new(account_id: Uuid, amount: i64) -> Self {
        Self {
            account_id,
            amount,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Command to move value between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    /// Minor units
    pub amount: i64,
    pub idempotency_key: Option<String>,
}

impl TransferCommand {
    pub fn new(from_account_id: Uuid, to_account_id: Uuid, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
