//! Transaction record and its state machine
//!
//! `Pending → {Completed, Failed, RolledBack}`. All three destinations are
//! terminal; no edge leaves a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Amount;

/// Kind of value movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Credit,
    Debit,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(TransactionType::Credit),
            "debit" => Ok(TransactionType::Debit),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Accepted, settlement not yet applied
    Pending,
    /// Terminal: effect applied to balances
    Completed,
    /// Terminal: never applied to any balance
    Failed,
    /// Terminal: partially applied, then reverted
    RolledBack,
}

impl TransactionStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Whether the state machine has an edge `self → next`
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "rolled_back" => Ok(TransactionStatus::RolledBack),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// A journaled transaction. Also the snapshot handed to callers and to
/// settlement jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Transaction {
    fn pending(
        kind: TransactionType,
        amount: Amount,
        from_account_id: Option<Uuid>,
        to_account_id: Option<Uuid>,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: TransactionStatus::Pending,
            amount,
            from_account_id,
            to_account_id,
            created_at: Utc::now(),
            idempotency_key,
        }
    }

    /// New pending credit to `account_id`
    pub fn pending_credit(account_id: Uuid, amount: Amount, key: Option<String>) -> Self {
        Self::pending(TransactionType::Credit, amount, None, Some(account_id), key)
    }

    /// New pending debit from `account_id`
    pub fn pending_debit(account_id: Uuid, amount: Amount, key: Option<String>) -> Self {
        Self::pending(TransactionType::Debit, amount, Some(account_id), None, key)
    }

    /// New pending transfer `from → to`
    pub fn pending_transfer(from: Uuid, to: Uuid, amount: Amount, key: Option<String>) -> Self {
        Self::pending(TransactionType::Transfer, amount, Some(from), Some(to), key)
    }

    /// Whether `account_id` is either endpoint of this transaction
    pub fn touches(&self, account_id: Uuid) -> bool {
        self.from_account_id == Some(account_id) || self.to_account_id == Some(account_id)
    }

    /// Copy of this snapshot with a different status
    pub fn with_status(&self, status: TransactionStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Per-account balance row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: Uuid,
    /// Minor currency units, never negative
    pub amount: i64,
    pub last_updated_at: DateTime<Utc>,
}

impl AccountBalance {
    /// Zero balance for an account that has no row yet
    pub fn zero(account_id: Uuid) -> Self {
        Self {
            account_id,
            amount: 0,
            last_updated_at: Utc::now(),
        }
    }
}
