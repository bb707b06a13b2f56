//! Transactional Store
//!
//! The contract every backing store must honour, plus the PostgreSQL and
//! in-memory implementations. The only synchronized mutation in the whole
//! engine (an account's balance) is confined to
//! [`LedgerStore::conditional_adjust_balance`] and [`LedgerStore::run_atomic`].

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AccountBalance, Transaction, TransactionStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds in account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        account_id: Uuid,
        available: i64,
        requested: i64,
    },

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Balance overflow for account {0}")]
    Overflow(Uuid),

    #[error("Atomic multi-step execution is not supported by this store")]
    AtomicUnsupported,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if this error is the conditional-adjust refusal
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, StoreError::InsufficientFunds { .. })
    }
}

/// Result of a key-aware transaction insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The row was written by this call
    Inserted(Transaction),
    /// Another caller already holds the idempotency key; this is its row
    Existing(Transaction),
}

impl CreateOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            CreateOutcome::Inserted(tx) | CreateOutcome::Existing(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            CreateOutcome::Inserted(tx) | CreateOutcome::Existing(tx) => tx,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, CreateOutcome::Inserted(_))
    }
}

/// Result of a compare-and-set status update (`pending → status`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The row was pending and now carries the requested status
    Applied,
    /// The row was already terminal; carries the recorded status
    AlreadyTerminal(TransactionStatus),
}

/// One step of a multi-statement atomic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicStep {
    /// Conditional balance adjustment; negative deltas require cover
    AdjustBalance { account_id: Uuid, delta: i64 },
    /// Compare-and-set `pending → status`; aborts the unit if the row is not pending
    SetStatus {
        transaction_id: Uuid,
        status: TransactionStatus,
    },
}

/// Contract of the transactional store
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch the balance row, creating a zero row if absent
    async fn get_or_create_account(&self, account_id: Uuid) -> StoreResult<AccountBalance>;

    /// Read the balance row without creating it
    async fn get_balance(&self, account_id: Uuid) -> StoreResult<Option<AccountBalance>>;

    /// Apply `delta` as one atomic step. Positive deltas always succeed
    /// (creating the row lazily); negative deltas succeed only if
    /// `balance + delta >= 0`, otherwise `StoreError::InsufficientFunds`.
    async fn conditional_adjust_balance(
        &self,
        account_id: Uuid,
        delta: i64,
    ) -> StoreResult<AccountBalance>;

    /// Insert a pending transaction. When it carries an idempotency key that
    /// is already taken, nothing is written and the existing row is returned.
    async fn create_transaction(&self, tx: &Transaction) -> StoreResult<CreateOutcome>;

    /// Look up the transaction that owns an idempotency key
    async fn find_transaction_id_by_key(&self, key: &str) -> StoreResult<Option<Uuid>>;

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Transactions where the account is source or destination, newest first
    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transaction>>;

    /// Compare-and-set `pending → status`
    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> StoreResult<StatusChange>;

    /// Whether [`LedgerStore::run_atomic`] is available
    fn supports_atomic(&self) -> bool {
        false
    }

    /// Execute all steps as one indivisible unit: either every step applies
    /// or none does.
    async fn run_atomic(&self, _steps: &[AtomicStep]) -> StoreResult<()> {
        Err(StoreError::AtomicUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;

    #[test]
    fn test_create_outcome_accessors() {
        let tx = Transaction::pending_credit(Uuid::new_v4(), Amount::new(1).unwrap(), None);

        let inserted = CreateOutcome::Inserted(tx.clone());
        assert!(inserted.is_inserted());
        assert_eq!(inserted.transaction().id, tx.id);

        let existing = CreateOutcome::Existing(tx.clone());
        assert!(!existing.is_inserted());
        assert_eq!(existing.into_transaction(), tx);
    }

    #[test]
    fn test_store_error_display() {
        let account = Uuid::new_v4();
        let err = StoreError::InsufficientFunds {
            account_id: account,
            available: 100,
            requested: 150,
        };
        assert!(err.is_insufficient_funds());
        assert!(err.to_string().contains("available 100"));

        assert!(!StoreError::AtomicUnsupported.is_insufficient_funds());
        assert!(StoreError::NotFound("tx".into()).to_string().contains("not found"));
    }
}
