//! Idempotency Registry
//!
//! First writer wins. The key claim and the pending transaction row are
//! written by the store in one atomic step, so a caller that loses a race
//! always observes the winner's committed transaction.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{DomainError, Transaction};
use crate::store::{CreateOutcome, LedgerStore, StoreResult};

/// Longest accepted key, in bytes
pub const MAX_KEY_LEN: usize = 255;

/// Validated idempotency key
///
/// Surrounding whitespace is trimmed. A missing or blank key means the
/// request is not deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Parse an optional raw key
    ///
    /// # Examples
    /// ```
    /// use ledger_engine::idempotency::IdempotencyKey;
    ///
    /// let key = IdempotencyKey::parse(Some("  order-17 ")).unwrap().unwrap();
    /// assert_eq!(key.as_str(), "order-17");
    /// assert!(IdempotencyKey::parse(Some("   ")).unwrap().is_none());
    /// ```
    pub fn parse(raw: Option<&str>) -> Result<Option<Self>, DomainError> {
        let trimmed = match raw.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => return Ok(None),
        };

        if trimmed.len() > MAX_KEY_LEN {
            return Err(DomainError::InvalidIdempotencyKey(format!(
                "key is {} bytes, maximum is {}",
                trimmed.len(),
                MAX_KEY_LEN
            )));
        }

        Ok(Some(Self(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of [`IdempotencyRegistry::record`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This caller claimed the key (or the transaction had none)
    Recorded(Transaction),
    /// The key was already claimed; carries the original transaction
    AlreadyExists(Transaction),
}

impl RecordOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            RecordOutcome::Recorded(tx) | RecordOutcome::AlreadyExists(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            RecordOutcome::Recorded(tx) | RecordOutcome::AlreadyExists(tx) => tx,
        }
    }
}

impl From<CreateOutcome> for RecordOutcome {
    fn from(outcome: CreateOutcome) -> Self {
        match outcome {
            CreateOutcome::Inserted(tx) => RecordOutcome::Recorded(tx),
            CreateOutcome::Existing(tx) => RecordOutcome::AlreadyExists(tx),
        }
    }
}

/// Registry of idempotency keys, backed by the store's uniqueness guarantee
#[derive(Clone)]
pub struct IdempotencyRegistry {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyRegistry {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Find the transaction that already owns `key`
    pub async fn resolve(&self, key: Option<&IdempotencyKey>) -> StoreResult<Option<Uuid>> {
        match key {
            Some(key) => self.store.find_transaction_id_by_key(key.as_str()).await,
            None => Ok(None),
        }
    }

    /// Claim the pending transaction's key by inserting the transaction
    pub async fn record(&self, pending: &Transaction) -> StoreResult<RecordOutcome> {
        let outcome = self.store.create_transaction(pending).await?;

        if let CreateOutcome::Existing(existing) = &outcome {
            tracing::debug!(
                idempotency_key = ?existing.idempotency_key,
                transaction_id = %existing.id,
                "Idempotency key already recorded, returning original transaction"
            );
        }

        Ok(outcome.into())
    }
}
