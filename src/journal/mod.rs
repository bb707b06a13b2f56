//! Transaction Journal
//!
//! Owns transaction records and enforces their state machine. A transaction
//! is created `pending` by the acceptance path and advanced to exactly one
//! terminal status by the settlement path. Every status change is followed
//! by an audit entry carrying the reason.

use std::sync::Arc;

use uuid::Uuid;

use crate::audit::{append_best_effort, AuditAction, AuditEntry, AuditSink};
use crate::domain::{Transaction, TransactionStatus};
use crate::idempotency::{IdempotencyRegistry, RecordOutcome};
use crate::store::{LedgerStore, StatusChange, StoreError};

/// Page size when the caller gives none
pub const DEFAULT_LIST_LIMIT: i64 = 50;
/// Largest accepted page size
pub const MAX_LIST_LIMIT: i64 = 200;

/// Journal errors
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid status transition for transaction {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

pub type JournalResult<T> = Result<T, JournalError>;

/// Clamp caller-supplied paging to the accepted window
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Transaction journal
#[derive(Clone)]
pub struct TransactionJournal {
    store: Arc<dyn LedgerStore>,
    registry: IdempotencyRegistry,
    audit: Arc<dyn AuditSink>,
}

impl TransactionJournal {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            registry: IdempotencyRegistry::new(store.clone()),
            store,
            audit,
        }
    }

    pub fn registry(&self) -> &IdempotencyRegistry {
        &self.registry
    }

    /// Journal a pending transaction
    ///
    /// A duplicate idempotency key is not an error: the original row comes
    /// back as [`RecordOutcome::AlreadyExists`] and nothing is written.
    pub async fn create(&self, pending: &Transaction) -> JournalResult<RecordOutcome> {
        let outcome = self.registry.record(pending).await?;

        if let RecordOutcome::Recorded(tx) = &outcome {
            tracing::debug!(
                transaction_id = %tx.id,
                kind = %tx.kind,
                amount = %tx.amount,
                "Transaction journaled"
            );

            append_best_effort(
                self.audit.as_ref(),
                AuditEntry::transaction(tx.id, AuditAction::Created)
                    .details(format!("{}: {}", tx.kind, tx.amount)),
            )
            .await;
        }

        Ok(outcome)
    }

    pub async fn get(&self, id: Uuid) -> JournalResult<Transaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or(JournalError::NotFound(id))
    }

    /// Transactions touching `account_id`, newest first
    pub async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> JournalResult<Vec<Transaction>> {
        let (limit, offset) = page_bounds(limit, offset);
        Ok(self
            .store
            .list_transactions(account_id, limit, offset)
            .await?)
    }

    /// Move a pending transaction to the terminal `status`
    ///
    /// Repeating the status already recorded is a no-op. Asking for a
    /// different terminal status is an [`JournalError::InvalidTransition`].
    pub async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        reason: &str,
    ) -> JournalResult<()> {
        if !status.is_terminal() {
            return Err(JournalError::InvalidTransition {
                id,
                from: TransactionStatus::Pending,
                to: status,
            });
        }

        match self.store.update_transaction_status(id, status).await? {
            StatusChange::Applied => {
                tracing::info!(
                    transaction_id = %id,
                    status = %status,
                    reason = %reason,
                    "Transaction settled"
                );
                self.audit_status_change(id, status, reason).await;
                Ok(())
            }
            StatusChange::AlreadyTerminal(recorded) if recorded == status => {
                tracing::debug!(
                    transaction_id = %id,
                    status = %status,
                    "Status already recorded"
                );
                Ok(())
            }
            StatusChange::AlreadyTerminal(recorded) => {
                tracing::error!(
                    transaction_id = %id,
                    recorded = %recorded,
                    requested = %status,
                    "Refusing to overwrite terminal status"
                );
                Err(JournalError::InvalidTransition {
                    id,
                    from: recorded,
                    to: status,
                })
            }
        }
    }

    /// Audit a status change that was applied outside [`Self::update_status`],
    /// e.g. inside an atomic store unit
    pub async fn audit_status_change(&self, id: Uuid, status: TransactionStatus, reason: &str) {
        append_best_effort(
            self.audit.as_ref(),
            AuditEntry::transaction(id, AuditAction::StatusChange)
                .details(format!("{}: {}", status, reason)),
        )
        .await;
    }

    /// Record that balances were left inconsistent and need manual repair
    pub async fn flag_reconciliation(&self, id: Uuid, detail: &str) {
        append_best_effort(
            self.audit.as_ref(),
            AuditEntry::transaction(id, AuditAction::ReconciliationRequired).details(detail),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::domain::Amount;
    use crate::store::MemoryStore;

    fn journal() -> (TransactionJournal, Arc<MemoryAuditLog>) {
        let audit = Arc::new(MemoryAuditLog::new());
        let journal = TransactionJournal::new(Arc::new(MemoryStore::new()), audit.clone());
        (journal, audit)
    }

    fn credit(key: Option<&str>) -> Transaction {
        Transaction::pending_credit(
            Uuid::new_v4(),
            Amount::new(100).unwrap(),
            key.map(str::to_string),
        )
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(None, None), (50, 0));
        assert_eq!(page_bounds(Some(0), Some(-5)), (1, 0));
        assert_eq!(page_bounds(Some(10_000), Some(7)), (200, 7));
    }

    #[tokio::test]
    async fn test_create_audits_only_new_rows() {
        let (journal, audit) = journal();
        let first = credit(Some("k1"));

        let outcome = journal.create(&first).await.unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded(_)));

        let outcome = journal.create(&credit(Some("k1"))).await.unwrap();
        assert_eq!(outcome.transaction().id, first.id);
        assert!(matches!(outcome, RecordOutcome::AlreadyExists(_)));

        let created: Vec<_> = audit
            .entries()
            .into_iter()
            .filter(|e| e.action == AuditAction::Created)
            .collect();
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (journal, _) = journal();
        let id = Uuid::new_v4();
        assert!(matches!(
            journal.get(id).await,
            Err(JournalError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_update_status_records_reason() {
        let (journal, audit) = journal();
        let tx = credit(None);
        journal.create(&tx).await.unwrap();

        journal
            .update_status(tx.id, TransactionStatus::Completed, "settled")
            .await
            .unwrap();

        assert_eq!(
            journal.get(tx.id).await.unwrap().status,
            TransactionStatus::Completed
        );
        let last = audit.entries_for(tx.id).pop().unwrap();
        assert_eq!(last.action, AuditAction::StatusChange);
        assert_eq!(last.details, "completed: settled");
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let (journal, audit) = journal();
        let tx = credit(None);
        journal.create(&tx).await.unwrap();
        journal
            .update_status(tx.id, TransactionStatus::Failed, "boom")
            .await
            .unwrap();

        // Same status again: no-op, no extra audit entry
        journal
            .update_status(tx.id, TransactionStatus::Failed, "boom again")
            .await
            .unwrap();
        assert_eq!(audit.entries_for(tx.id).len(), 2);

        let err = journal
            .update_status(tx.id, TransactionStatus::Completed, "late")
            .await
            .unwrap_err();
        match err {
            JournalError::InvalidTransition { from, to, .. } => {
                assert_eq!(from, TransactionStatus::Failed);
                assert_eq!(to, TransactionStatus::Completed);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
        assert_eq!(
            journal.get(tx.id).await.unwrap().status,
            TransactionStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_pending_is_not_a_valid_target() {
        let (journal, _) = journal();
        let tx = credit(None);
        journal.create(&tx).await.unwrap();

        assert!(matches!(
            journal
                .update_status(tx.id, TransactionStatus::Pending, "noop")
                .await,
            Err(JournalError::InvalidTransition { .. })
        ));
    }
}
