//! Transfer Saga
//!
//! Moves `amount` from one account to another. When the store can run a
//! multi-step unit atomically, debit, credit and the `completed` flip commit
//! together or not at all. Otherwise the saga debits first and, if the credit
//! then fails, credits the source back and marks the transfer `rolled_back`.
//!
//! | Path     | Event                               | Status        |
//! |----------|-------------------------------------|---------------|
//! | atomic   | unit committed                      | `completed`   |
//! | atomic   | unit aborted                        | `rolled_back` |
//! | fallback | debit refused or failed             | `failed`      |
//! | fallback | credit ok                           | `completed`   |
//! | fallback | credit failed, compensation ok      | `rolled_back` |
//! | fallback | credit failed, compensation failed  | `failed`, flagged for reconciliation |
//!
//! On the fallback path the debit is visible to readers until the credit or
//! the compensation lands.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::journal::{JournalResult, TransactionJournal};
use crate::ledger::BalanceLedger;
use crate::store::{AtomicStep, LedgerStore, StoreError};

#[derive(Clone)]
pub struct TransferSaga {
    store: Arc<dyn LedgerStore>,
    ledger: BalanceLedger,
    journal: TransactionJournal,
}

impl TransferSaga {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: BalanceLedger,
        journal: TransactionJournal,
    ) -> Self {
        Self {
            store,
            ledger,
            journal,
        }
    }

    /// Whether transfers settle as one atomic store unit
    pub fn is_atomic(&self) -> bool {
        self.store.supports_atomic()
    }

    /// Settle a pending transfer and return the terminal status it reached
    pub async fn execute(&self, tx: &Transaction) -> JournalResult<TransactionStatus> {
        let (from, to) = match (tx.from_account_id, tx.to_account_id) {
            (Some(from), Some(to)) if from != to => (from, to),
            _ => {
                tracing::error!(transaction_id = %tx.id, "Malformed transfer snapshot");
                self.journal
                    .update_status(tx.id, TransactionStatus::Failed, "malformed transfer")
                    .await?;
                return Ok(TransactionStatus::Failed);
            }
        };

        if self.is_atomic() {
            match self.run_atomic(tx, from, to).await {
                Err(StoreError::AtomicUnsupported) => {}
                Ok(()) => {
                    // The status flip was part of the unit; only the audit remains
                    self.journal
                        .audit_status_change(tx.id, TransactionStatus::Completed, "transfer committed")
                        .await;
                    tracing::info!(
                        transaction_id = %tx.id,
                        from = %from,
                        to = %to,
                        amount = %tx.amount,
                        "Transfer committed"
                    );
                    return Ok(TransactionStatus::Completed);
                }
                Err(e) => {
                    tracing::warn!(
                        transaction_id = %tx.id,
                        error = %e,
                        "Atomic transfer aborted"
                    );
                    self.journal
                        .update_status(
                            tx.id,
                            TransactionStatus::RolledBack,
                            &format!("transfer aborted: {}", e),
                        )
                        .await?;
                    return Ok(TransactionStatus::RolledBack);
                }
            }
        }

        self.run_compensable(tx, from, to).await
    }

    async fn run_atomic(
        &self,
        tx: &Transaction,
        from: Uuid,
        to: Uuid,
    ) -> Result<(), StoreError> {
        let steps = [
            AtomicStep::AdjustBalance {
                account_id: from,
                delta: tx.amount.debit_delta(),
            },
            AtomicStep::AdjustBalance {
                account_id: to,
                delta: tx.amount.credit_delta(),
            },
            AtomicStep::SetStatus {
                transaction_id: tx.id,
                status: TransactionStatus::Completed,
            },
        ];

        self.store.run_atomic(&steps).await
    }

    async fn run_compensable(
        &self,
        tx: &Transaction,
        from: Uuid,
        to: Uuid,
    ) -> JournalResult<TransactionStatus> {
        if let Err(e) = self.ledger.debit(from, tx.amount).await {
            tracing::warn!(transaction_id = %tx.id, error = %e, "Transfer debit refused");
            self.journal
                .update_status(
                    tx.id,
                    TransactionStatus::Failed,
                    &format!("debit failed: {}", e),
                )
                .await?;
            return Ok(TransactionStatus::Failed);
        }

        let credit_err = match self.ledger.credit(to, tx.amount).await {
            Ok(_) => {
                self.journal
                    .update_status(tx.id, TransactionStatus::Completed, "transfer settled")
                    .await?;
                return Ok(TransactionStatus::Completed);
            }
            Err(e) => e,
        };

        tracing::warn!(
            transaction_id = %tx.id,
            error = %credit_err,
            "Transfer credit failed, compensating debit"
        );

        match self.ledger.credit(from, tx.amount).await {
            Ok(_) => {
                self.journal
                    .update_status(
                        tx.id,
                        TransactionStatus::RolledBack,
                        &format!("credit failed: {}; debit compensated", credit_err),
                    )
                    .await?;
                Ok(TransactionStatus::RolledBack)
            }
            Err(compensation_err) => {
                tracing::error!(
                    transaction_id = %tx.id,
                    account_id = %from,
                    amount = %tx.amount,
                    credit_error = %credit_err,
                    compensation_error = %compensation_err,
                    "Compensation failed, balances require reconciliation"
                );
                let detail = format!(
                    "debited {} from {} but neither the credit ({}) nor the compensation ({}) applied",
                    tx.amount, from, credit_err, compensation_err
                );
                self.journal.flag_reconciliation(tx.id, &detail).await;
                self.journal
                    .update_status(
                        tx.id,
                        TransactionStatus::Failed,
                        "compensation failed, reconciliation required",
                    )
                    .await?;
                Ok(TransactionStatus::Failed)
            }
        }
    }
}
