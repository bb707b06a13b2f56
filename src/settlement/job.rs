//! Settlement jobs
//!
//! A job is one settlement effect bound to an immutable transaction snapshot
//! and an explicit handle to the collaborators it needs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::journal::{JournalError, TransactionJournal};
use crate::ledger::BalanceLedger;
use crate::metrics::LedgerMetrics;
use crate::saga::TransferSaga;
use crate::store::StoreError;

/// What a job does to balances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementEffect {
    ApplyCredit,
    ApplyDebit,
    RunTransferSaga,
}

impl SettlementEffect {
    pub fn for_kind(kind: TransactionType) -> Self {
        match kind {
            TransactionType::Credit => SettlementEffect::ApplyCredit,
            TransactionType::Debit => SettlementEffect::ApplyDebit,
            TransactionType::Transfer => SettlementEffect::RunTransferSaga,
        }
    }
}

/// Errors raised while applying a job; they end the transaction `failed`
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Malformed transaction {0}: {1}")]
    Malformed(Uuid, &'static str),
}

/// Collaborators shared by every job
#[derive(Clone)]
pub struct SettlementDeps {
    pub ledger: BalanceLedger,
    pub journal: TransactionJournal,
    pub saga: TransferSaga,
    pub metrics: LedgerMetrics,
}

/// One unit of settlement work
pub struct SettlementJob {
    effect: SettlementEffect,
    transaction: Transaction,
    deps: Arc<SettlementDeps>,
}

impl SettlementJob {
    pub fn new(transaction: Transaction, deps: Arc<SettlementDeps>) -> Self {
        Self {
            effect: SettlementEffect::for_kind(transaction.kind),
            transaction,
            deps,
        }
    }

    pub fn effect(&self) -> SettlementEffect {
        self.effect
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Run the job to a terminal status. Never panics and never returns an
    /// error: failures and panics become a `failed` status for this
    /// transaction only.
    pub async fn run(self) -> TransactionStatus {
        let id = self.transaction.id;

        let status = match AssertUnwindSafe(self.apply()).catch_unwind().await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::error!(transaction_id = %id, error = %e, "Settlement job failed");
                self.fail(&format!("settlement error: {}", e)).await
            }
            Err(panic) => {
                tracing::error!(
                    transaction_id = %id,
                    panic = %panic_message(panic.as_ref()),
                    "Settlement job panicked"
                );
                self.fail("settlement panicked").await
            }
        };

        self.deps
            .metrics
            .record_outcome(self.transaction.kind, status);
        status
    }

    async fn apply(&self) -> Result<TransactionStatus, SettlementError> {
        let tx = &self.transaction;
        let deps = &self.deps;

        match self.effect {
            SettlementEffect::ApplyCredit => {
                let account = tx
                    .to_account_id
                    .ok_or(SettlementError::Malformed(tx.id, "credit without destination"))?;

                deps.ledger.credit(account, tx.amount).await?;
                deps.journal
                    .update_status(tx.id, TransactionStatus::Completed, "credit applied")
                    .await?;
                Ok(TransactionStatus::Completed)
            }
            SettlementEffect::ApplyDebit => {
                let account = tx
                    .from_account_id
                    .ok_or(SettlementError::Malformed(tx.id, "debit without source"))?;

                match deps.ledger.debit(account, tx.amount).await {
                    Ok(_) => {
                        deps.journal
                            .update_status(tx.id, TransactionStatus::Completed, "debit applied")
                            .await?;
                        Ok(TransactionStatus::Completed)
                    }
                    Err(e) if e.is_insufficient_funds() => {
                        deps.journal
                            .update_status(tx.id, TransactionStatus::Failed, &e.to_string())
                            .await?;
                        Ok(TransactionStatus::Failed)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            SettlementEffect::RunTransferSaga => Ok(deps.saga.execute(tx).await?),
        }
    }

    /// Mark the transaction failed; returns the status actually recorded
    async fn fail(&self, reason: &str) -> TransactionStatus {
        let id = self.transaction.id;
        let journal = &self.deps.journal;

        match journal.update_status(id, TransactionStatus::Failed, reason).await {
            Ok(()) => TransactionStatus::Failed,
            Err(e) => {
                tracing::error!(
                    transaction_id = %id,
                    error = %e,
                    "Could not mark transaction failed"
                );
                journal
                    .get(id)
                    .await
                    .map(|tx| tx.status)
                    .unwrap_or(TransactionStatus::Pending)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
