//! Shared acceptance steps used by every handler

use std::sync::Arc;

use crate::domain::{Amount, DomainError, Transaction, TransactionStatus};
use crate::error::{AppError, AppResult};
use crate::idempotency::{IdempotencyKey, RecordOutcome};
use crate::settlement::{SettlementDeps, SettlementJob, SettlementPool};

use uuid::Uuid;

/// Collaborators of the acceptance path
#[derive(Clone)]
pub(crate) struct HandlerContext {
    pub deps: Arc<SettlementDeps>,
    pub settlement: Arc<SettlementPool>,
}

/// What happened when a pending transaction was journaled
pub(crate) enum Accepted {
    /// Newly journaled; settlement still has to be handed off
    New(Transaction),
    /// The idempotency key already belonged to this transaction
    Replay(Transaction),
}

impl HandlerContext {
    /// Return the transaction a previous request with `key` produced, if any
    pub async fn replay(&self, key: Option<&IdempotencyKey>) -> AppResult<Option<Transaction>> {
        match self.deps.journal.registry().resolve(key).await? {
            Some(id) => {
                let tx = self.deps.journal.get(id).await?;
                tracing::debug!(
                    transaction_id = %tx.id,
                    status = %tx.status,
                    "Idempotent replay"
                );
                Ok(Some(tx))
            }
            None => Ok(None),
        }
    }

    /// Best-effort funds check before accepting a debit-class operation.
    /// The authoritative check is the conditional adjust at settlement.
    pub async fn precheck_funds(&self, account_id: Uuid, amount: Amount) -> AppResult<()> {
        let balance = self.deps.ledger.get_or_create(account_id).await?;
        if !amount.is_covered_by(balance.amount) {
            return Err(DomainError::insufficient_funds(
                account_id,
                amount.value(),
                balance.amount,
            )
            .into());
        }
        Ok(())
    }

    pub async fn journal(&self, pending: &Transaction) -> AppResult<Accepted> {
        Ok(match self.deps.journal.create(pending).await? {
            RecordOutcome::Recorded(tx) => Accepted::New(tx),
            RecordOutcome::AlreadyExists(tx) => Accepted::Replay(tx),
        })
    }

    /// Hand a pending transaction to the worker pool
    ///
    /// If the pool refuses the job the transaction is failed immediately so
    /// it never lingers in `pending`.
    pub async fn enqueue(&self, tx: Transaction) -> AppResult<Transaction> {
        let job = SettlementJob::new(tx.clone(), self.deps.clone());

        match self.settlement.try_submit(job) {
            Ok(()) => Ok(tx),
            Err(e) => {
                tracing::warn!(
                    transaction_id = %tx.id,
                    error = %e,
                    "Settlement refused job"
                );
                self.deps
                    .journal
                    .update_status(tx.id, TransactionStatus::Failed, "settlement queue unavailable")
                    .await?;
                self.deps.metrics.record_failed();

                Err(AppError::Overloaded {
                    transaction_id: tx.id,
                    reason: e.to_string(),
                })
            }
        }
    }
}
