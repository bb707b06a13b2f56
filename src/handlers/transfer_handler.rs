//! Transfer Handler
//!
//! Accepts a transfer between two accounts. When the store can settle it
//! atomically the saga runs inline and the terminal snapshot is returned;
//! otherwise the transfer is queued like any other settlement.

use crate::domain::{Amount, DomainError, Transaction};
use crate::error::{AppError, AppResult};
use crate::idempotency::IdempotencyKey;
use crate::settlement::SettlementJob;

use super::context::{Accepted, HandlerContext};
use super::TransferCommand;

/// Handler for transfers
#[derive(Clone)]
pub struct TransferHandler {
    ctx: HandlerContext,
}

impl TransferHandler {
    pub(crate) fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Execute the transfer command
    pub async fn execute(&self, command: TransferCommand) -> AppResult<Transaction> {
        // Validate same account transfer
        if command.from_account_id == command.to_account_id {
            return Err(DomainError::SameAccountTransfer.into());
        }

        let amount = Amount::new(command.amount).map_err(DomainError::from)?;
        let key = IdempotencyKey::parse(command.idempotency_key.as_deref())?;

        if let Some(existing) = self.ctx.replay(key.as_ref()).await? {
            return Ok(existing);
        }

        self.ctx
            .precheck_funds(command.from_account_id, amount)
            .await?;

        let pending = Transaction::pending_transfer(
            command.from_account_id,
            command.to_account_id,
            amount,
            key.map(IdempotencyKey::into_inner),
        );

        let tx = match self.ctx.journal(&pending).await? {
            Accepted::Replay(tx) => return Ok(tx),
            Accepted::New(tx) => tx,
        };

        tracing::info!(
            transaction_id = %tx.id,
            from = %command.from_account_id,
            to = %command.to_account_id,
            amount = %amount,
            "Transfer accepted"
        );

        if self.ctx.deps.saga.is_atomic() {
            // Same containment as a queued job: errors and panics end `failed`
            let status = SettlementJob::new(tx.clone(), self.ctx.deps.clone())
                .run()
                .await;
            if !status.is_terminal() {
                return Err(AppError::Internal(format!(
                    "transfer {} could not be settled or failed",
                    tx.id
                )));
            }
            return Ok(tx.with_status(status));
        }

        self.ctx.enqueue(tx).await
    }
}
