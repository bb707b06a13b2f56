//! Debit Handler
//!
//! Accepts a debit after a best-effort funds check and queues it for
//! settlement.

use crate::domain::{Amount, DomainError, Transaction};
use crate::error::AppResult;
use crate::idempotency::IdempotencyKey;

use super::context::{Accepted, HandlerContext};
use super::DebitCommand;

/// Handler for debits
#[derive(Clone)]
pub struct DebitHandler {
    ctx: HandlerContext,
}

impl DebitHandler {
    pub(crate) fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Execute the debit command; returns the pending snapshot
    pub async fn execute(&self, command: DebitCommand) -> AppResult<Transaction> {
        let amount = Amount::new(command.amount).map_err(DomainError::from)?;
        let key = IdempotencyKey::parse(command.idempotency_key.as_deref())?;

        if let Some(existing) = self.ctx.replay(key.as_ref()).await? {
            return Ok(existing);
        }

        self.ctx.precheck_funds(command.account_id, amount).await?;

        let pending = Transaction::pending_debit(
            command.account_id,
            amount,
            key.map(IdempotencyKey::into_inner),
        );

        match self.ctx.journal(&pending).await? {
            Accepted::Replay(tx) => Ok(tx),
            Accepted::New(tx) => {
                tracing::info!(
                    transaction_id = %tx.id,
                    account_id = %command.account_id,
                    amount = %amount,
                    "Debit accepted"
                );
                self.ctx.enqueue(tx).await
            }
        }
    }
}
