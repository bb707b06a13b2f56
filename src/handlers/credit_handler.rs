//! Credit Handler
//!
//! Accepts a credit and queues it for settlement.

use crate::domain::{Amount, DomainError, Transaction};
use crate::error::AppResult;
use crate::idempotency::IdempotencyKey;

use super::context::{Accepted, HandlerContext};
use super::CreditCommand;

/// Handler for credits
#[derive(Clone)]
pub struct CreditHandler {
    ctx: HandlerContext,
}

impl CreditHandler {
    pub(crate) fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    /// Execute the credit command; returns the pending snapshot
    pub async fn execute(&self, command: CreditCommand) -> AppResult<Transaction> {
        let amount = Amount::new(command.amount).map_err(DomainError::from)?;
        let key = IdempotencyKey::parse(command.idempotency_key.as_deref())?;

        if let Some(existing) = self.ctx.replay(key.as_ref()).await? {
            return Ok(existing);
        }

        let pending = Transaction::pending_credit(
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
                    "Credit accepted"
                );
                self.ctx.enqueue(tx).await
            }
        }
    }
}
