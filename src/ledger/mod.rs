//! Balance Ledger
//!
//! Per-account balances. The only way to change a balance is
//! [`BalanceLedger::conditional_adjust`], which the store evaluates and
//! applies as a single atomic step.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{AccountBalance, Amount};
use crate::store::{LedgerStore, StoreResult};

#[derive(Clone)]
pub struct BalanceLedger {
    store: Arc<dyn LedgerStore>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Fetch the balance row, creating a zero row on first reference
    pub async fn get_or_create(&self, account_id: Uuid) -> StoreResult<AccountBalance> {
        self.store.get_or_create_account(account_id).await
    }

    /// Read-only lookup; unknown accounts report zero without creating a row
    pub async fn balance(&self, account_id: Uuid) -> StoreResult<AccountBalance> {
        Ok(self
            .store
            .get_balance(account_id)
            .await?
            .unwrap_or_else(|| AccountBalance::zero(account_id)))
    }

    /// Apply `delta`. Negative deltas fail with `InsufficientFunds` unless
    /// the balance covers them.
    pub async fn conditional_adjust(
        &self,
        account_id: Uuid,
        delta: i64,
    ) -> StoreResult<AccountBalance> {
        let row = self.store.conditional_adjust_balance(account_id, delta).await?;

        tracing::debug!(
            account_id = %account_id,
            delta = delta,
            balance = row.amount,
            "Balance adjusted"
        );

        Ok(row)
    }

    pub async fn credit(&self, account_id: Uuid, amount: Amount) -> StoreResult<AccountBalance> {
        self.conditional_adjust(account_id, amount.credit_delta()).await
    }

    pub async fn debit(&self, account_id: Uuid, amount: Amount) -> StoreResult<AccountBalance> {
        self.conditional_adjust(account_id, amount.debit_delta()).await
    }
}
