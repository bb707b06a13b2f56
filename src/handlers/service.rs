//! Ledger Service
//!
//! Wires the store, journal, ledger, saga and settlement pool together and
//! exposes the public operations.

use std::sync::Arc;

use uuid::Uuid;

use crate::audit::AuditSink;
use crate::domain::{AccountBalance, Transaction};
use crate::error::AppResult;
use crate::journal::TransactionJournal;
use crate::ledger::BalanceLedger;
use crate::metrics::LedgerMetrics;
use crate::saga::TransferSaga;
use crate::settlement::{SettlementConfig, SettlementDeps, SettlementPool};
use crate::store::LedgerStore;

use super::context::HandlerContext;
use super::{
    CreditCommand, CreditHandler, DebitCommand, DebitHandler, TransferCommand, TransferHandler,
};

/// Public entry point of the engine
#[derive(Clone)]
pub struct LedgerService {
    credit: CreditHandler,
    debit: DebitHandler,
    transfer: TransferHandler,
    deps: Arc<SettlementDeps>,
    settlement: Arc<SettlementPool>,
}

impl LedgerService {
    /// Build the service and start its settlement workers.
    /// Must be called inside a tokio runtime.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditSink>,
        config: SettlementConfig,
    ) -> AppResult<Self> {
        let metrics = LedgerMetrics::new()?;
        let ledger = BalanceLedger::new(store.clone());
        let journal = TransactionJournal::new(store.clone(), audit);
        let saga = TransferSaga::new(store, ledger.clone(), journal.clone());

        let deps = Arc::new(SettlementDeps {
            ledger,
            journal,
            saga,
            metrics: metrics.clone(),
        });
        let settlement = Arc::new(SettlementPool::start(config, metrics));

        let ctx = HandlerContext {
            deps: deps.clone(),
            settlement: settlement.clone(),
        };

        Ok(Self {
            credit: CreditHandler::new(ctx.clone()),
            debit: DebitHandler::new(ctx.clone()),
            transfer: TransferHandler::new(ctx),
            deps,
            settlement,
        })
    }

    pub async fn credit(&self, command: CreditCommand) -> AppResult<Transaction> {
        self.credit.execute(command).await
    }

    pub async fn debit(&self, command: DebitCommand) -> AppResult<Transaction> {
        self.debit.execute(command).await
    }

    pub async fn transfer(&self, command: TransferCommand) -> AppResult<Transaction> {
        self.transfer.execute(command).await
    }

    pub async fn get_transaction(&self, id: Uuid) -> AppResult<Transaction> {
        Ok(self.deps.journal.get(id).await?)
    }

    /// Transactions touching `account_id`, newest first. `limit` defaults to
    /// 50 and is clamped to 1..=200; `offset` defaults to 0.
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<Transaction>> {
        Ok(self
            .deps
            .journal
            .list_by_account(account_id, limit, offset)
            .await?)
    }

    /// Current balance; unknown accounts report zero
    pub async fn balance(&self, account_id: Uuid) -> AppResult<AccountBalance> {
        Ok(self.deps.ledger.balance(account_id).await?)
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.deps.metrics
    }

    /// Whether transfers settle inline
    pub fn settles_transfers_inline(&self) -> bool {
        self.deps.saga.is_atomic()
    }

    /// Stop accepting settlement work and drain the queue
    pub async fn shutdown(&self) {
        self.settlement.stop().await;
    }
}
