//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use ledger_engine::audit::MemoryAuditLog;
use ledger_engine::handlers::{CreditCommand, LedgerService};
use ledger_engine::settlement::SettlementConfig;
use ledger_engine::store::MemoryStore;
use ledger_engine::Transaction;

/// Engine over an in-memory store, with handles to the store and audit log
pub struct TestEngine {
    pub service: LedgerService,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditLog>,
}

pub fn engine(store: MemoryStore) -> TestEngine {
    engine_with(store, SettlementConfig::default())
}

pub fn engine_with(store: MemoryStore, config: SettlementConfig) -> TestEngine {
    let store = Arc::new(store);
    let audit = Arc::new(MemoryAuditLog::new());
    let service = LedgerService::new(store.clone(), audit.clone(), config)
        .expect("Failed to build service");

    TestEngine {
        service,
        store,
        audit,
    }
}

/// Poll until the transaction reaches a terminal status
pub async fn wait_terminal(service: &LedgerService, id: Uuid) -> Transaction {
    for _ in 0..400 {
        let tx = service
            .get_transaction(id)
            .await
            .expect("Failed to read transaction");
        if tx.status.is_terminal() {
            return tx;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("transaction {} never reached a terminal status", id);
}

/// Credit `amount` to `account` and wait for settlement
pub async fn fund(service: &LedgerService, account: Uuid, amount: i64) {
    let tx = service
        .credit(CreditCommand::new(account, amount))
        .await
        .expect("Failed to accept funding credit");
    wait_terminal(service, tx.id).await;
}

pub async fn balance(service: &LedgerService, account: Uuid) -> i64 {
    service
        .balance(account)
        .await
        .expect("Failed to read balance")
        .amount
}

/// Connect to DATABASE_URL, apply the schema and clear all ledger tables
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    ledger_engine::db::apply_migrations(&pool)
        .await
        .expect("Failed to apply schema");

    sqlx::query("TRUNCATE TABLE balances, transactions, audit_logs")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}
