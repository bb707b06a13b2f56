//! PostgreSQL store tests
//!
//! Require DATABASE_URL; run with `cargo test -- --ignored`.

use std::sync::Arc;

use uuid::Uuid;

use ledger_engine::audit::PgAuditLog;
use ledger_engine::domain::Amount;
use ledger_engine::handlers::{CreditCommand, LedgerService, TransferCommand};
use ledger_engine::settlement::SettlementConfig;
use ledger_engine::store::{AtomicStep, CreateOutcome, LedgerStore, PgStore, StatusChange, StoreError};
use ledger_engine::{Transaction, TransactionStatus};

mod common;

#[tokio::test]
#[ignore]
async fn test_conditional_adjust_refuses_overdraft() {
    let pool = common::setup_test_db().await;
    let store = PgStore::new(pool);
    let account = Uuid::new_v4();

    let credited = store.conditional_adjust_balance(account, 100).await.unwrap();
    assert_eq!(credited.amount, 100);

    let err = store.conditional_adjust_balance(account, -150).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientFunds { available: 100, requested: 150, .. }
    ));

    let debited = store.conditional_adjust_balance(account, -100).await.unwrap();
    assert_eq!(debited.amount, 0);
}

#[tokio::test]
#[ignore]
async fn test_idempotency_key_is_unique() {
    let pool = common::setup_test_db().await;
    let store = PgStore::new(pool);
    let account = Uuid::new_v4();
    let amount = Amount::new(10).unwrap();

    let first = Transaction::pending_credit(account, amount, Some("pg-key".into()));
    let second = Transaction::pending_credit(account, amount, Some("pg-key".into()));

    assert!(store.create_transaction(&first).await.unwrap().is_inserted());
    match store.create_transaction(&second).await.unwrap() {
        CreateOutcome::Existing(tx) => assert_eq!(tx.id, first.id),
        other => panic!("expected existing row, got {:?}", other),
    }
    assert_eq!(
        store.find_transaction_id_by_key("pg-key").await.unwrap(),
        Some(first.id)
    );
}

#[tokio::test]
#[ignore]
async fn test_status_update_and_atomic_unit() {
    let pool = common::setup_test_db().await;
    let store = PgStore::new(pool);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    store.conditional_adjust_balance(a, 50).await.unwrap();

    let tx = Transaction::pending_transfer(a, b, Amount::new(80).unwrap(), None);
    store.create_transaction(&tx).await.unwrap();

    // Uncovered unit leaves nothing behind
    let steps = [
        AtomicStep::AdjustBalance { account_id: a, delta: -80 },
        AtomicStep::AdjustBalance { account_id: b, delta: 80 },
        AtomicStep::SetStatus {
            transaction_id: tx.id,
            status: TransactionStatus::Completed,
        },
    ];
    assert!(store.run_atomic(&steps).await.is_err());
    assert_eq!(store.get_balance(a).await.unwrap().unwrap().amount, 50);
    assert!(store.get_balance(b).await.unwrap().is_none());

    assert_eq!(
        store
            .update_transaction_status(tx.id, TransactionStatus::RolledBack)
            .await
            .unwrap(),
        StatusChange::Applied
    );
    assert_eq!(
        store
            .update_transaction_status(tx.id, TransactionStatus::Completed)
            .await
            .unwrap(),
        StatusChange::AlreadyTerminal(TransactionStatus::RolledBack)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_service_over_postgres() {
    let pool = common::setup_test_db().await;
    let service = LedgerService::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(PgAuditLog::new(pool)),
        SettlementConfig::default(),
    )
    .unwrap();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    common::fund(&service, a, 300).await;
    let tx = service
        .transfer(TransferCommand::new(a, b, 120))
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(common::balance(&service, a).await, 180);
    assert_eq!(common::balance(&service, b).await, 120);

    let replay = service
        .credit(CreditCommand::new(b, 1).with_idempotency_key("pg-credit"))
        .await
        .unwrap();
    let again = service
        .credit(CreditCommand::new(b, 1).with_idempotency_key("pg-credit"))
        .await
        .unwrap();
    assert_eq!(replay.id, again.id);

    service.shutdown().await;
}
