//! PostgreSQL store
//!
//! Balance adjustments are single conditional statements, so concurrent
//! debits against one account serialize on the row lock and can never drive
//! the balance negative. Idempotency rides on the `UNIQUE` constraint of
//! `transactions.idempotency_key`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{AccountBalance, Amount, Transaction, TransactionStatus, TransactionType};

use super::{AtomicStep, CreateOutcome, LedgerStore, StatusChange, StoreError, StoreResult};

/// SQLSTATE numeric_value_out_of_range
const NUMERIC_OUT_OF_RANGE: &str = "22003";

type TransactionRow = (
    Uuid,
    String,
    String,
    i64,
    Option<Uuid>,
    Option<Uuid>,
    DateTime<Utc>,
    Option<String>,
);

fn row_to_transaction(row: TransactionRow) -> StoreResult<Transaction> {
    let (id, kind, status, amount, from_account_id, to_account_id, created_at, idempotency_key) =
        row;

    Ok(Transaction {
        id,
        kind: kind
            .parse::<TransactionType>()
            .map_err(|e| StoreError::Corrupt(format!("transaction {}: {}", id, e)))?,
        status: status
            .parse::<TransactionStatus>()
            .map_err(|e| StoreError::Corrupt(format!("transaction {}: {}", id, e)))?,
        amount: Amount::new(amount)
            .map_err(|e| StoreError::Corrupt(format!("transaction {}: {}", id, e)))?,
        from_account_id,
        to_account_id,
        created_at,
        idempotency_key,
    })
}

fn map_overflow(err: sqlx::Error, account_id: Uuid) -> StoreError {
    let out_of_range = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == NUMERIC_OUT_OF_RANGE)
        .unwrap_or(false);

    if out_of_range {
        StoreError::Overflow(account_id)
    } else {
        StoreError::Database(err)
    }
}

/// Conditional adjust on an open connection or transaction
async fn adjust_on(
    conn: &mut PgConnection,
    account_id: Uuid,
    delta: i64,
) -> StoreResult<AccountBalance> {
    if delta >= 0 {
        let (account_id, amount, last_updated_at): (Uuid, i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO balances (account_id, amount, last_updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (account_id) DO UPDATE
            SET amount = balances.amount + EXCLUDED.amount,
                last_updated_at = NOW()
            RETURNING account_id, amount, last_updated_at
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_overflow(e, account_id))?;

        return Ok(AccountBalance {
            account_id,
            amount,
            last_updated_at,
        });
    }

    let updated: Option<(Uuid, i64, DateTime<Utc>)> = sqlx::query_as(
        r#"
        UPDATE balances
        SET amount = amount + $2,
            last_updated_at = NOW()
        WHERE account_id = $1 AND amount + $2 >= 0
        RETURNING account_id, amount, last_updated_at
        "#,
    )
    .bind(account_id)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some((account_id, amount, last_updated_at)) => Ok(AccountBalance {
            account_id,
            amount,
            last_updated_at,
        }),
        None => {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT amount FROM balances WHERE account_id = $1")
                    .bind(account_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            Err(StoreError::InsufficientFunds {
                account_id,
                available: available.unwrap_or(0),
                requested: delta.saturating_neg(),
            })
        }
    }
}

/// Compare-and-set `pending → status` on an open connection or transaction
async fn set_status_on(
    conn: &mut PgConnection,
    id: Uuid,
    status: TransactionStatus,
) -> StoreResult<StatusChange> {
    if !TransactionStatus::Pending.can_transition_to(status) {
        return Err(StoreError::Conflict(format!(
            "transaction {}: {} is not a terminal status",
            id, status
        )));
    }

    let updated: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE transactions
        SET status = $2
        WHERE id = $1 AND status = 'pending'
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    if updated.is_some() {
        return Ok(StatusChange::Applied);
    }

    let recorded: Option<String> = sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match recorded {
        Some(s) => {
            let recorded = s
                .parse::<TransactionStatus>()
                .map_err(|e| StoreError::Corrupt(format!("transaction {}: {}", id, e)))?;
            Ok(StatusChange::AlreadyTerminal(recorded))
        }
        None => Err(StoreError::NotFound(format!("transaction {}", id))),
    }
}

/// PostgreSQL implementation of [`LedgerStore`]
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_by_key(&self, key: &str) -> StoreResult<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, type, status, amount, from_account_id, to_account_id,
                   created_at, idempotency_key
            FROM transactions
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_transaction).transpose()
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn get_or_create_account(&self, account_id: Uuid) -> StoreResult<AccountBalance> {
        sqlx::query(
            r#"
            INSERT INTO balances (account_id, amount, last_updated_at)
            VALUES ($1, 0, NOW())
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        self.get_balance(account_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("balance for account {}", account_id)))
    }

    async fn get_balance(&self, account_id: Uuid) -> StoreResult<Option<AccountBalance>> {
        let row: Option<(Uuid, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT account_id, amount, last_updated_at FROM balances WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(account_id, amount, last_updated_at)| AccountBalance {
            account_id,
            amount,
            last_updated_at,
        }))
    }

    async fn conditional_adjust_balance(
        &self,
        account_id: Uuid,
        delta: i64,
    ) -> StoreResult<AccountBalance> {
        let mut conn = self.pool.acquire().await?;
        adjust_on(&mut conn, account_id, delta).await
    }

    async fn create_transaction(&self, tx: &Transaction) -> StoreResult<CreateOutcome> {
        let inserted: Option<TransactionRow> = sqlx::query_as(
            r#"
            INSERT INTO transactions
                (id, type, status, amount, from_account_id, to_account_id,
                 created_at, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING id, type, status, amount, from_account_id, to_account_id,
                      created_at, idempotency_key
            "#,
        )
        .bind(tx.id)
        .bind(tx.kind.as_str())
        .bind(tx.status.as_str())
        .bind(tx.amount.value())
        .bind(tx.from_account_id)
        .bind(tx.to_account_id)
        .bind(tx.created_at)
        .bind(tx.idempotency_key.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(CreateOutcome::Inserted(row_to_transaction(row)?));
        }

        // Lost the race for the key; hand back the winner's row
        let key = tx.idempotency_key.as_deref().ok_or_else(|| {
            StoreError::Conflict(format!("transaction {} was not inserted", tx.id))
        })?;
        let existing = self.fetch_by_key(key).await?.ok_or_else(|| {
            StoreError::Corrupt(format!("idempotency key '{}' has no transaction", key))
        })?;

        tracing::debug!(
            idempotency_key = %key,
            transaction_id = %existing.id,
            "Idempotency key already claimed"
        );

        Ok(CreateOutcome::Existing(existing))
    }

    async fn find_transaction_id_by_key(&self, key: &str) -> StoreResult<Option<Uuid>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM transactions WHERE idempotency_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(id)
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, type, status, amount, from_account_id, to_account_id,
                   created_at, idempotency_key
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_transaction).transpose()
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, type, status, amount, from_account_id, to_account_id,
                   created_at, idempotency_key
            FROM transactions
            WHERE from_account_id = $1 OR to_account_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> StoreResult<StatusChange> {
        let mut conn = self.pool.acquire().await?;
        set_status_on(&mut conn, id, status).await
    }

    fn supports_atomic(&self) -> bool {
        true
    }

    async fn run_atomic(&self, steps: &[AtomicStep]) -> StoreResult<()> {
        let mut db_tx = self.pool.begin().await?;

        // Any early return drops `db_tx`, which rolls the unit back
        for step in steps {
            match *step {
                AtomicStep::AdjustBalance { account_id, delta } => {
                    adjust_on(&mut db_tx, account_id, delta).await?;
                }
                AtomicStep::SetStatus {
                    transaction_id,
                    status,
                } => {
                    if let StatusChange::AlreadyTerminal(recorded) =
                        set_status_on(&mut db_tx, transaction_id, status).await?
                    {
                        return Err(StoreError::Conflict(format!(
                            "transaction {} is {}, cannot become {}",
                            transaction_id, recorded, status
                        )));
                    }
                }
            }
        }

        db_tx.commit().await?;
        Ok(())
    }
}
