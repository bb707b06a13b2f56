//! Database module
//!
//! Connectivity, schema verification and migration utilities.

use sqlx::{Executor, PgPool};

/// Schema applied by [`apply_migrations`]
const LEDGER_MIGRATION: &str = include_str!("../migrations/001_ledger.sql");

/// Tables the store and audit log write to
const REQUIRED_TABLES: [&str; 3] = ["balances", "transactions", "audit_logs"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the ledger schema. Every statement is idempotent.
pub async fn apply_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // A bare &str runs over the simple-query protocol, which allows several statements
    pool.execute(LEDGER_MIGRATION).await?;
    tracing::info!("Ledger schema applied");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
