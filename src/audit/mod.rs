//! Audit Log
//!
//! Write-once audit trail of journal activity. The core never reads it back;
//! a failed write is logged and otherwise ignored so that it can never abort
//! settlement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Entity type recorded for journal entries
pub const ENTITY_TRANSACTION: &str = "transaction";

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A pending transaction was journaled
    Created,
    /// A transaction reached a terminal status
    StatusChange,
    /// A compensating credit failed; balances need manual repair
    ReconciliationRequired,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::StatusChange => "status_change",
            AuditAction::ReconciliationRequired => "reconciliation_required",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create a new entry for an arbitrary entity
    pub fn new(entity_type: &str, entity_id: Uuid, action: AuditAction) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id,
            action,
            details: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a new entry about a transaction
    pub fn transaction(transaction_id: Uuid, action: AuditAction) -> Self {
        Self::new(ENTITY_TRANSACTION, transaction_id, action)
    }

    /// Set the free-form detail
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditLogError>;
}

/// Append an entry, logging instead of propagating failure
pub async fn append_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let entity_id = entry.entity_id;
    let action = entry.action;

    if let Err(e) = sink.append(entry).await {
        tracing::warn!(
            entity_id = %entity_id,
            action = %action,
            error = %e,
            "Failed to write audit entry"
        );
    }
}

/// PostgreSQL audit log
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    /// Create a new PgAuditLog
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditLogError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, entity_type, entity_id, action, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.action.as_str())
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            audit_id = %id,
            entity_id = %entry.entity_id,
            action = %entry.action,
            "Audit log entry created"
        );

        Ok(())
    }
}

/// In-memory audit log
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries about one entity, oldest first
    pub fn entries_for(&self, entity_id: Uuid) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.entity_id == entity_id)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditLogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditLogError::Unavailable("writes disabled".to_string()));
        }

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
