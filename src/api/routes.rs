//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::domain::Transaction;
use crate::error::AppError;
use crate::handlers::{CreditCommand, DebitCommand, LedgerService, TransferCommand};

/// Header carrying the client's idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreditRequest {
    pub account_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebitRequest {
    pub account_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub account_id: Uuid,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance: i64,
    pub last_updated_at: DateTime<Utc>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<LedgerService> {
    Router::new()
        .route("/transactions/credit", post(credit))
        .route("/transactions/debit", post(debit))
        .route("/transactions/transfer", post(transfer))
        .route("/transactions/:transaction_id", get(get_transaction))
        .route("/accounts/:account_id/transactions", get(get_history))
        .route("/accounts/:account_id/balance", get(get_balance))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Prometheus text exposition
pub async fn metrics(State(service): State<LedgerService>) -> Result<impl IntoResponse, AppError> {
    let body = service.metrics().render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value.to_str().map(str::to_string).map_err(|_| {
                AppError::InvalidRequest(format!("{} must be visible ASCII", IDEMPOTENCY_KEY_HEADER))
            })
        })
        .transpose()
}

// =========================================================================
// POST /transactions/{credit,debit,transfer}
// =========================================================================

async fn credit(
    State(service): State<LedgerService>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CreditRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let mut command = CreditCommand::new(request.account_id, request.amount);
    if let Some(key) = idempotency_key(&headers)? {
        command = command.with_idempotency_key(key);
    }

    let tx = service.credit(command).await?;
    Ok((StatusCode::ACCEPTED, Json(tx)))
}

async fn debit(
    State(service): State<LedgerService>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<DebitRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let mut command = DebitCommand::new(request.account_id, request.amount);
    if let Some(key) = idempotency_key(&headers)? {
        command = command.with_idempotency_key(key);
    }

    let tx = service.debit(command).await?;
    Ok((StatusCode::ACCEPTED, Json(tx)))
}

/// Inline-settled transfers answer 200 with the terminal snapshot
async fn transfer(
    State(service): State<LedgerService>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<TransferRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let mut command =
        TransferCommand::new(request.from_account_id, request.to_account_id, request.amount);
    if let Some(key) = idempotency_key(&headers)? {
        command = command.with_idempotency_key(key);
    }

    let tx = service.transfer(command).await?;
    let status = if tx.status.is_terminal() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(tx)))
}

// =========================================================================
// Queries
// =========================================================================

async fn get_transaction(
    State(service): State<LedgerService>,
    ApiPath(transaction_id): ApiPath<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(service.get_transaction(transaction_id).await?))
}

async fn get_history(
    State(service): State<LedgerService>,
    ApiPath(account_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let transactions = service
        .list_transactions(account_id, query.limit, query.offset)
        .await?;

    Ok(Json(HistoryResponse {
        account_id,
        transactions,
    }))
}

async fn get_balance(
    State(service): State<LedgerService>,
    ApiPath(account_id): ApiPath<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = service.balance(account_id).await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance: balance.amount,
        last_updated_at: balance.last_updated_at,
    }))
}
