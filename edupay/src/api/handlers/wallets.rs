//! HTTP handlers for wallets and the transaction ledger.

use crate::{
    AppState,
    api::models::{
        pagination::{PaginatedResponse, Pagination},
        wallets::{LedgerCheckResponse, TransactionResponse, WalletMovementRequest, WalletResponse},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Debit, Users, Wallets},
        models::transactions::WalletMovementDBRequest,
    },
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgConnection;

async fn ensure_user_exists(conn: &mut PgConnection, user_id: UserId) -> Result<()> {
    match Users::new(conn).get_by_id(user_id).await? {
        Some(_) => Ok(()),
        None => Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        }),
    }
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Amount must be greater than zero".to_string(),
        });
    }
    if amount.normalize().scale() > 2 {
        return Err(Error::BadRequest {
            message: "Amount cannot have more than two decimal places".to_string(),
        });
    }
    Ok(())
}

async fn transactions_page(state: &AppState, user_id: UserId, pagination: &Pagination) -> Result<PaginatedResponse<TransactionResponse>> {
    let (skip, limit) = pagination.params();
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Wallets::new(&mut pool_conn);

    let transactions = repo.list_transactions(user_id, skip, limit).await?;
    let total_count = repo.count_transactions(user_id).await?;

    Ok(PaginatedResponse::new(
        transactions.into_iter().map(TransactionResponse::from).collect(),
        total_count,
        skip,
        limit,
    ))
}

/// Get the current user's wallet
#[utoipa::path(
    get,
    path = "/users/current/wallet",
    tag = "wallets",
    summary = "Get current user's wallet",
    description = "Balance and running totals for the authenticated user. The wallet is created on first access.",
    responses(
        (status = 200, description = "The wallet", body = WalletResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn get_current_wallet(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Wallets, operation::ReadOwn>,
) -> Result<Json<WalletResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let wallet = Wallets::new(&mut pool_conn)
        .with_currency(state.config.wallet.currency.clone())
        .get_or_create(current_user.id)
        .await?;

    Ok(Json(wallet.into()))
}

/// List the current user's ledger
#[utoipa::path(
    get,
    path = "/users/current/wallet/transactions",
    tag = "wallets",
    summary = "List current user's transactions",
    description = "Ledger rows for the authenticated user, newest first.",
    params(Pagination),
    responses(
        (status = 200, description = "Page of transactions", body = PaginatedResponse<TransactionResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn list_current_transactions(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: RequiresPermission<resource::Wallets, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<TransactionResponse>>> {
    Ok(Json(transactions_page(&state, current_user.id, &pagination).await?))
}

/// Get any user's wallet (admin only)
#[utoipa::path(
    get,
    path = "/users/{user_id}/wallet",
    tag = "wallets",
    summary = "Get a user's wallet",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "The wallet", body = WalletResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn get_user_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    _: RequiresPermission<resource::Wallets, operation::ReadAll>,
) -> Result<Json<WalletResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    ensure_user_exists(&mut pool_conn, user_id).await?;

    let wallet = Wallets::new(&mut pool_conn)
        .with_currency(state.config.wallet.currency.clone())
        .get_or_create(user_id)
        .await?;

    Ok(Json(wallet.into()))
}

/// List any user's ledger (admin only)
#[utoipa::path(
    get,
    path = "/users/{user_id}/wallet/transactions",
    tag = "wallets",
    summary = "List a user's transactions",
    params(("user_id" = String, Path, description = "User ID (UUID)"), Pagination),
    responses(
        (status = 200, description = "Page of transactions", body = PaginatedResponse<TransactionResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(pagination): Query<Pagination>,
    _: RequiresPermission<resource::Wallets, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<TransactionResponse>>> {
    Ok(Json(transactions_page(&state, user_id, &pagination).await?))
}

/// Compare a wallet's balance with the sum of its ledger (admin only)
#[utoipa::path(
    get,
    path = "/users/{user_id}/wallet/verify",
    tag = "wallets",
    summary = "Reconcile a wallet against its ledger",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "Reconciliation result", body = LedgerCheckResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn verify_user_ledger(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    _: RequiresPermission<resource::Wallets, operation::ReadAll>,
) -> Result<Json<LedgerCheckResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    ensure_user_exists(&mut pool_conn, user_id).await?;

    let check = Wallets::new(&mut pool_conn).verify_ledger(user_id).await?;
    if !check.is_consistent() {
        tracing::error!(
            user_id = %abbrev_uuid(&user_id),
            balance = %check.balance,
            ledger_sum = %check.ledger_sum,
            "Wallet balance does not match its ledger"
        );
    }

    Ok(Json(LedgerCheckResponse::new(user_id, check)))
}

/// Credit a user's wallet (admin only)
#[utoipa::path(
    post,
    path = "/users/{user_id}/wallet/deposits",
    tag = "wallets",
    summary = "Deposit into a wallet",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    request_body = WalletMovementRequest,
    responses(
        (status = 201, description = "Deposit recorded", body = TransactionResponse),
        (status = 400, description = "Invalid amount"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only, or wallet inactive"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id), amount = %data.amount))]
pub async fn deposit_to_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    admin: RequiresPermission<resource::Wallets, operation::UpdateAll>,
    Json(data): Json<WalletMovementRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>)> {
    validate_amount(data.amount)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    ensure_user_exists(&mut tx, user_id).await?;

    let request = WalletMovementDBRequest::deposit(user_id, data.amount, data.title, movement_metadata(admin.id, data.metadata));
    let transaction = Wallets::new(&mut tx)
        .with_currency(state.config.wallet.currency.clone())
        .deposit(&request)
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// Debit a user's wallet (admin only)
#[utoipa::path(
    post,
    path = "/users/{user_id}/wallet/withdrawals",
    tag = "wallets",
    summary = "Withdraw from a wallet",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    request_body = WalletMovementRequest,
    responses(
        (status = 201, description = "Withdrawal recorded", body = TransactionResponse),
        (status = 400, description = "Invalid amount"),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient balance"),
        (status = 403, description = "Forbidden - admin only, or wallet inactive"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id), amount = %data.amount))]
pub async fn withdraw_from_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    admin: RequiresPermission<resource::Wallets, operation::UpdateAll>,
    Json(data): Json<WalletMovementRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>)> {
    validate_amount(data.amount)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    ensure_user_exists(&mut tx, user_id).await?;

    let request = WalletMovementDBRequest::withdrawal(user_id, data.amount, data.title, movement_metadata(admin.id, data.metadata));
    let debit = Wallets::new(&mut tx)
        .with_currency(state.config.wallet.currency.clone())
        .withdraw(&request)
        .await?;

    match debit {
        Debit::Applied(transaction) => {
            tx.commit().await.map_err(|e| Error::Database(e.into()))?;
            Ok((StatusCode::CREATED, Json(transaction.into())))
        }
        Debit::Insufficient { current_balance } => Err(Error::InsufficientBalance {
            required: data.amount,
            current_balance,
        }),
    }
}

fn movement_metadata(recorded_by: UserId, supplied: Option<serde_json::Value>) -> serde_json::Value {
    match supplied {
        Some(serde_json::Value::Object(mut fields)) => {
            fields.insert("recorded_by".to_string(), json!(recorded_by));
            serde_json::Value::Object(fields)
        }
        Some(other) => json!({ "recorded_by": recorded_by, "details": other }),
        None => json!({ "recorded_by": recorded_by }),
    }
}
