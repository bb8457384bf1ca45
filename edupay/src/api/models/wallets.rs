//! API models for wallets and their ledger.

use crate::db::models::{
    transactions::{TransactionDBResponse, TransactionStatus, TransactionType},
    wallets::{LedgerCheck, WalletDBResponse},
};
use crate::types::{TransactionId, UserId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: WalletId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub currency: String,
    #[schema(value_type = String)]
    pub total_deposited: Decimal,
    #[schema(value_type = String)]
    pub total_spent: Decimal,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletDBResponse> for WalletResponse {
    fn from(db: WalletDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            balance: db.balance,
            currency: db.currency,
            total_deposited: db.total_deposited,
            total_spent: db.total_spent,
            is_active: db.is_active,
            updated_at: db.updated_at,
        }
    }
}

/// One ledger row. `amount` is signed: credits are positive, debits negative.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TransactionId,
    pub transaction_number: String,
    pub transaction_type: TransactionType,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub balance_before: Decimal,
    #[schema(value_type = String)]
    pub balance_after: Decimal,
    pub title: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionDBResponse> for TransactionResponse {
    fn from(db: TransactionDBResponse) -> Self {
        Self {
            id: db.id,
            transaction_number: db.transaction_number,
            transaction_type: db.transaction_type,
            amount: db.amount,
            balance_before: db.balance_before,
            balance_after: db.balance_after,
            title: db.title,
            metadata: db.metadata,
            status: db.status,
            created_at: db.created_at,
        }
    }
}

/// Admin request to credit or debit a wallet
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletMovementRequest {
    /// Positive amount to move
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub title: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerCheckResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String)]
    pub balance: Decimal,
    #[schema(value_type = String)]
    pub ledger_sum: Decimal,
    pub transaction_count: i64,
    pub consistent: bool,
}

impl LedgerCheckResponse {
    pub fn new(user_id: UserId, check: LedgerCheck) -> Self {
        Self {
            user_id,
            consistent: check.is_consistent(),
            balance: check.balance,
            ledger_sum: check.ledger_sum,
            transaction_count: check.transaction_count,
        }
    }
}
