//! Database models for ledger transactions.

use crate::types::{TransactionId, UserId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Ledger entry type stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    /// Part of the stored type set. Course purchases are ledgered as `Withdrawal` rows whose
    /// metadata carries the enrollment, so nothing in this crate writes it.
    Purchase,
    Refund,
    Referral,
}

impl TransactionType {
    /// Whether this type moves money into the wallet
    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::Refund | TransactionType::Referral)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Database request for moving money in or out of a wallet.
///
/// `amount` is always positive; the sign written to the ledger follows from the operation.
#[derive(Debug, Clone)]
pub struct WalletMovementDBRequest {
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub title: String,
    pub metadata: serde_json::Value,
}

impl WalletMovementDBRequest {
    pub fn deposit(user_id: UserId, amount: Decimal, title: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            user_id,
            transaction_type: TransactionType::Deposit,
            amount,
            title: title.into(),
            metadata,
        }
    }

    pub fn withdrawal(user_id: UserId, amount: Decimal, title: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            user_id,
            transaction_type: TransactionType::Withdrawal,
            amount,
            title: title.into(),
            metadata,
        }
    }

    pub fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }
}

/// Database response for a ledger row
#[derive(Debug, Clone, FromRow)]
pub struct TransactionDBResponse {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub transaction_number: String,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub title: String,
    pub metadata: serde_json::Value,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}
