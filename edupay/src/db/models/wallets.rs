//! Database models for wallets.

use crate::types::{UserId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct WalletDBResponse {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub currency: String,
    pub total_deposited: Decimal,
    pub total_spent: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of comparing a wallet's stored balance against its ledger
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LedgerCheck {
    pub balance: Decimal,
    pub ledger_sum: Decimal,
    pub transaction_count: i64,
}

impl LedgerCheck {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_sum
    }
}
