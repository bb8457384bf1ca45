//! Wallet store and transaction ledger.
//!
//! Every balance change goes through [`Wallets::deposit`] or [`Wallets::withdraw`], and each of
//! them writes exactly one ledger row in the same (sub)transaction as the balance update, so the
//! stored balance always equals the sum of the wallet's signed ledger amounts.
//!
//! The debit is a single conditional `UPDATE ... WHERE balance >= $amount`. PostgreSQL takes the
//! row lock and re-checks the predicate against the latest committed row version, so concurrent
//! debits on one wallet serialize and the balance can never go negative.

use crate::db::{
    errors::{DbError, Result},
    models::{
        transactions::{TransactionDBResponse, TransactionType, WalletMovementDBRequest},
        wallets::{LedgerCheck, WalletDBResponse},
    },
};
use crate::types::{Operation, UserId, WalletId, abbrev_uuid};
use chrono::Utc;
use rand::prelude::RngExt;
use rand::rng;
use rust_decimal::Decimal;
use sqlx::{Connection, FromRow, PgConnection};
use tracing::{debug, instrument};

/// Currency used when a wallet is created without an explicit one
pub const DEFAULT_CURRENCY: &str = "EGP";

const TRANSACTION_NUMBER_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Outcome of a debit attempt
#[derive(Debug, Clone)]
pub enum Debit {
    /// Balance was decremented and the ledger row written
    Applied(TransactionDBResponse),
    /// Balance did not cover the amount; nothing was written
    Insufficient { current_balance: Decimal },
}

#[derive(FromRow)]
struct BalanceUpdate {
    id: WalletId,
    balance: Decimal,
}

pub struct Wallets<'c> {
    db: &'c mut PgConnection,
    currency: String,
}

impl<'c> Wallets<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self {
            db,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Currency assigned to wallets created lazily through this repository
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Fetch the user's wallet, creating an empty one on first access
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_or_create(&mut self, user_id: UserId) -> Result<WalletDBResponse> {
        Self::ensure_wallet(&mut *self.db, user_id, &self.currency).await?;

        // Separate statement so a row committed by a concurrent creator is visible
        let wallet = sqlx::query_as::<_, WalletDBResponse>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(wallet)
    }

    pub async fn get_balance(&mut self, user_id: UserId) -> Result<Decimal> {
        Ok(self.get_or_create(user_id).await?.balance)
    }

    pub async fn has_enough_balance(&mut self, user_id: UserId, amount: Decimal) -> Result<bool> {
        Ok(self.get_balance(user_id).await? >= amount)
    }

    /// Credit a wallet and append the matching ledger row.
    ///
    /// Refunds reduce `total_spent`; every other credit counts towards `total_deposited`.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), amount = %request.amount, kind = ?request.transaction_type), err)]
    pub async fn deposit(&mut self, request: &WalletMovementDBRequest) -> Result<TransactionDBResponse> {
        if !request.transaction_type.is_credit() {
            return Err(DbError::Other(anyhow::anyhow!(
                "{:?} is not a credit transaction type",
                request.transaction_type
            )));
        }
        Self::ensure_positive(request.amount)?;

        let mut tx = self.db.begin().await?;
        Self::ensure_wallet(&mut tx, request.user_id, &self.currency).await?;

        let is_refund = request.transaction_type == TransactionType::Refund;
        let updated = sqlx::query_as::<_, BalanceUpdate>(
            r#"
            UPDATE wallets
            SET balance = balance + $2,
                total_deposited = total_deposited + CASE WHEN $3 THEN 0 ELSE $2 END,
                total_spent = GREATEST(total_spent - CASE WHEN $3 THEN $2 ELSE 0 END, 0),
                updated_at = NOW()
            WHERE user_id = $1 AND is_active
            RETURNING id, balance
            "#,
        )
        .bind(request.user_id)
        .bind(request.amount)
        .bind(is_refund)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Self::inactive_wallet(request.user_id))?;

        let transaction = Self::insert_ledger_row(&mut tx, &updated, request.amount, request).await?;
        tx.commit().await?;

        Ok(transaction)
    }

    /// Debit a wallet if, and only if, its balance covers the amount.
    ///
    /// The check and the decrement are one statement; on success the ledger row is written in
    /// the same (sub)transaction. An uncovered amount yields [`Debit::Insufficient`] with no
    /// writes.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), amount = %request.amount), err)]
    pub async fn withdraw(&mut self, request: &WalletMovementDBRequest) -> Result<Debit> {
        if request.transaction_type.is_credit() {
            return Err(DbError::Other(anyhow::anyhow!(
                "{:?} is not a debit transaction type",
                request.transaction_type
            )));
        }
        Self::ensure_positive(request.amount)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query_as::<_, BalanceUpdate>(
            r#"
            UPDATE wallets
            SET balance = balance - $2,
                total_spent = total_spent + $2,
                updated_at = NOW()
            WHERE user_id = $1 AND is_active AND balance >= $2
            RETURNING id, balance
            "#,
        )
        .bind(request.user_id)
        .bind(request.amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(updated) = updated else {
            drop(tx);
            let wallet = self.get_or_create(request.user_id).await?;
            if !wallet.is_active {
                return Err(Self::inactive_wallet(request.user_id));
            }
            debug!(current_balance = %wallet.balance, "Debit refused: insufficient balance");
            metrics::counter!("edupay_wallet_debits_total", "outcome" => "insufficient").increment(1);
            return Ok(Debit::Insufficient {
                current_balance: wallet.balance,
            });
        };

        let transaction = Self::insert_ledger_row(&mut tx, &updated, -request.amount, request).await?;
        tx.commit().await?;

        metrics::counter!("edupay_wallet_debits_total", "outcome" => "applied").increment(1);
        Ok(Debit::Applied(transaction))
    }

    /// List a user's ledger rows, newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_transactions(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<TransactionDBResponse>> {
        let transactions = sqlx::query_as::<_, TransactionDBResponse>(
            r#"
            SELECT t.*
            FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id
            WHERE w.user_id = $1
            ORDER BY t.created_at DESC, t.id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(transactions)
    }

    pub async fn count_transactions(&mut self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM transactions t JOIN wallets w ON w.id = t.wallet_id WHERE w.user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }

    /// Compare the stored balance against the sum of the wallet's ledger amounts
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn verify_ledger(&mut self, user_id: UserId) -> Result<LedgerCheck> {
        self.get_or_create(user_id).await?;

        let check = sqlx::query_as::<_, LedgerCheck>(
            r#"
            SELECT w.balance,
                   COALESCE(SUM(t.amount), 0) AS ledger_sum,
                   COUNT(t.id) AS transaction_count
            FROM wallets w
            LEFT JOIN transactions t ON t.wallet_id = w.id
            WHERE w.user_id = $1
            GROUP BY w.id, w.balance
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(check)
    }

    async fn ensure_wallet(conn: &mut PgConnection, user_id: UserId, currency: &str) -> Result<()> {
        sqlx::query("INSERT INTO wallets (user_id, currency) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .bind(currency)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn insert_ledger_row(
        conn: &mut PgConnection,
        updated: &BalanceUpdate,
        signed_amount: Decimal,
        request: &WalletMovementDBRequest,
    ) -> Result<TransactionDBResponse> {
        let transaction = sqlx::query_as::<_, TransactionDBResponse>(
            r#"
            INSERT INTO transactions
                (wallet_id, transaction_number, transaction_type, amount, balance_before, balance_after, title, metadata, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'completed')
            RETURNING *
            "#,
        )
        .bind(updated.id)
        .bind(generate_transaction_number())
        .bind(request.transaction_type)
        .bind(signed_amount)
        .bind(updated.balance - signed_amount)
        .bind(updated.balance)
        .bind(&request.title)
        .bind(&request.metadata)
        .fetch_one(conn)
        .await?;

        Ok(transaction)
    }

    fn ensure_positive(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(DbError::Other(anyhow::anyhow!("wallet movement amount must be positive, got {amount}")));
        }
        Ok(())
    }

    fn inactive_wallet(user_id: UserId) -> DbError {
        DbError::ProtectedEntity {
            operation: Operation::UpdateAll,
            reason: "wallet is inactive".to_string(),
            entity_type: "wallet".to_string(),
            entity_id: Some(user_id.to_string()),
        }
    }
}

/// Ledger reference shown to users, e.g. `TXN20250301142233-K7P2QX`
fn generate_transaction_number() -> String {
    let mut rng = rng();
    let suffix: String = (0..6)
        .map(|_| TRANSACTION_NUMBER_CHARSET[rng.random_range(0..TRANSACTION_NUMBER_CHARSET.len())] as char)
        .collect();
    format!("TXN{}-{}", Utc::now().format("%Y%m%d%H%M%S"), suffix)
}
