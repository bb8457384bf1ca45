//! Database repository for referrals.
//!
//! Status changes are conditional updates on the current status, so each forward transition
//! happens at most once no matter how many callers race on it.

use crate::db::{
    errors::Result,
    models::referrals::{ReferralDBResponse, ReferralStatsDBResponse},
};
use crate::types::{EnrollmentId, ReferralId, UserId, abbrev_uuid};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::instrument;

pub struct Referrals<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Referrals<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record a pending referral. Returns `None` when the referred user already has one.
    #[instrument(skip(self), fields(referrer_id = %abbrev_uuid(&referrer_id), referred_id = %abbrev_uuid(&referred_id)), err)]
    pub async fn create_pending(&mut self, referrer_id: UserId, referred_id: UserId, code: &str) -> Result<Option<ReferralDBResponse>> {
        let referral = sqlx::query_as::<_, ReferralDBResponse>(
            r#"
            INSERT INTO referrals (referrer_id, referred_id, referral_code)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(referrer_id)
        .bind(referred_id)
        .bind(code)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(referral)
    }

    /// The referral that brought this user in, if any
    pub async fn get_by_referred(&mut self, referred_id: UserId) -> Result<Option<ReferralDBResponse>> {
        let referral = sqlx::query_as::<_, ReferralDBResponse>("SELECT * FROM referrals WHERE referred_id = $1")
            .bind(referred_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(referral)
    }

    /// pending → earned, linking the qualifying purchase
    #[instrument(skip(self), fields(referral_id = %abbrev_uuid(&id), enrollment_id = %abbrev_uuid(&enrollment_id)), err)]
    pub async fn mark_earned(
        &mut self,
        id: ReferralId,
        enrollment_id: EnrollmentId,
        purchase_amount: Decimal,
        bonus_amount: Decimal,
    ) -> Result<Option<ReferralDBResponse>> {
        let referral = sqlx::query_as::<_, ReferralDBResponse>(
            r#"
            UPDATE referrals
            SET bonus_status = 'earned', enrollment_id = $2, purchase_amount = $3, bonus_amount = $4
            WHERE id = $1 AND bonus_status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(enrollment_id)
        .bind(purchase_amount)
        .bind(bonus_amount)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(referral)
    }

    /// earned → paid. Returns `None` if another caller already paid it.
    #[instrument(skip(self), fields(referral_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_paid(&mut self, id: ReferralId) -> Result<Option<ReferralDBResponse>> {
        let referral = sqlx::query_as::<_, ReferralDBResponse>(
            r#"
            UPDATE referrals
            SET bonus_status = 'paid', paid_at = NOW()
            WHERE id = $1 AND bonus_status = 'earned'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(referral)
    }

    /// Referrals whose bonus was earned but never paid out, oldest first
    pub async fn list_earned(&mut self, limit: i64) -> Result<Vec<ReferralDBResponse>> {
        let referrals = sqlx::query_as::<_, ReferralDBResponse>(
            "SELECT * FROM referrals WHERE bonus_status = 'earned' ORDER BY created_at, id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(referrals)
    }

    #[instrument(skip(self), fields(referrer_id = %abbrev_uuid(&referrer_id)), err)]
    pub async fn stats_for_referrer(&mut self, referrer_id: UserId) -> Result<ReferralStatsDBResponse> {
        let stats = sqlx::query_as::<_, ReferralStatsDBResponse>(
            r#"
            SELECT
                COUNT(*) AS total_referrals,
                COUNT(*) FILTER (WHERE bonus_status = 'pending') AS pending_referrals,
                COUNT(*) FILTER (WHERE bonus_status = 'earned') AS earned_referrals,
                COUNT(*) FILTER (WHERE bonus_status = 'paid') AS paid_referrals,
                COALESCE(SUM(bonus_amount) FILTER (WHERE bonus_status = 'paid'), 0) AS total_paid,
                COALESCE(SUM(bonus_amount) FILTER (WHERE bonus_status <> 'paid'), 0) AS total_outstanding
            FROM referrals
            WHERE referrer_id = $1
            "#,
        )
        .bind(referrer_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(stats)
    }
}
