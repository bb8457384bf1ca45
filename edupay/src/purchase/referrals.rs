//! Referral codes and referral bonus payouts.
//!
//! A bonus moves through `pending → earned → paid`. Earning and paying run in separate
//! transactions: the `earned → paid` step commits together with the referrer's deposit, so a
//! referral is never marked paid without the ledger row that pays it. Referrals left at `earned`
//! by a failed deposit are picked up again by [`ReferralService::settle_earned_referrals`].

use crate::config::ReferralsConfig;
use crate::db::{
    errors::DbError,
    handlers::{Enrollments, Referrals, Users, Wallets},
    models::{
        referrals::{BonusStatus, ReferralDBResponse, ReferralStatsDBResponse},
        transactions::{TransactionType, WalletMovementDBRequest},
    },
};
use crate::errors::{Error, Result};
use crate::types::{EnrollmentId, UserId, abbrev_uuid};
use rand::prelude::RngExt;
use rand::rng;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Referral stats for one user, including their own code
#[derive(Debug, Clone)]
pub struct ReferralStats {
    pub referral_code: Option<String>,
    pub counts: ReferralStatsDBResponse,
}

/// What a payout attempt did
#[derive(Debug, Clone)]
pub enum GrantOutcome {
    /// The purchaser was not referred by anyone
    NoReferral,
    /// Payouts are switched off (bonus amount of zero)
    Disabled,
    /// The purchase does not qualify (free enrollment)
    NotQualifying,
    /// The bonus was already paid, or earned by a different purchase
    AlreadyGranted,
    Paid(ReferralDBResponse),
}

/// Totals from a settlement sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub settled: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReferralService {
    db: PgPool,
    config: ReferralsConfig,
    currency: String,
}

impl ReferralService {
    pub fn new(db: PgPool, config: ReferralsConfig, currency: impl Into<String>) -> Self {
        Self {
            db,
            config,
            currency: currency.into(),
        }
    }

    /// Return the user's referral code, minting one on first request.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn generate_referral_code(&self, user_id: UserId) -> Result<String> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut users = Users::new(&mut conn);

        let user = users.get_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;
        if let Some(code) = user.referral_code {
            return Ok(code);
        }

        for attempt in 1..=self.config.max_code_attempts {
            let candidate = mint_code(self.config.code_length);
            if users.referral_code_taken(&candidate).await? {
                continue;
            }

            match users.assign_referral_code(user_id, &candidate).await {
                Ok(Some(user)) => {
                    if let Some(code) = user.referral_code {
                        return Ok(code);
                    }
                }
                Ok(None) => {
                    return Err(Error::NotFound {
                        resource: "User".to_string(),
                        id: user_id.to_string(),
                    });
                }
                // Lost a race for this code with another user
                Err(DbError::UniqueViolation { .. }) => {
                    info!(attempt, "Referral code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Internal {
            operation: format!("mint a unique referral code after {} attempts", self.config.max_code_attempts),
        })
    }

    /// Record that `referred_id` signed up with `code`.
    ///
    /// Applying the same code twice is a no-op returning the existing referral.
    #[instrument(skip(self), fields(referred_id = %abbrev_uuid(&referred_id)), err)]
    pub async fn apply_referral_code(&self, referred_id: UserId, code: &str) -> Result<ReferralDBResponse> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

        let referrer = Users::new(&mut conn).get_by_referral_code(code).await?.ok_or_else(|| Error::BadRequest {
            message: "Referral code not recognised".to_string(),
        })?;
        if referrer.id == referred_id {
            return Err(Error::BadRequest {
                message: "You cannot use your own referral code".to_string(),
            });
        }
        let stored_code = referrer.referral_code.unwrap_or_else(|| code.trim().to_uppercase());

        let mut referrals = Referrals::new(&mut conn);
        if let Some(referral) = referrals.create_pending(referrer.id, referred_id, &stored_code).await? {
            return Ok(referral);
        }

        // Someone already referred this user; same referrer means a repeated call
        let existing = referrals.get_by_referred(referred_id).await?.ok_or_else(|| Error::Internal {
            operation: "load existing referral".to_string(),
        })?;
        if existing.referrer_id == referrer.id {
            Ok(existing)
        } else {
            Err(Error::BadRequest {
                message: "This account has already been referred".to_string(),
            })
        }
    }

    /// Pay the referrer of the purchasing user, if this is their qualifying purchase.
    ///
    /// Safe to call repeatedly for the same enrollment; the bonus is paid at most once.
    #[instrument(skip(self), fields(enrollment_id = %abbrev_uuid(&enrollment_id)), err)]
    pub async fn grant_bonus_on_purchase(&self, enrollment_id: EnrollmentId) -> Result<GrantOutcome> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

        let enrollment = Enrollments::new(&mut conn).get_by_id(enrollment_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Enrollment".to_string(),
            id: enrollment_id.to_string(),
        })?;

        let mut referrals = Referrals::new(&mut conn);
        let Some(mut referral) = referrals.get_by_referred(enrollment.student_id).await? else {
            return Ok(GrantOutcome::NoReferral);
        };
        if !enrollment.is_active {
            return Ok(GrantOutcome::NotQualifying);
        }

        if referral.bonus_status == BonusStatus::Pending {
            if !self.config.payouts_enabled() {
                return Ok(GrantOutcome::Disabled);
            }
            if enrollment.final_price <= Decimal::ZERO {
                return Ok(GrantOutcome::NotQualifying);
            }
            referral = match referrals
                .mark_earned(referral.id, enrollment.id, enrollment.final_price, self.config.bonus_amount)
                .await?
            {
                Some(earned) => earned,
                // A concurrent caller moved it first
                None => referrals.get_by_referred(enrollment.student_id).await?.ok_or(DbError::NotFound)?,
            };
        }

        if referral.bonus_status != BonusStatus::Earned || referral.enrollment_id != Some(enrollment.id) {
            return Ok(GrantOutcome::AlreadyGranted);
        }

        drop(conn);
        Ok(match self.pay(&referral).await? {
            Some(paid) => GrantOutcome::Paid(paid),
            None => GrantOutcome::AlreadyGranted,
        })
    }

    /// Retry payouts for referrals stuck at `earned`.
    #[instrument(skip(self), err)]
    pub async fn settle_earned_referrals(&self, limit: i64) -> Result<SettlementReport> {
        let earned = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            Referrals::new(&mut conn).list_earned(limit).await?
        };

        let mut report = SettlementReport::default();
        for referral in earned {
            match self.pay(&referral).await {
                Ok(Some(_)) => report.settled += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(referral_id = %abbrev_uuid(&referral.id), error = %e, "Referral settlement failed");
                    metrics::counter!("edupay_referral_payouts_total", "outcome" => "failed").increment(1);
                    report.failed += 1;
                }
            }
        }

        if report != SettlementReport::default() {
            info!(settled = report.settled, skipped = report.skipped, failed = report.failed, "Referral settlement sweep finished");
        }
        Ok(report)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_user_referral_stats(&self, user_id: UserId) -> Result<ReferralStats> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

        let user = Users::new(&mut conn).get_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;
        let counts = Referrals::new(&mut conn).stats_for_referrer(user_id).await?;

        Ok(ReferralStats {
            referral_code: user.referral_code,
            counts,
        })
    }

    /// Deposit the bonus and mark the referral paid, atomically.
    ///
    /// Returns `None` (and rolls the deposit back) if the referral was no longer `earned`.
    async fn pay(&self, referral: &ReferralDBResponse) -> Result<Option<ReferralDBResponse>> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let deposit = WalletMovementDBRequest::deposit(
            referral.referrer_id,
            referral.bonus_amount,
            "Referral bonus",
            json!({
                "referral_id": referral.id,
                "referred_id": referral.referred_id,
                "enrollment_id": referral.enrollment_id,
            }),
        )
        .with_type(TransactionType::Referral);
        Wallets::new(&mut tx).with_currency(self.currency.clone()).deposit(&deposit).await?;

        let Some(paid) = Referrals::new(&mut tx).mark_paid(referral.id).await? else {
            return Ok(None);
        };

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        metrics::counter!("edupay_referral_payouts_total", "outcome" => "paid").increment(1);
        info!(
            referral_id = %abbrev_uuid(&paid.id),
            referrer_id = %abbrev_uuid(&paid.referrer_id),
            amount = %paid.bonus_amount,
            "Referral bonus paid"
        );
        Ok(Some(paid))
    }
}

fn mint_code(length: usize) -> String {
    let mut rng = rng();
    (0..length)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_course, create_test_enrollment, create_test_user};
    use futures::future::join_all;

    fn service(pool: &PgPool, bonus: i64) -> ReferralService {
        let config = ReferralsConfig {
            bonus_amount: Decimal::from(bonus),
            ..Default::default()
        };
        ReferralService::new(pool.clone(), config, "EGP")
    }

    async fn balance(pool: &PgPool, user_id: UserId) -> Decimal {
        let mut conn = pool.acquire().await.unwrap();
        Wallets::new(&mut conn).get_balance(user_id).await.unwrap()
    }

    #[test]
    fn test_minted_codes_use_charset() {
        let code = mint_code(12);
        assert_eq!(code.len(), 12);
        assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_generate_code_is_stable(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let referrals = service(&pool, 20);

        let code = referrals.generate_referral_code(user.id).await.unwrap();
        assert_eq!(code.len(), 8);
        assert_eq!(referrals.generate_referral_code(user.id).await.unwrap(), code);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_apply_code_is_idempotent(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let referrals = service(&pool, 20);
        let code = referrals.generate_referral_code(referrer.id).await.unwrap();

        let first = referrals.apply_referral_code(referred.id, &code.to_lowercase()).await.unwrap();
        let second = referrals.apply_referral_code(referred.id, &code).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.bonus_status, BonusStatus::Pending);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referred_id = $1")
            .bind(referred.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_apply_creates_one_referral(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let referrals = service(&pool, 20);
        let code = referrals.generate_referral_code(referrer.id).await.unwrap();

        let results = join_all((0..4).map(|_| {
            let referrals = referrals.clone();
            let code = code.clone();
            let referred_id = referred.id;
            tokio::spawn(async move { referrals.apply_referral_code(referred_id, &code).await })
        }))
        .await;
        assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

        let stats = referrals.get_user_referral_stats(referrer.id).await.unwrap();
        assert_eq!(stats.counts.total_referrals, 1);
        assert_eq!(stats.referral_code, Some(code));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalid_codes_rejected(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let other = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let referrals = service(&pool, 20);
        let code = referrals.generate_referral_code(referrer.id).await.unwrap();
        let other_code = referrals.generate_referral_code(other.id).await.unwrap();

        assert!(matches!(
            referrals.apply_referral_code(referrer.id, &code).await,
            Err(Error::BadRequest { .. })
        ));
        assert!(matches!(
            referrals.apply_referral_code(referred.id, "UNKNOWN1").await,
            Err(Error::BadRequest { .. })
        ));

        referrals.apply_referral_code(referred.id, &code).await.unwrap();
        assert!(matches!(
            referrals.apply_referral_code(referred.id, &other_code).await,
            Err(Error::BadRequest { .. })
        ));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_bonus_paid_exactly_once(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(450)).await;
        let referrals = service(&pool, 20);
        let code = referrals.generate_referral_code(referrer.id).await.unwrap();
        referrals.apply_referral_code(referred.id, &code).await.unwrap();
        let enrollment = create_test_enrollment(&pool, referred.id, course.id, Decimal::from(450)).await;

        let outcome = referrals.grant_bonus_on_purchase(enrollment.id).await.unwrap();
        let GrantOutcome::Paid(paid) = outcome else {
            panic!("expected payout, got {outcome:?}");
        };
        assert_eq!(paid.bonus_status, BonusStatus::Paid);
        assert_eq!(paid.purchase_amount, Some(Decimal::from(450)));
        assert_eq!(balance(&pool, referrer.id).await, Decimal::from(20));

        let again = referrals.grant_bonus_on_purchase(enrollment.id).await.unwrap();
        assert!(matches!(again, GrantOutcome::AlreadyGranted));

        // A later purchase by the same user earns nothing
        let later = create_test_enrollment(&pool, referred.id, course.id, Decimal::from(450)).await;
        assert!(matches!(
            referrals.grant_bonus_on_purchase(later.id).await.unwrap(),
            GrantOutcome::AlreadyGranted
        ));
        assert_eq!(balance(&pool, referrer.id).await, Decimal::from(20));

        let stats = referrals.get_user_referral_stats(referrer.id).await.unwrap();
        assert_eq!(stats.counts.paid_referrals, 1);
        assert_eq!(stats.counts.total_paid, Decimal::from(20));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_cancelled_enrollment_does_not_qualify(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(450)).await;
        let referrals = service(&pool, 20);
        let code = referrals.generate_referral_code(referrer.id).await.unwrap();
        referrals.apply_referral_code(referred.id, &code).await.unwrap();

        let cancelled = create_test_enrollment(&pool, referred.id, course.id, Decimal::from(450)).await;
        {
            let mut conn = pool.acquire().await.unwrap();
            Enrollments::new(&mut conn).deactivate(cancelled.id).await.unwrap();
        }
        assert!(matches!(
            referrals.grant_bonus_on_purchase(cancelled.id).await.unwrap(),
            GrantOutcome::NotQualifying
        ));
        assert_eq!(balance(&pool, referrer.id).await, Decimal::ZERO);

        // The referral is still pending, so the next real purchase pays it
        let kept = create_test_enrollment(&pool, referred.id, course.id, Decimal::from(450)).await;
        assert!(matches!(
            referrals.grant_bonus_on_purchase(kept.id).await.unwrap(),
            GrantOutcome::Paid(_)
        ));
        assert_eq!(balance(&pool, referrer.id).await, Decimal::from(20));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_grants_pay_once(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(450)).await;
        let referrals = service(&pool, 20);
        let code = referrals.generate_referral_code(referrer.id).await.unwrap();
        referrals.apply_referral_code(referred.id, &code).await.unwrap();
        let enrollment = create_test_enrollment(&pool, referred.id, course.id, Decimal::from(450)).await;

        let outcomes = join_all((0..5).map(|_| {
            let referrals = referrals.clone();
            tokio::spawn(async move { referrals.grant_bonus_on_purchase(enrollment.id).await })
        }))
        .await;
        let paid = outcomes
            .into_iter()
            .filter(|o| matches!(o, Ok(Ok(GrantOutcome::Paid(_)))))
            .count();
        assert_eq!(paid, 1);
        assert_eq!(balance(&pool, referrer.id).await, Decimal::from(20));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_no_referral_or_zero_bonus_is_noop(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let loner = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(100)).await;

        let disabled = service(&pool, 0);
        let code = disabled.generate_referral_code(referrer.id).await.unwrap();
        disabled.apply_referral_code(referred.id, &code).await.unwrap();

        let enrollment = create_test_enrollment(&pool, referred.id, course.id, Decimal::from(100)).await;
        assert!(matches!(
            disabled.grant_bonus_on_purchase(enrollment.id).await.unwrap(),
            GrantOutcome::Disabled
        ));

        let solo = create_test_enrollment(&pool, loner.id, course.id, Decimal::from(100)).await;
        assert!(matches!(
            disabled.grant_bonus_on_purchase(solo.id).await.unwrap(),
            GrantOutcome::NoReferral
        ));
        assert_eq!(balance(&pool, referrer.id).await, Decimal::ZERO);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_deposit_leaves_referral_earned_until_settled(pool: PgPool) {
        let referrer = create_test_user(&pool).await;
        let referred = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(450)).await;
        let referrals = service(&pool, 20);
        let code = referrals.generate_referral_code(referrer.id).await.unwrap();
        referrals.apply_referral_code(referred.id, &code).await.unwrap();
        let enrollment = create_test_enrollment(&pool, referred.id, course.id, Decimal::from(450)).await;

        // Freeze the referrer's wallet so the deposit fails
        {
            let mut conn = pool.acquire().await.unwrap();
            Wallets::new(&mut conn).get_or_create(referrer.id).await.unwrap();
        }
        sqlx::query("UPDATE wallets SET is_active = FALSE WHERE user_id = $1")
            .bind(referrer.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(referrals.grant_bonus_on_purchase(enrollment.id).await.is_err());
        let mut conn = pool.acquire().await.unwrap();
        let stuck = Referrals::new(&mut conn).get_by_referred(referred.id).await.unwrap().unwrap();
        assert_eq!(stuck.bonus_status, BonusStatus::Earned);
        assert!(stuck.paid_at.is_none());

        let report = referrals.settle_earned_referrals(10).await.unwrap();
        assert_eq!(report.failed, 1);

        sqlx::query("UPDATE wallets SET is_active = TRUE WHERE user_id = $1")
            .bind(referrer.id)
            .execute(&pool)
            .await
            .unwrap();

        let report = referrals.settle_earned_referrals(10).await.unwrap();
        assert_eq!(
            report,
            SettlementReport {
                settled: 1,
                skipped: 0,
                failed: 0
            }
        );
        let paid = Referrals::new(&mut conn).get_by_referred(referred.id).await.unwrap().unwrap();
        assert_eq!(paid.bonus_status, BonusStatus::Paid);
        assert_eq!(balance(&pool, referrer.id).await, Decimal::from(20));

        // Nothing left to settle
        assert_eq!(referrals.settle_earned_referrals(10).await.unwrap(), SettlementReport::default());
    }
}
