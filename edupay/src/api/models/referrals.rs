//! API models for referral codes and bonuses.

use crate::db::models::referrals::{BonusStatus, ReferralDBResponse};
use crate::purchase::referrals::{GrantOutcome, ReferralStats, SettlementReport};
use crate::types::{EnrollmentId, ReferralId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferralCodeResponse {
    pub referral_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplyReferralRequest {
    pub referral_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferralResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReferralId,
    #[schema(value_type = String, format = "uuid")]
    pub referrer_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub referred_id: UserId,
    pub referral_code: String,
    #[schema(value_type = String)]
    pub bonus_amount: Decimal,
    pub bonus_status: BonusStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub enrollment_id: Option<EnrollmentId>,
    #[schema(value_type = Option<String>)]
    pub purchase_amount: Option<Decimal>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ReferralDBResponse> for ReferralResponse {
    fn from(db: ReferralDBResponse) -> Self {
        Self {
            id: db.id,
            referrer_id: db.referrer_id,
            referred_id: db.referred_id,
            referral_code: db.referral_code,
            bonus_amount: db.bonus_amount,
            bonus_status: db.bonus_status,
            enrollment_id: db.enrollment_id,
            purchase_amount: db.purchase_amount,
            paid_at: db.paid_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferralStatsResponse {
    pub referral_code: Option<String>,
    pub total_referrals: i64,
    pub pending_referrals: i64,
    pub earned_referrals: i64,
    pub paid_referrals: i64,
    #[schema(value_type = String)]
    pub total_paid: Decimal,
    /// Bonus not yet paid out (pending and earned)
    #[schema(value_type = String)]
    pub total_outstanding: Decimal,
}

impl From<ReferralStats> for ReferralStatsResponse {
    fn from(stats: ReferralStats) -> Self {
        Self {
            referral_code: stats.referral_code,
            total_referrals: stats.counts.total_referrals,
            pending_referrals: stats.counts.pending_referrals,
            earned_referrals: stats.counts.earned_referrals,
            paid_referrals: stats.counts.paid_referrals,
            total_paid: stats.counts.total_paid,
            total_outstanding: stats.counts.total_outstanding,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GrantOutcomeKind {
    NoReferral,
    Disabled,
    NotQualifying,
    AlreadyGranted,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GrantBonusResponse {
    pub outcome: GrantOutcomeKind,
    pub referral: Option<ReferralResponse>,
}

impl From<GrantOutcome> for GrantBonusResponse {
    fn from(outcome: GrantOutcome) -> Self {
        let (outcome, referral) = match outcome {
            GrantOutcome::NoReferral => (GrantOutcomeKind::NoReferral, None),
            GrantOutcome::Disabled => (GrantOutcomeKind::Disabled, None),
            GrantOutcome::NotQualifying => (GrantOutcomeKind::NotQualifying, None),
            GrantOutcome::AlreadyGranted => (GrantOutcomeKind::AlreadyGranted, None),
            GrantOutcome::Paid(referral) => (GrantOutcomeKind::Paid, Some(referral.into())),
        };
        Self { outcome, referral }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettleReferralsRequest {
    /// Maximum number of earned referrals to process (default 100)
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct SettlementResponse {
    pub settled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl From<SettlementReport> for SettlementResponse {
    fn from(report: SettlementReport) -> Self {
        Self {
            settled: report.settled,
            skipped: report.skipped,
            failed: report.failed,
        }
    }
}
