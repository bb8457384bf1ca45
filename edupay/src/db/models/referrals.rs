//! Database models for referrals.

use crate::types::{EnrollmentId, ReferralId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Bonus lifecycle. Only ever moves forward: pending → earned → paid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BonusStatus {
    Pending,
    Earned,
    Paid,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReferralDBResponse {
    pub id: ReferralId,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub referral_code: String,
    pub bonus_amount: Decimal,
    pub bonus_status: BonusStatus,
    pub enrollment_id: Option<EnrollmentId>,
    pub purchase_amount: Option<Decimal>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters for a referrer
#[derive(Debug, Clone, Default, FromRow)]
pub struct ReferralStatsDBResponse {
    pub total_referrals: i64,
    pub pending_referrals: i64,
    pub earned_referrals: i64,
    pub paid_referrals: i64,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
}
