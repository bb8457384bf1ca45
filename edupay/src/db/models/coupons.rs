//! Database models for coupons and coupon redemptions.

use crate::types::{CouponId, EnrollmentId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// `value` is a percentage of the order amount
    Percentage,
    /// `value` is a flat amount off
    Fixed,
}

#[derive(Debug, Clone)]
pub struct CouponCreateDBRequest {
    pub code: String,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_per_user: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Partial update; `None` leaves a column unchanged and `Some(None)` clears a nullable one
#[derive(Debug, Clone, Default)]
pub struct CouponUpdateDBRequest {
    pub is_active: Option<bool>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<Option<i32>>,
    pub usage_per_user: Option<i32>,
    pub max_discount: Option<Option<Decimal>>,
    pub min_purchase: Option<Option<Decimal>>,
}

#[derive(Debug, Clone)]
pub struct CouponFilter {
    pub active_only: bool,
    pub skip: i64,
    pub limit: i64,
}

impl CouponFilter {
    pub fn new(active_only: bool, skip: i64, limit: i64) -> Self {
        Self { active_only, skip, limit }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CouponDBResponse {
    pub id: CouponId,
    pub code: String,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_per_user: i32,
    pub used_count: i32,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CouponUsageCreateDBRequest {
    pub coupon_id: CouponId,
    pub user_id: UserId,
    pub enrollment_id: EnrollmentId,
    pub order_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct CouponUsageDBResponse {
    pub id: Uuid,
    pub coupon_id: CouponId,
    pub user_id: UserId,
    pub enrollment_id: EnrollmentId,
    pub order_amount: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub used_at: DateTime<Utc>,
}
