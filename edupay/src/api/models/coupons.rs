//! API models for coupons.

use super::pagination::Pagination;
use crate::db::models::coupons::{CouponCreateDBRequest, CouponDBResponse, CouponType, CouponUpdateDBRequest, CouponUsageDBResponse};
use crate::purchase::coupons::CouponValidation;
use crate::types::{CouponId, EnrollmentId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, rust::double_option, serde_as};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponCreate {
    pub code: String,
    pub coupon_type: CouponType,
    #[schema(value_type = String)]
    pub value: Decimal,
    #[schema(value_type = Option<String>)]
    pub min_purchase: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    /// Defaults to one redemption per user
    #[serde(default = "default_usage_per_user")]
    pub usage_per_user: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

fn default_usage_per_user() -> i32 {
    1
}

impl From<CouponCreate> for CouponCreateDBRequest {
    fn from(api: CouponCreate) -> Self {
        Self {
            code: api.code,
            coupon_type: api.coupon_type,
            value: api.value,
            min_purchase: api.min_purchase,
            max_discount: api.max_discount,
            usage_limit: api.usage_limit,
            usage_per_user: api.usage_per_user,
            valid_from: api.valid_from,
            valid_until: api.valid_until,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CouponUpdate {
    pub is_active: Option<bool>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Total redemptions allowed (None = no change, Some(None) = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub usage_limit: Option<Option<i32>>,
    pub usage_per_user: Option<i32>,
    /// Cap on a percentage discount (None = no change, Some(None) = uncapped)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub max_discount: Option<Option<Decimal>>,
    /// Minimum order amount (None = no change, Some(None) = no minimum)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub min_purchase: Option<Option<Decimal>>,
}

impl From<CouponUpdate> for CouponUpdateDBRequest {
    fn from(api: CouponUpdate) -> Self {
        Self {
            is_active: api.is_active,
            valid_from: api.valid_from,
            valid_until: api.valid_until,
            usage_limit: api.usage_limit,
            usage_per_user: api.usage_per_user,
            max_discount: api.max_discount,
            min_purchase: api.min_purchase,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CouponId,
    pub code: String,
    pub coupon_type: CouponType,
    #[schema(value_type = String)]
    pub value: Decimal,
    #[schema(value_type = Option<String>)]
    pub min_purchase: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_per_user: i32,
    pub used_count: i32,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<CouponDBResponse> for CouponResponse {
    fn from(db: CouponDBResponse) -> Self {
        Self {
            id: db.id,
            code: db.code,
            coupon_type: db.coupon_type,
            value: db.value,
            min_purchase: db.min_purchase,
            max_discount: db.max_discount,
            usage_limit: db.usage_limit,
            usage_per_user: db.usage_per_user,
            used_count: db.used_count,
            is_active: db.is_active,
            valid_from: db.valid_from,
            valid_until: db.valid_until,
            created_at: db.created_at,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListCouponsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only return coupons that have not been deactivated
    #[serde(default)]
    #[serde_as(as = "DisplayFromStr")]
    pub active_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
    #[schema(value_type = String)]
    pub order_amount: Decimal,
}

/// Result of a coupon check. Rejections are reported here rather than as an error status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponValidationResponse {
    pub valid: bool,
    /// Why the coupon was rejected, when it was
    pub reason: Option<String>,
    pub code: Option<String>,
    #[schema(value_type = String)]
    pub original_price: Decimal,
    #[schema(value_type = String)]
    pub discount: Decimal,
    #[schema(value_type = String)]
    pub final_price: Decimal,
}

impl CouponValidationResponse {
    pub fn new(order_amount: Decimal, validation: CouponValidation) -> Self {
        match validation {
            CouponValidation::Valid { coupon, quote } => Self {
                valid: true,
                reason: None,
                code: Some(coupon.code),
                original_price: quote.original_price,
                discount: quote.discount,
                final_price: quote.final_price,
            },
            CouponValidation::Invalid { reason } => Self {
                valid: false,
                reason: Some(reason.to_string()),
                code: None,
                original_price: order_amount,
                discount: Decimal::ZERO,
                final_price: order_amount,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplyCouponRequest {
    pub code: String,
    #[schema(value_type = String, format = "uuid")]
    pub enrollment_id: EnrollmentId,
    /// Must equal the enrollment's original price
    #[schema(value_type = String)]
    pub order_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponUsageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub coupon_id: CouponId,
    #[schema(value_type = String, format = "uuid")]
    pub enrollment_id: EnrollmentId,
    #[schema(value_type = String)]
    pub order_amount: Decimal,
    #[schema(value_type = String)]
    pub discount_amount: Decimal,
    #[schema(value_type = String)]
    pub final_amount: Decimal,
    pub used_at: DateTime<Utc>,
}

impl From<CouponUsageDBResponse> for CouponUsageResponse {
    fn from(db: CouponUsageDBResponse) -> Self {
        Self {
            coupon_id: db.coupon_id,
            enrollment_id: db.enrollment_id,
            order_amount: db.order_amount,
            discount_amount: db.discount_amount,
            final_amount: db.final_amount,
            used_at: db.used_at,
        }
    }
}
