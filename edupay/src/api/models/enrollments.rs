//! API models for enrollments and purchases.

use super::{coupons::CouponUsageResponse, wallets::TransactionResponse};
use crate::db::models::enrollments::{EnrollmentDBResponse, EnrollmentType};
use crate::purchase::{Cancellation, EnrollRequest, Purchase};
use crate::types::{CourseId, EnrollmentId, LessonId, SectionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Purchase request. The purchaser is always the acting user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentCreate {
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    #[serde(default = "default_enrollment_type")]
    pub enrollment_type: EnrollmentType,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub section_id: Option<SectionId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub lesson_id: Option<LessonId>,
    /// Ignored if it does not validate; the item is then sold at full price
    pub coupon_code: Option<String>,
}

fn default_enrollment_type() -> EnrollmentType {
    EnrollmentType::FullCourse
}

impl EnrollmentCreate {
    pub fn into_request(self, student_id: UserId) -> EnrollRequest {
        EnrollRequest {
            student_id,
            course_id: self.course_id,
            enrollment_type: self.enrollment_type,
            section_id: self.section_id,
            lesson_id: self.lesson_id,
            coupon_code: self.coupon_code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: EnrollmentId,
    #[schema(value_type = String, format = "uuid")]
    pub student_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub course_id: CourseId,
    pub enrollment_type: EnrollmentType,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub section_id: Option<SectionId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub lesson_id: Option<LessonId>,
    #[schema(value_type = String)]
    pub original_price: Decimal,
    #[schema(value_type = String)]
    pub discount: Decimal,
    #[schema(value_type = String)]
    pub final_price: Decimal,
    pub coupon_code: Option<String>,
    pub is_active: bool,
    pub enrolled_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<EnrollmentDBResponse> for EnrollmentResponse {
    fn from(db: EnrollmentDBResponse) -> Self {
        Self {
            id: db.id,
            student_id: db.student_id,
            course_id: db.course_id,
            enrollment_type: db.enrollment_type,
            section_id: db.section_id,
            lesson_id: db.lesson_id,
            original_price: db.original_price,
            discount: db.discount,
            final_price: db.final_price,
            coupon_code: db.coupon_code,
            is_active: db.is_active,
            enrolled_at: db.enrolled_at,
            cancelled_at: db.cancelled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseResponse {
    pub enrollment: EnrollmentResponse,
    /// The paying debit; absent for free items
    pub transaction: Option<TransactionResponse>,
    pub coupon_usage: Option<CouponUsageResponse>,
}

impl From<Purchase> for PurchaseResponse {
    fn from(purchase: Purchase) -> Self {
        Self {
            enrollment: purchase.enrollment.into(),
            transaction: purchase.transaction.map(Into::into),
            coupon_usage: purchase.coupon_usage.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CancelEnrollmentRequest {
    /// Credit the final price back to the student's wallet
    #[serde(default)]
    pub refund: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancellationResponse {
    pub enrollment: EnrollmentResponse,
    pub refund: Option<TransactionResponse>,
}

impl From<Cancellation> for CancellationResponse {
    fn from(cancellation: Cancellation) -> Self {
        Self {
            enrollment: cancellation.enrollment.into(),
            refund: cancellation.refund.map(Into::into),
        }
    }
}
