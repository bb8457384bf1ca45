//! Database models for enrollments.

use crate::types::{CourseId, EnrollmentId, LessonId, SectionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// What an enrollment grants access to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentType {
    FullCourse,
    Section,
    Lesson,
}

/// The id is chosen by the caller so the paying debit can reference it before the row exists
#[derive(Debug, Clone)]
pub struct EnrollmentCreateDBRequest {
    pub id: EnrollmentId,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub enrollment_type: EnrollmentType,
    pub section_id: Option<SectionId>,
    pub lesson_id: Option<LessonId>,
    pub original_price: Decimal,
    pub discount: Decimal,
    pub final_price: Decimal,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EnrollmentDBResponse {
    pub id: EnrollmentId,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub enrollment_type: EnrollmentType,
    pub section_id: Option<SectionId>,
    pub lesson_id: Option<LessonId>,
    pub original_price: Decimal,
    pub discount: Decimal,
    pub final_price: Decimal,
    pub coupon_code: Option<String>,
    pub is_active: bool,
    pub enrolled_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}
