//! Read-only views of the catalog. Only the pricing and availability fields are mapped.

use crate::types::{CourseId, LessonId, SectionId};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct CourseDBResponse {
    pub id: CourseId,
    pub title: String,
    pub price: Decimal,
    pub is_active: bool,
    pub is_published: bool,
    pub students_count: i32,
}

impl CourseDBResponse {
    /// A course can be bought only while it is both active and published
    pub fn is_purchasable(&self) -> bool {
        self.is_active && self.is_published
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SectionDBResponse {
    pub id: SectionId,
    pub course_id: CourseId,
    pub title: String,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, FromRow)]
pub struct LessonDBResponse {
    pub id: LessonId,
    pub course_id: CourseId,
    pub section_id: Option<SectionId>,
    pub title: String,
    pub price: Option<Decimal>,
}
