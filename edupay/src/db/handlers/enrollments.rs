//! Database repository for enrollments.

use crate::db::{
    errors::Result,
    models::enrollments::{EnrollmentCreateDBRequest, EnrollmentDBResponse},
};
use crate::types::{EnrollmentId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Enrollments<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Enrollments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(student_id = %abbrev_uuid(&request.student_id), course_id = %abbrev_uuid(&request.course_id)), err)]
    pub async fn create(&mut self, request: &EnrollmentCreateDBRequest) -> Result<EnrollmentDBResponse> {
        let enrollment = sqlx::query_as::<_, EnrollmentDBResponse>(
            r#"
            INSERT INTO enrollments
                (id, student_id, course_id, enrollment_type, section_id, lesson_id, original_price, discount, final_price, coupon_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(request.student_id)
        .bind(request.course_id)
        .bind(request.enrollment_type)
        .bind(request.section_id)
        .bind(request.lesson_id)
        .bind(request.original_price)
        .bind(request.discount)
        .bind(request.final_price)
        .bind(&request.coupon_code)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(enrollment)
    }

    #[instrument(skip(self), fields(enrollment_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: EnrollmentId) -> Result<Option<EnrollmentDBResponse>> {
        let enrollment = sqlx::query_as::<_, EnrollmentDBResponse>("SELECT * FROM enrollments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(enrollment)
    }

    pub async fn list_for_student(&mut self, student_id: UserId, skip: i64, limit: i64) -> Result<Vec<EnrollmentDBResponse>> {
        let enrollments = sqlx::query_as::<_, EnrollmentDBResponse>(
            r#"
            SELECT * FROM enrollments
            WHERE student_id = $1
            ORDER BY enrolled_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(student_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(enrollments)
    }

    pub async fn count_for_student(&mut self, student_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM enrollments WHERE student_id = $1")
            .bind(student_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Mark an active enrollment cancelled. Returns `None` if it was already inactive.
    #[instrument(skip(self), fields(enrollment_id = %abbrev_uuid(&id)), err)]
    pub async fn deactivate(&mut self, id: EnrollmentId) -> Result<Option<EnrollmentDBResponse>> {
        let enrollment = sqlx::query_as::<_, EnrollmentDBResponse>(
            r#"
            UPDATE enrollments
            SET is_active = FALSE, cancelled_at = NOW()
            WHERE id = $1 AND is_active
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{errors::DbError, models::enrollments::EnrollmentType};
    use crate::test_utils::{create_test_course, create_test_user};
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn full_course(student_id: UserId, course_id: uuid::Uuid, price: i64) -> EnrollmentCreateDBRequest {
        EnrollmentCreateDBRequest {
            id: uuid::Uuid::new_v4(),
            student_id,
            course_id,
            enrollment_type: EnrollmentType::FullCourse,
            section_id: None,
            lesson_id: None,
            original_price: Decimal::from(price),
            discount: Decimal::ZERO,
            final_price: Decimal::from(price),
            coupon_code: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_list_and_deactivate(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(300)).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Enrollments::new(&mut conn);

        let enrollment = repo.create(&full_course(user.id, course.id, 300)).await.unwrap();
        assert!(enrollment.is_active);
        assert!(enrollment.cancelled_at.is_none());

        let listed = repo.list_for_student(user.id, 0, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(repo.count_for_student(user.id).await.unwrap(), 1);

        let cancelled = repo.deactivate(enrollment.id).await.unwrap().unwrap();
        assert!(!cancelled.is_active);
        assert!(cancelled.cancelled_at.is_some());

        assert!(repo.deactivate(enrollment.id).await.unwrap().is_none());
        // Still present after cancellation
        assert!(repo.get_by_id(enrollment.id).await.unwrap().is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_price_breakdown_enforced(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(300)).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Enrollments::new(&mut conn);

        let mut request = full_course(user.id, course.id, 300);
        request.discount = Decimal::from(10);
        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));

        let mut request = full_course(user.id, course.id, 300);
        request.enrollment_type = EnrollmentType::Section;
        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
