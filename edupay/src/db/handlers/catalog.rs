//! Read access to course pricing, plus the enrollment counter.

use crate::db::{
    errors::Result,
    models::catalog::{CourseDBResponse, LessonDBResponse, SectionDBResponse},
};
use crate::types::{CourseId, LessonId, SectionId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Catalog<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Catalog<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(course_id = %abbrev_uuid(&id)), err)]
    pub async fn get_course(&mut self, id: CourseId) -> Result<Option<CourseDBResponse>> {
        let course = sqlx::query_as::<_, CourseDBResponse>(
            "SELECT id, title, price, is_active, is_published, students_count FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(course)
    }

    /// Section lookup scoped to its course, so a mismatched pair reads as missing
    pub async fn get_section(&mut self, course_id: CourseId, id: SectionId) -> Result<Option<SectionDBResponse>> {
        let section = sqlx::query_as::<_, SectionDBResponse>(
            "SELECT id, course_id, title, price FROM course_sections WHERE id = $1 AND course_id = $2",
        )
        .bind(id)
        .bind(course_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(section)
    }

    pub async fn get_lesson(&mut self, course_id: CourseId, id: LessonId) -> Result<Option<LessonDBResponse>> {
        let lesson = sqlx::query_as::<_, LessonDBResponse>(
            "SELECT id, course_id, section_id, title, price FROM lessons WHERE id = $1 AND course_id = $2",
        )
        .bind(id)
        .bind(course_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(lesson)
    }

    #[instrument(skip(self), fields(course_id = %abbrev_uuid(&id)), err)]
    pub async fn increment_students(&mut self, id: CourseId) -> Result<()> {
        sqlx::query("UPDATE courses SET students_count = students_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(course_id = %abbrev_uuid(&id)), err)]
    pub async fn decrement_students(&mut self, id: CourseId) -> Result<()> {
        sqlx::query("UPDATE courses SET students_count = GREATEST(students_count - 1, 0) WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_course, create_test_lesson, create_test_section};
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_course_lookup_and_counter(pool: PgPool) {
        let course = create_test_course(&pool, Decimal::from(250)).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut catalog = Catalog::new(&mut conn);

        let loaded = catalog.get_course(course.id).await.unwrap().unwrap();
        assert!(loaded.is_purchasable());
        assert_eq!(loaded.price, Decimal::from(250));
        assert_eq!(loaded.students_count, 0);

        catalog.increment_students(course.id).await.unwrap();
        catalog.increment_students(course.id).await.unwrap();
        catalog.decrement_students(course.id).await.unwrap();
        assert_eq!(catalog.get_course(course.id).await.unwrap().unwrap().students_count, 1);

        catalog.decrement_students(course.id).await.unwrap();
        catalog.decrement_students(course.id).await.unwrap();
        assert_eq!(catalog.get_course(course.id).await.unwrap().unwrap().students_count, 0);

        assert!(catalog.get_course(uuid::Uuid::new_v4()).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_section_and_lesson_scoped_to_course(pool: PgPool) {
        let course = create_test_course(&pool, Decimal::from(100)).await;
        let other = create_test_course(&pool, Decimal::from(100)).await;
        let section = create_test_section(&pool, course.id, Some(Decimal::from(40))).await;
        let lesson = create_test_lesson(&pool, course.id, None).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut catalog = Catalog::new(&mut conn);

        assert_eq!(
            catalog.get_section(course.id, section.id).await.unwrap().unwrap().price,
            Some(Decimal::from(40))
        );
        assert!(catalog.get_section(other.id, section.id).await.unwrap().is_none());

        assert!(catalog.get_lesson(course.id, lesson.id).await.unwrap().unwrap().price.is_none());
        assert!(catalog.get_lesson(other.id, lesson.id).await.unwrap().is_none());
    }
}
