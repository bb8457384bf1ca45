//! Database repository for users.

use crate::db::{
    errors::Result,
    models::users::{UserCreateDBRequest, UserDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (email, display_name, is_admin)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&request.email)
        .bind(&request.display_name)
        .bind(request.is_admin)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Find the owner of a referral code. Codes are stored upper-case.
    #[instrument(skip(self), err)]
    pub async fn get_by_referral_code(&mut self, code: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE referral_code = UPPER($1)")
            .bind(code.trim())
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Assign a referral code if the user has none yet.
    ///
    /// Returns the user as stored afterwards, so a concurrent assignment wins and its code is
    /// returned. A code already held by someone else surfaces as a unique violation.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn assign_referral_code(&mut self, id: UserId, code: &str) -> Result<Option<UserDBResponse>> {
        sqlx::query("UPDATE users SET referral_code = $2 WHERE id = $1 AND referral_code IS NULL")
            .bind(id)
            .bind(code)
            .execute(&mut *self.db)
            .await?;

        self.get_by_id(id).await
    }

    pub async fn referral_code_taken(&mut self, code: &str) -> Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE referral_code = $1)")
            .bind(code)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(taken)
    }

    /// IDs of every admin user
    pub async fn list_admin_ids(&mut self) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, UserId>("SELECT id FROM users WHERE is_admin ORDER BY created_at")
            .fetch_all(&mut *self.db)
            .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use sqlx::PgPool;

    fn request(email: &str, is_admin: bool) -> UserCreateDBRequest {
        UserCreateDBRequest {
            email: email.to_string(),
            display_name: Some("Test".to_string()),
            is_admin,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_lookup_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("Student@Example.com", false)).await.unwrap();
        assert!(!user.is_admin);
        assert!(user.referral_code.is_none());

        let by_id = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "Student@Example.com");

        let by_email = repo.get_by_email("student@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.create(&request("dup@example.com", false)).await.unwrap();

        let err = repo.create(&request("dup@example.com", false)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_referral_code_assigned_once(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let user = repo.create(&request("ref@example.com", false)).await.unwrap();

        let first = repo.assign_referral_code(user.id, "ABCD2345").await.unwrap().unwrap();
        assert_eq!(first.referral_code.as_deref(), Some("ABCD2345"));

        // A second assignment leaves the existing code in place
        let second = repo.assign_referral_code(user.id, "ZZZZ9999").await.unwrap().unwrap();
        assert_eq!(second.referral_code.as_deref(), Some("ABCD2345"));

        assert!(repo.referral_code_taken("ABCD2345").await.unwrap());
        assert!(!repo.referral_code_taken("ZZZZ9999").await.unwrap());

        let owner = repo.get_by_referral_code(" abcd2345 ").await.unwrap().unwrap();
        assert_eq!(owner.id, user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_admin_ids(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let admin = repo.create(&request("admin@example.com", true)).await.unwrap();
        repo.create(&request("student@example.com", false)).await.unwrap();

        assert_eq!(repo.list_admin_ids().await.unwrap(), vec![admin.id]);
    }
}
