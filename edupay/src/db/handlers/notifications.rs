//! Database repository for in-app notifications.

use crate::db::{
    errors::Result,
    models::notifications::{NotificationCreateDBRequest, NotificationDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Notifications<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Notifications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert the same notification for each recipient. Returns the number of rows written.
    #[instrument(skip(self, recipients, request), fields(kind = %request.kind, recipients = recipients.len()), err)]
    pub async fn create_for_users(&mut self, recipients: &[UserId], request: &NotificationCreateDBRequest) -> Result<u64> {
        if recipients.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, data)
            SELECT recipient, $2, $3, $4, $5 FROM UNNEST($1::uuid[]) AS recipient
            "#,
        )
        .bind(recipients)
        .bind(&request.kind)
        .bind(&request.title)
        .bind(&request.message)
        .bind(&request.data)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// A user's inbox, newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<NotificationDBResponse>> {
        let notifications = sqlx::query_as::<_, NotificationDBResponse>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(notifications)
    }

    pub async fn count_for_user(&mut self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}
