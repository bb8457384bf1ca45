use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NotificationCreateDBRequest {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationDBResponse {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
