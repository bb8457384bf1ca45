//! API models for the in-app notification inbox.

use crate::db::models::notifications::NotificationDBResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    /// e.g. `new_enrollment`
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationDBResponse> for NotificationResponse {
    fn from(db: NotificationDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            title: db.title,
            message: db.message,
            data: db.data,
            is_read: db.is_read,
            created_at: db.created_at,
        }
    }
}
