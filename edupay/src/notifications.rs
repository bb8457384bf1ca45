//! Admin notifications for new enrollments.
//!
//! Dispatch is fire-and-forget: the notification is written on a spawned task after the purchase
//! has committed, and failures are only logged.

use serde_json::json;
use sqlx::PgPool;

use crate::db::{
    handlers::{Notifications, Users},
    models::{enrollments::EnrollmentDBResponse, notifications::NotificationCreateDBRequest},
};
use crate::errors::{Error, Result};
use crate::types::abbrev_uuid;

pub const NEW_ENROLLMENT_KIND: &str = "new_enrollment";

/// What admins are told about a purchase
#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub enrollment: EnrollmentDBResponse,
    pub student_email: String,
    pub course_title: String,
}

#[derive(Clone)]
pub struct AdminNotifier {
    db: PgPool,
    enabled: bool,
}

impl AdminNotifier {
    pub fn new(db: PgPool, enabled: bool) -> Self {
        Self { db, enabled }
    }

    /// Write one notification row per admin. Returns how many were written.
    pub async fn new_enrollment(&self, info: &NewEnrollment) -> Result<u64> {
        if !self.enabled {
            return Ok(0);
        }

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let admins = Users::new(&mut conn).list_admin_ids().await?;

        let enrollment = &info.enrollment;
        let request = NotificationCreateDBRequest {
            kind: NEW_ENROLLMENT_KIND.to_string(),
            title: "New enrollment".to_string(),
            message: format!("{} enrolled in {} for {}", info.student_email, info.course_title, enrollment.final_price),
            data: json!({
                "enrollment_id": enrollment.id,
                "student_id": enrollment.student_id,
                "course_id": enrollment.course_id,
                "enrollment_type": enrollment.enrollment_type,
                "final_price": enrollment.final_price,
            }),
        };

        Ok(Notifications::new(&mut conn).create_for_users(&admins, &request).await?)
    }

    /// Send [`Self::new_enrollment`] in the background.
    pub fn dispatch_new_enrollment(&self, info: NewEnrollment) -> tokio::task::JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            match notifier.new_enrollment(&info).await {
                Ok(count) => tracing::debug!(
                    enrollment_id = %abbrev_uuid(&info.enrollment.id),
                    recipients = count,
                    "Admin enrollment notification sent"
                ),
                Err(e) => tracing::warn!(
                    enrollment_id = %abbrev_uuid(&info.enrollment.id),
                    error = %e,
                    "Failed to notify admins of new enrollment"
                ),
            }
        })
    }
}
