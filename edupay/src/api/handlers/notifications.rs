//! HTTP handler for the current user's notification inbox.

use crate::{
    AppState,
    api::models::{
        notifications::NotificationResponse,
        pagination::{PaginatedResponse, Pagination},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::Notifications,
    errors::{Error, Result},
    types::abbrev_uuid,
};
use axum::{
    extract::{Query, State},
    response::Json,
};

/// List the current user's notifications
#[utoipa::path(
    get,
    path = "/users/current/notifications",
    tag = "notifications",
    summary = "List current user's notifications",
    description = "In-app notifications for the authenticated user, newest first. Admins receive one per new enrollment.",
    params(Pagination),
    responses(
        (status = 200, description = "Page of notifications", body = PaginatedResponse<NotificationResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn list_current_notifications(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: RequiresPermission<resource::Notifications, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<NotificationResponse>>> {
    let (skip, limit) = pagination.params();
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut pool_conn);

    let notifications = repo.list_for_user(current_user.id, skip, limit).await?;
    let total_count = repo.count_for_user(current_user.id).await?;

    Ok(Json(PaginatedResponse::new(
        notifications.into_iter().map(NotificationResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}
