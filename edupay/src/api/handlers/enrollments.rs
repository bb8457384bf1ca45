//! HTTP handlers for purchasing and cancelling enrollments.

use crate::{
    AppState,
    api::models::{
        enrollments::{CancelEnrollmentRequest, CancellationResponse, EnrollmentCreate, EnrollmentResponse, PurchaseResponse},
        pagination::{PaginatedResponse, Pagination},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    errors::Result,
    types::{EnrollmentId, abbrev_uuid},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Buy a course, section or lesson with the current user's wallet
#[utoipa::path(
    post,
    path = "/enrollments",
    tag = "enrollments",
    summary = "Purchase an enrollment",
    description = "Debits the wallet and creates the enrollment in one transaction. A coupon that does not validate is ignored and the item is sold at full price.",
    request_body = EnrollmentCreate,
    responses(
        (status = 201, description = "Enrollment purchased", body = PurchaseResponse),
        (status = 400, description = "Section or lesson missing, or not part of the course"),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Wallet balance does not cover the price"),
        (status = 404, description = "Course, section or lesson not found"),
        (status = 409, description = "Course is not available for purchase"),
        (status = 422, description = "Coupon became invalid while the purchase was in flight"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id), course_id = %abbrev_uuid(&data.course_id)))]
pub async fn create_enrollment(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Enrollments, operation::CreateOwn>,
    Json(data): Json<EnrollmentCreate>,
) -> Result<(StatusCode, Json<PurchaseResponse>)> {
    let request = data.into_request(current_user.id);
    let purchase = state.enrollments().enroll(&request).await?;

    Ok((StatusCode::CREATED, Json(purchase.into())))
}

/// List the current user's enrollments, newest first
#[utoipa::path(
    get,
    path = "/users/current/enrollments",
    tag = "enrollments",
    summary = "List my enrollments",
    params(Pagination),
    responses(
        (status = 200, description = "Page of enrollments", body = PaginatedResponse<EnrollmentResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn list_current_enrollments(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: RequiresPermission<resource::Enrollments, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<EnrollmentResponse>>> {
    let (skip, limit) = pagination.params();
    let (enrollments, total_count) = state.enrollments().list_for_student(current_user.id, skip, limit).await?;

    Ok(Json(PaginatedResponse::new(
        enrollments.into_iter().map(EnrollmentResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Cancel an enrollment, optionally refunding it (admin only)
#[utoipa::path(
    post,
    path = "/enrollments/{id}/cancel",
    tag = "enrollments",
    summary = "Cancel an enrollment",
    params(("id" = String, Path, description = "Enrollment ID (UUID)")),
    request_body = CancelEnrollmentRequest,
    responses(
        (status = 200, description = "Enrollment cancelled", body = CancellationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "Enrollment not found"),
        (status = 409, description = "Enrollment already cancelled"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(enrollment_id = %abbrev_uuid(&id), refund = data.refund))]
pub async fn cancel_enrollment(
    State(state): State<AppState>,
    Path(id): Path<EnrollmentId>,
    _: RequiresPermission<resource::Enrollments, operation::DeleteAll>,
    Json(data): Json<CancelEnrollmentRequest>,
) -> Result<Json<CancellationResponse>> {
    let cancellation = state.enrollments().cancel_enrollment(id, data.refund).await?;
    Ok(Json(cancellation.into()))
}
