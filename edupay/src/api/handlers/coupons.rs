//! HTTP handlers for coupons.

use crate::{
    AppState,
    api::models::{
        coupons::{
            ApplyCouponRequest, CouponCreate, CouponResponse, CouponUpdate, CouponUsageResponse, CouponValidationResponse, ListCouponsQuery,
            ValidateCouponRequest,
        },
        pagination::PaginatedResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Coupons, Repository},
        models::coupons::{CouponFilter, CouponType},
    },
    errors::{Error, Result},
    purchase::coupons,
    types::{CouponId, abbrev_uuid},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;

fn not_found(id: CouponId) -> Error {
    Error::NotFound {
        resource: "Coupon".to_string(),
        id: id.to_string(),
    }
}

fn validate_create(data: &CouponCreate) -> Result<()> {
    let problem = if data.code.trim().is_empty() {
        Some("Coupon code cannot be empty")
    } else if data.value <= Decimal::ZERO {
        Some("Coupon value must be greater than zero")
    } else if data.coupon_type == CouponType::Percentage && data.value > Decimal::ONE_HUNDRED {
        Some("Percentage coupons cannot exceed 100")
    } else if data.valid_from > data.valid_until {
        Some("valid_from must not be after valid_until")
    } else if data.usage_per_user < 1 || data.usage_limit.is_some_and(|limit| limit < 1) {
        Some("Usage limits must be at least 1")
    } else {
        None
    };

    match problem {
        Some(message) => Err(Error::BadRequest {
            message: message.to_string(),
        }),
        None => Ok(()),
    }
}

fn validate_update(data: &CouponUpdate) -> Result<()> {
    let below_one = |limit: &i32| *limit < 1;
    let negative = |amount: &Decimal| *amount < Decimal::ZERO;

    if data.usage_per_user.as_ref().is_some_and(below_one) || data.usage_limit.flatten().as_ref().is_some_and(below_one) {
        return Err(Error::BadRequest {
            message: "Usage limits must be at least 1".to_string(),
        });
    }
    if data.max_discount.flatten().as_ref().is_some_and(negative) || data.min_purchase.flatten().as_ref().is_some_and(negative) {
        return Err(Error::BadRequest {
            message: "Amounts cannot be negative".to_string(),
        });
    }
    Ok(())
}

/// Check a coupon against an order without redeeming it
#[utoipa::path(
    post,
    path = "/coupons/validate",
    tag = "coupons",
    summary = "Validate a coupon",
    description = "Reports whether the coupon can be used by the current user on an order of the given amount, and the discount it would give.",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Validation result; rejections carry a reason", body = CouponValidationResponse),
        (status = 400, description = "Negative order amount"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn validate_coupon(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Coupons, operation::ReadOwn>,
    Json(data): Json<ValidateCouponRequest>,
) -> Result<Json<CouponValidationResponse>> {
    if data.order_amount < Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Order amount cannot be negative".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let validation = coupons::validate_coupon(&mut pool_conn, &data.code, current_user.id, data.order_amount).await?;

    Ok(Json(CouponValidationResponse::new(data.order_amount, validation)))
}

/// Redeem a coupon against one of the current user's enrollments
#[utoipa::path(
    post,
    path = "/coupons/apply",
    tag = "coupons",
    summary = "Apply a coupon",
    request_body = ApplyCouponRequest,
    responses(
        (status = 201, description = "Coupon redeemed", body = CouponUsageResponse),
        (status = 400, description = "Enrollment is not the current user's active enrollment sold with this coupon at this amount"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Enrollment not found"),
        (status = 409, description = "A coupon was already applied to this enrollment"),
        (status = 422, description = "Coupon invalid or expired"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id), enrollment_id = %abbrev_uuid(&data.enrollment_id)))]
pub async fn apply_coupon(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Coupons, operation::CreateOwn>,
    Json(data): Json<ApplyCouponRequest>,
) -> Result<(StatusCode, Json<CouponUsageResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let usage = coupons::apply_coupon(&mut pool_conn, &data.code, current_user.id, data.enrollment_id, data.order_amount).await?;

    Ok((StatusCode::CREATED, Json(usage.into())))
}

/// List coupons (admin only)
#[utoipa::path(
    get,
    path = "/coupons",
    tag = "coupons",
    summary = "List coupons",
    params(ListCouponsQuery),
    responses(
        (status = 200, description = "Page of coupons", body = PaginatedResponse<CouponResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(query): Query<ListCouponsQuery>,
    _: RequiresPermission<resource::Coupons, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<CouponResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Coupons::new(&mut pool_conn);

    let coupons = repo.list(&CouponFilter::new(query.active_only, skip, limit)).await?;
    let total_count = repo.count(query.active_only).await?;

    Ok(Json(PaginatedResponse::new(
        coupons.into_iter().map(CouponResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Create a coupon (admin only)
#[utoipa::path(
    post,
    path = "/coupons",
    tag = "coupons",
    summary = "Create a coupon",
    request_body = CouponCreate,
    responses(
        (status = 201, description = "Coupon created", body = CouponResponse),
        (status = 400, description = "Invalid coupon definition"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 409, description = "Code already in use"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(code = %data.code))]
pub async fn create_coupon(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Coupons, operation::CreateAll>,
    Json(data): Json<CouponCreate>,
) -> Result<(StatusCode, Json<CouponResponse>)> {
    validate_create(&data)?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let coupon = Coupons::new(&mut pool_conn).create(&data.into()).await?;

    Ok((StatusCode::CREATED, Json(coupon.into())))
}

/// Get a coupon (admin only)
#[utoipa::path(
    get,
    path = "/coupons/{id}",
    tag = "coupons",
    summary = "Get a coupon",
    params(("id" = String, Path, description = "Coupon ID (UUID)")),
    responses(
        (status = 200, description = "The coupon", body = CouponResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "Coupon not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(coupon_id = %abbrev_uuid(&id)))]
pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    _: RequiresPermission<resource::Coupons, operation::ReadAll>,
) -> Result<Json<CouponResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let coupon = Coupons::new(&mut pool_conn).get_by_id(id).await?.ok_or_else(|| not_found(id))?;

    Ok(Json(coupon.into()))
}

/// Update a coupon's limits, validity window or active flag (admin only)
#[utoipa::path(
    patch,
    path = "/coupons/{id}",
    tag = "coupons",
    summary = "Update a coupon",
    params(("id" = String, Path, description = "Coupon ID (UUID)")),
    request_body = CouponUpdate,
    responses(
        (status = 200, description = "Updated coupon", body = CouponResponse),
        (status = 400, description = "Update would leave the coupon invalid"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "Coupon not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(coupon_id = %abbrev_uuid(&id)))]
pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    _: RequiresPermission<resource::Coupons, operation::UpdateAll>,
    Json(data): Json<CouponUpdate>,
) -> Result<Json<CouponResponse>> {
    validate_update(&data)?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let coupon = Coupons::new(&mut pool_conn).update(id, &data.into()).await?;

    Ok(Json(coupon.into()))
}

/// Deactivate a coupon (admin only). Redemptions are kept.
#[utoipa::path(
    delete,
    path = "/coupons/{id}",
    tag = "coupons",
    summary = "Deactivate a coupon",
    params(("id" = String, Path, description = "Coupon ID (UUID)")),
    responses(
        (status = 204, description = "Coupon deactivated"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "Coupon not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(coupon_id = %abbrev_uuid(&id)))]
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    _: RequiresPermission<resource::Coupons, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Coupons::new(&mut pool_conn);

    if !repo.delete(id).await? && repo.get_by_id(id).await?.is_none() {
        return Err(not_found(id));
    }

    Ok(StatusCode::NO_CONTENT)
}
