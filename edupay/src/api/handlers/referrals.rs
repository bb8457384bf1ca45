//! HTTP handlers for referral codes and referral bonuses.

use crate::{
    AppState,
    api::models::referrals::{
        ApplyReferralRequest, GrantBonusResponse, ReferralCodeResponse, ReferralResponse, ReferralStatsResponse, SettleReferralsRequest,
        SettlementResponse,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    errors::{Error, Result},
    types::{EnrollmentId, abbrev_uuid},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

const DEFAULT_SETTLEMENT_LIMIT: i64 = 100;

/// Get (or mint) the current user's referral code
#[utoipa::path(
    post,
    path = "/users/current/referral-code",
    tag = "referrals",
    summary = "Get referral code",
    description = "Returns the current user's referral code, generating one the first time it is requested.",
    responses(
        (status = 200, description = "The user's referral code", body = ReferralCodeResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn generate_referral_code(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Referrals, operation::CreateOwn>,
) -> Result<Json<ReferralCodeResponse>> {
    let referral_code = state.referrals().generate_referral_code(current_user.id).await?;
    Ok(Json(ReferralCodeResponse { referral_code }))
}

/// Record that the current user was referred by the owner of a code
#[utoipa::path(
    post,
    path = "/users/current/referral",
    tag = "referrals",
    summary = "Apply a referral code",
    request_body = ApplyReferralRequest,
    responses(
        (status = 201, description = "Referral recorded (or already recorded for this code)", body = ReferralResponse),
        (status = 400, description = "Unknown code, own code, or already referred by someone else"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn apply_referral_code(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Referrals, operation::CreateOwn>,
    Json(data): Json<ApplyReferralRequest>,
) -> Result<(StatusCode, Json<ReferralResponse>)> {
    if data.referral_code.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Referral code cannot be empty".to_string(),
        });
    }

    let referral = state.referrals().apply_referral_code(current_user.id, &data.referral_code).await?;
    Ok((StatusCode::CREATED, Json(referral.into())))
}

/// Summary of the referrals the current user has made
#[utoipa::path(
    get,
    path = "/users/current/referrals/stats",
    tag = "referrals",
    summary = "Get referral stats",
    responses(
        (status = 200, description = "Referral counts and bonus totals", body = ReferralStatsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn get_referral_stats(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Referrals, operation::ReadOwn>,
) -> Result<Json<ReferralStatsResponse>> {
    let stats = state.referrals().get_user_referral_stats(current_user.id).await?;
    Ok(Json(stats.into()))
}

/// Retry the referral payout for an enrollment (admin only)
#[utoipa::path(
    post,
    path = "/enrollments/{id}/referral-bonus",
    tag = "referrals",
    summary = "Grant referral bonus",
    description = "Pays the purchaser's referrer if this enrollment qualifies. Repeated calls never pay twice.",
    params(("id" = String, Path, description = "Enrollment ID (UUID)")),
    responses(
        (status = 200, description = "What the payout attempt did", body = GrantBonusResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "Enrollment not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all, fields(enrollment_id = %abbrev_uuid(&id)))]
pub async fn grant_referral_bonus(
    State(state): State<AppState>,
    Path(id): Path<EnrollmentId>,
    _: RequiresPermission<resource::Referrals, operation::UpdateAll>,
) -> Result<Json<GrantBonusResponse>> {
    let outcome = state.referrals().grant_bonus_on_purchase(id).await?;
    Ok(Json(outcome.into()))
}

/// Pay out referrals that were earned but never paid (admin only)
#[utoipa::path(
    post,
    path = "/referrals/settle",
    tag = "referrals",
    summary = "Settle earned referrals",
    request_body = SettleReferralsRequest,
    responses(
        (status = 200, description = "Settlement totals", body = SettlementResponse),
        (status = 400, description = "Invalid limit"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 500, description = "Internal server error"),
    ),
    security(("X-Edupay-User" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn settle_referrals(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Referrals, operation::UpdateAll>,
    Json(data): Json<SettleReferralsRequest>,
) -> Result<Json<SettlementResponse>> {
    let limit = data.limit.unwrap_or(DEFAULT_SETTLEMENT_LIMIT);
    if limit < 1 {
        return Err(Error::BadRequest {
            message: "limit must be at least 1".to_string(),
        });
    }

    let report = state.referrals().settle_earned_referrals(limit).await?;
    Ok(Json(report.into()))
}
