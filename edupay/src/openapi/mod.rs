//! OpenAPI documentation for the `/api/v1` surface.
//!
//! The document is served at `/api-docs/openapi.json` and rendered by Scalar at `/api/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::db::models::{
    coupons::CouponType,
    enrollments::EnrollmentType,
    referrals::BonusStatus,
    transactions::{TransactionStatus, TransactionType},
};

/// Identity header set by the trusted upstream proxy.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "X-Edupay-User".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-edupay-user",
                    "Email of the acting user, set by the authenticating proxy in front of this service.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    servers((url = "/api/v1", description = "Wallet and purchase API")),
    paths(
        api::handlers::wallets::get_current_wallet,
        api::handlers::wallets::list_current_transactions,
        api::handlers::wallets::get_user_wallet,
        api::handlers::wallets::list_user_transactions,
        api::handlers::wallets::verify_user_ledger,
        api::handlers::wallets::deposit_to_wallet,
        api::handlers::wallets::withdraw_from_wallet,
        api::handlers::coupons::validate_coupon,
        api::handlers::coupons::apply_coupon,
        api::handlers::coupons::list_coupons,
        api::handlers::coupons::create_coupon,
        api::handlers::coupons::get_coupon,
        api::handlers::coupons::update_coupon,
        api::handlers::coupons::delete_coupon,
        api::handlers::referrals::generate_referral_code,
        api::handlers::referrals::apply_referral_code,
        api::handlers::referrals::get_referral_stats,
        api::handlers::referrals::grant_referral_bonus,
        api::handlers::referrals::settle_referrals,
        api::handlers::enrollments::create_enrollment,
        api::handlers::enrollments::list_current_enrollments,
        api::handlers::enrollments::cancel_enrollment,
        api::handlers::notifications::list_current_notifications,
    ),
    components(
        schemas(
            CouponType,
            EnrollmentType,
            BonusStatus,
            TransactionType,
            TransactionStatus,
            api::models::wallets::WalletResponse,
            api::models::wallets::TransactionResponse,
            api::models::wallets::WalletMovementRequest,
            api::models::wallets::LedgerCheckResponse,
            api::models::coupons::CouponCreate,
            api::models::coupons::CouponUpdate,
            api::models::coupons::CouponResponse,
            api::models::coupons::ValidateCouponRequest,
            api::models::coupons::CouponValidationResponse,
            api::models::coupons::ApplyCouponRequest,
            api::models::coupons::CouponUsageResponse,
            api::models::referrals::ReferralCodeResponse,
            api::models::referrals::ApplyReferralRequest,
            api::models::referrals::ReferralResponse,
            api::models::referrals::ReferralStatsResponse,
            api::models::referrals::GrantOutcomeKind,
            api::models::referrals::GrantBonusResponse,
            api::models::referrals::SettleReferralsRequest,
            api::models::referrals::SettlementResponse,
            api::models::enrollments::EnrollmentCreate,
            api::models::enrollments::EnrollmentResponse,
            api::models::enrollments::PurchaseResponse,
            api::models::enrollments::CancelEnrollmentRequest,
            api::models::enrollments::CancellationResponse,
            api::models::notifications::NotificationResponse,
        )
    ),
    tags(
        (name = "wallets", description = "Wallet balances and the transaction ledger.

Every balance change writes exactly one ledger row, and a wallet's balance always equals the sum of its ledger amounts. Deposits and withdrawals are admin-only; students see their own wallet."),
        (name = "coupons", description = "Coupon validation and redemption.

Percentage coupons take a share of the order (optionally capped by `max_discount`); fixed coupons take a flat amount. A discount never exceeds the order amount."),
        (name = "referrals", description = "Referral codes and referral bonuses.

A bonus moves `pending → earned → paid` and is paid at most once, on the referred user's first paid purchase."),
        (name = "enrollments", description = "Course, section and lesson purchases.

The wallet debit, the enrollment and any coupon redemption commit together or not at all."),
        (name = "notifications", description = "The in-app inbox. Admins are notified of each new enrollment."),
    ),
    info(
        title = "edupay API",
        version = "1.0.0",
        description = "Wallet ledger and purchase engine for the learning platform.

## Authentication

Requests are authenticated by an upstream proxy, which passes the acting user's email in the `X-Edupay-User` header.

## Money

All amounts are decimal strings with at most two fractional digits, e.g. `\"450.00\"`.

## Errors

Errors are JSON objects with a `message` field. A purchase refused for lack of funds returns `402` with `required` and `current_balance`.",
    ),
)]
pub struct ApiDoc;
