//! # edupay: wallet ledger and purchase engine
//!
//! `edupay` holds every student's prepaid wallet and turns wallet balance into course access. It
//! owns the money-moving core of the learning platform: wallets with an append-only transaction
//! ledger, discount coupons, the referral bonus programme, and the purchase pipeline that
//! converts a balance into an enrollment.
//!
//! ## Overview
//!
//! A purchase debits the student's wallet, creates the enrollment and records any coupon
//! redemption in a single database transaction, so a purchase either happens completely or
//! leaves no trace. Work that must not undo a purchase (paying the student's referrer, telling
//! admins about the new enrollment) runs after the commit and only logs its failures.
//!
//! Two invariants hold at all times:
//!
//! - a wallet's balance is never negative, and always equals the sum of its ledger amounts
//! - a coupon is never redeemed more often than its limits allow, and a referral bonus is paid
//!   at most once
//!
//! Both are enforced by conditional updates and row locks in the [`db`] repositories, so they
//! survive concurrent requests against the same wallet or coupon.
//!
//! ## Architecture
//!
//! The service is built on [Axum](https://github.com/tokio-rs/axum) with PostgreSQL (via `sqlx`)
//! for persistence.
//!
//! - [`api`]: JSON models and handlers mounted under `/api/v1`
//! - [`auth`]: the acting user, resolved from a trusted proxy header, and permission checks
//! - [`purchase`]: pricing, coupon redemption, referral payouts and the enrollment pipeline
//! - [`db`]: repositories over a connection or an open transaction
//! - [`notifications`]: fire-and-forget admin notifications
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use edupay::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = edupay::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     edupay::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations run automatically on startup. To run them by hand:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! edupay::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod notifications;
mod openapi;
pub mod purchase;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::purchase::{EnrollmentService, ReferralService};
use axum::{
    Json, Router,
    http::{self, HeaderValue},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{CouponId, CourseId, EnrollmentId, UserId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder().db(pool).config(config).build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
}

impl AppState {
    /// The purchase pipeline, wired to this state's pool and settings
    pub fn enrollments(&self) -> EnrollmentService {
        EnrollmentService::new(self.db.clone(), &self.config)
    }

    pub fn referrals(&self) -> ReferralService {
        ReferralService::new(self.db.clone(), self.config.referrals.clone(), self.config.wallet.currency.clone())
    }
}

/// Get the edupay database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH, http::Method::DELETE])
        .allow_headers([http::header::CONTENT_TYPE, http::HeaderName::from_static("x-edupay-user")])
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// Mounts the `/api/v1` routes, the health check, the OpenAPI document and its Scalar UI, and
/// (when enabled) Prometheus metrics, then wraps everything in CORS and request tracing.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{coupons, enrollments, notifications, referrals, wallets};

    let api_routes = Router::new()
        // Wallets
        .route("/users/current/wallet", get(wallets::get_current_wallet))
        .route("/users/current/wallet/transactions", get(wallets::list_current_transactions))
        .route("/users/{user_id}/wallet", get(wallets::get_user_wallet))
        .route("/users/{user_id}/wallet/transactions", get(wallets::list_user_transactions))
        .route("/users/{user_id}/wallet/verify", get(wallets::verify_user_ledger))
        .route("/users/{user_id}/wallet/deposits", post(wallets::deposit_to_wallet))
        .route("/users/{user_id}/wallet/withdrawals", post(wallets::withdraw_from_wallet))
        // Coupons
        .route("/coupons/validate", post(coupons::validate_coupon))
        .route("/coupons/apply", post(coupons::apply_coupon))
        .route("/coupons", get(coupons::list_coupons).post(coupons::create_coupon))
        .route(
            "/coupons/{id}",
            get(coupons::get_coupon).patch(coupons::update_coupon).delete(coupons::delete_coupon),
        )
        // Referrals
        .route("/users/current/referral-code", post(referrals::generate_referral_code))
        .route("/users/current/referral", post(referrals::apply_referral_code))
        .route("/users/current/referrals/stats", get(referrals::get_referral_stats))
        .route("/enrollments/{id}/referral-bonus", post(referrals::grant_referral_bonus))
        .route("/referrals/settle", post(referrals::settle_referrals))
        // Enrollments
        .route("/enrollments", post(enrollments::create_enrollment))
        .route("/users/current/enrollments", get(enrollments::list_current_enrollments))
        .route("/enrollments/{id}/cancel", post(enrollments::cancel_enrollment))
        // Notifications
        .route("/users/current/notifications", get(notifications::list_current_notifications))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()));

    router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect(&config.database.url)
        .await?;

    info!("Running database migrations...");
    migrator().run(&pool).await?;

    Ok(pool)
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Connect to the configured database, run migrations and build the router
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], reusing `pool` when one is given
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting edupay with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => connect(&config).await?,
        };

        let app_state = AppState::builder().db(pool.clone()).config(config.clone()).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("edupay listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::test_utils::create_test_app;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_health_and_docs_are_public(pool: PgPool) {
        let server = create_test_app(pool).await;

        let response = server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");

        let response = server.get("/api-docs/openapi.json").await;
        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert_eq!(doc["info"]["title"], "edupay API");
        assert!(doc["paths"]["/enrollments"].is_object());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_metrics_route_only_when_enabled(pool: PgPool) {
        let server = create_test_app(pool).await;
        server.get("/internal/metrics").await.assert_status_not_found();
    }
}
