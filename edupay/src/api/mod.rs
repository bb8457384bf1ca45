//! API layer for HTTP request handling and data models.
//!
//! This module contains the REST API implementation, organized into:
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything is mounted under `/api/v1`:
//!
//! - **Wallets** (`/users/current/wallet*`, `/users/{user_id}/wallet*`): Balances, ledger, admin movements
//! - **Coupons** (`/coupons*`): Validation, redemption and admin management
//! - **Referrals** (`/users/current/referral*`, `/referrals/settle`): Codes, stats and payouts
//! - **Enrollments** (`/enrollments*`, `/users/current/enrollments`): Purchases and cancellations
//! - **Notifications** (`/users/current/notifications`): The acting user's inbox
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`. The document is served
//! at `/api-docs/openapi.json` and rendered at `/api/docs`.

pub mod handlers;
pub mod models;
