//! HTTP request handlers for all API endpoints.
//!
//! Handlers are grouped by resource. Each one extracts the acting user through
//! [`crate::auth::permissions::RequiresPermission`], validates the request body, delegates to a
//! repository or to the purchase services in [`crate::purchase`], and serializes the result.
//!
//! # Handler Modules
//!
//! - [`wallets`]: Balances, ledger history, admin deposits and withdrawals, ledger verification
//! - [`coupons`]: Coupon validation and redemption, admin coupon management
//! - [`referrals`]: Referral codes, referral stats and bonus payouts
//! - [`enrollments`]: Purchases, enrollment listing and cancellation
//! - [`notifications`]: The current user's inbox
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to a status code and a JSON body.

pub mod coupons;
pub mod enrollments;
pub mod notifications;
pub mod referrals;
pub mod wallets;
