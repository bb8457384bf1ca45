//! API request and response models.
//!
//! These are kept separate from the database models in [`crate::db::models`] so the wire format
//! and the storage format can change independently. Money is serialized as a decimal string.
//!
//! - [`users`]: The acting user
//! - [`wallets`]: Balances, ledger rows and admin wallet movements
//! - [`coupons`]: Coupon administration, validation and redemption
//! - [`referrals`]: Referral codes, stats and payouts
//! - [`enrollments`]: Purchases and cancellations
//! - [`notifications`]: The in-app inbox
//! - [`pagination`]: Shared `skip`/`limit` handling

pub mod coupons;
pub mod enrollments;
pub mod notifications;
pub mod pagination;
pub mod referrals;
pub mod users;
pub mod wallets;
