//! Database record models matching table schemas.
//!
//! Database models are distinct from API models so that storage and API representations can
//! evolve independently. Enumerations are stored as TEXT columns and map through `sqlx::Type`.
//!
//! - [`users`]: Acting users, admin flag and referral code
//! - [`catalog`]: Read-only course/section/lesson prices
//! - [`wallets`]: Balances and aggregate totals
//! - [`transactions`]: The append-only ledger
//! - [`enrollments`]: Paid access grants
//! - [`coupons`]: Discount codes and their redemptions
//! - [`referrals`]: Referral relationships and bonus state
//! - [`notifications`]: Admin notification rows

pub mod catalog;
pub mod coupons;
pub mod enrollments;
pub mod notifications;
pub mod referrals;
pub mod transactions;
pub mod users;
pub mod wallets;
