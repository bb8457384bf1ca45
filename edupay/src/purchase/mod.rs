//! The purchase engine.
//!
//! - [`pricing`]: list prices, coupon discounts and eligibility rules (pure)
//! - [`coupons`]: coupon validation and redemption against the database
//! - [`referrals`]: referral codes and the referrer bonus lifecycle
//! - [`enrollment`]: the end-to-end purchase and cancellation flow
//! - [`effects`]: work that runs after a purchase commits
//!
//! Everything that moves money goes through [`crate::db::handlers::Wallets`], so the
//! balance/ledger invariants are enforced in one place.

pub mod coupons;
pub mod effects;
pub mod enrollment;
pub mod pricing;
pub mod referrals;

pub use enrollment::{Cancellation, EnrollRequest, EnrollmentService, Purchase};
pub use referrals::ReferralService;
