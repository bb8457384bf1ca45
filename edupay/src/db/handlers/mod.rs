//! Repository implementations for database access.
//!
//! Each repository:
//! - Wraps a SQLx connection or transaction
//! - Provides strongly-typed operations
//! - Returns domain models from [`crate::db::models`]
//! - Owns the row-level concurrency control for its table (conditional updates, row locks)
//!
//! # Available Repositories
//!
//! - [`Wallets`]: Wallet balances and the append-only transaction ledger
//! - [`Coupons`]: Coupon definitions (implements [`Repository`]) and redemptions
//! - [`Referrals`]: Referral rows and bonus state transitions
//! - [`Enrollments`]: Paid access grants
//! - [`Catalog`]: Read-only price lookups for courses, sections and lessons
//! - [`Users`]: Acting users and referral codes
//! - [`Notifications`]: Admin notification rows
//!
//! # Common Pattern
//!
//! ```ignore
//! use edupay::db::handlers::Wallets;
//!
//! async fn example(pool: &sqlx::PgPool, user_id: uuid::Uuid) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let wallet = Wallets::new(&mut conn).get_or_create(user_id).await?;
//!     println!("balance: {}", wallet.balance);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod coupons;
pub mod enrollments;
pub mod notifications;
pub mod referrals;
pub mod repository;
pub mod users;
pub mod wallets;

pub use catalog::Catalog;
pub use coupons::Coupons;
pub use enrollments::Enrollments;
pub use notifications::Notifications;
pub use referrals::Referrals;
pub use repository::Repository;
pub use users::Users;
pub use wallets::{Debit, Wallets};
