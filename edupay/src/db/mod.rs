//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers, purchase pipeline)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries & row-level concurrency control)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Transactions
//!
//! Repositories wrap a `&mut PgConnection`, so they work the same whether they are handed a
//! pooled connection or an open transaction. Repository methods that need several statements
//! to land together call `begin()` on the connection they were given: on a plain connection
//! that opens a transaction, inside an existing transaction it opens a savepoint. This is what
//! lets the purchase pipeline compose a wallet debit, an enrollment insert and a coupon
//! redemption into one atomic unit:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let debit = Wallets::new(&mut tx).withdraw(&request).await?;
//! let enrollment = Enrollments::new(&mut tx).create(&create).await?;
//! tx.commit().await?;
//! ```
//!
//! No balance or counter is ever cached in memory: every check-and-mutate happens in a single
//! conditional `UPDATE` or under a row lock.
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator.

pub mod errors;
pub mod handlers;
pub mod models;
