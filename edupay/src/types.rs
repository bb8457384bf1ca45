//! Common type definitions and permission system types.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, WalletId, etc.)
//! - Resource and operation enums for access control
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: User account identifier
//! - [`WalletId`]: Wallet identifier (one per user)
//! - [`CourseId`], [`SectionId`], [`LessonId`]: Catalog identifiers (read-only here)
//! - [`EnrollmentId`]: Paid access grant identifier
//! - [`CouponId`], [`ReferralId`]: Discount and referral identifiers
//!
//! # Operations
//!
//! Operations come in two flavors:
//! - **All**: Unrestricted access to all entities (e.g., `ReadAll`, `UpdateAll`)
//! - **Own**: Restricted to the acting user's own entities (e.g., `ReadOwn`, `CreateOwn`)
//!
//! Admins hold every operation; everyone else holds only the `*Own` ones.

use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type WalletId = Uuid;
pub type TransactionId = Uuid;
pub type CourseId = Uuid;
pub type SectionId = Uuid;
pub type LessonId = Uuid;
pub type EnrollmentId = Uuid;
pub type CouponId = Uuid;
pub type ReferralId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    DeleteAll,
}

impl Operation {
    /// Whether the operation is restricted to the caller's own entities
    pub fn is_own(&self) -> bool {
        matches!(self, Operation::CreateOwn | Operation::ReadOwn)
    }
}

// Resources that can be operated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Wallets,
    Coupons,
    Referrals,
    Enrollments,
    Notifications,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll => write!(f, "Update"),
            Operation::DeleteAll => write!(f, "Delete"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Wallets => write!(f, "wallets"),
            Resource::Coupons => write!(f, "coupons"),
            Resource::Referrals => write!(f, "referrals"),
            Resource::Enrollments => write!(f, "enrollments"),
            Resource::Notifications => write!(f, "notifications"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_own_operations() {
        assert!(Operation::ReadOwn.is_own());
        assert!(Operation::CreateOwn.is_own());
        assert!(!Operation::ReadAll.is_own());
        assert!(!Operation::DeleteAll.is_own());
    }
}
