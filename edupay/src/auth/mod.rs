//! Authentication and authorization.
//!
//! The acting user is resolved from a trusted proxy header carrying their email address; the
//! proxy in front of the service is responsible for having authenticated them. Users seen for
//! the first time can be created on the fly (`auth.proxy_header.auto_create_users`).
//!
//! # Authorization
//!
//! Admins may perform every operation. Everyone else holds only the `*Own` operations, so they
//! can act on their own wallet, enrollments and referrals but cannot touch anyone else's.
//!
//! # Modules
//!
//! - [`current_user`]: The [`CurrentUser`](crate::api::models::users::CurrentUser) extractor
//! - [`permissions`]: Permission checks and the [`RequiresPermission`](permissions::RequiresPermission) extractor
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use edupay::auth::permissions::{RequiresPermission, operation, resource};
//!
//! async fn list_all_coupons(
//!     State(state): State<AppState>,
//!     _: RequiresPermission<resource::Coupons, operation::ReadAll>,
//! ) -> Result<Json<Vec<CouponResponse>>> {
//!     // only admins get here
//! }
//! ```

pub mod current_user;
pub mod permissions;
