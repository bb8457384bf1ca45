//! Permission checks.
//!
//! Resources and operations are lifted to the type level by the [`resource`] and [`operation`]
//! marker types, so a handler can declare what it needs in its signature:
//!
//! ```ignore
//! async fn handler(user: RequiresPermission<resource::Wallets, operation::ReadOwn>) { .. }
//! ```

use crate::{
    AppState,
    api::models::users::CurrentUser,
    errors::{Error, Result},
    types::{Operation, Resource},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;
use std::ops::Deref;

pub trait ResourceMarker {
    const RESOURCE: Resource;
}

pub trait OperationMarker {
    const OPERATION: Operation;
}

macro_rules! markers {
    ($trait:ident, $const:ident, $enum:ident: $($name:ident),+ $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy)]
            pub struct $name;

            impl super::$trait for $name {
                const $const: super::$enum = super::$enum::$name;
            }
        )+
    };
}

pub mod resource {
    markers!(ResourceMarker, RESOURCE, Resource: Wallets, Coupons, Referrals, Enrollments, Notifications);
}

pub mod operation {
    markers!(OperationMarker, OPERATION, Operation: CreateAll, CreateOwn, ReadAll, ReadOwn, UpdateAll, DeleteAll);
}

/// Whether `user` may perform `operation` on `resource`.
///
/// Admins hold everything. Other users hold the `*Own` operations on every resource, and `*Own`
/// handlers only ever act on the caller's own wallet, enrollments and referrals.
pub fn has_permission(user: &CurrentUser, _resource: Resource, operation: Operation) -> bool {
    user.is_admin || operation.is_own()
}

/// Extractor that authenticates the caller and checks they hold `O` on `R`.
///
/// Derefs to the [`CurrentUser`].
#[derive(Debug, Clone)]
pub struct RequiresPermission<R, O> {
    user: CurrentUser,
    _marker: PhantomData<fn() -> (R, O)>,
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: ResourceMarker,
    O: OperationMarker,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            return Err(Error::InsufficientPermissions {
                resource: R::RESOURCE,
                action: O::OPERATION,
            });
        }

        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}
