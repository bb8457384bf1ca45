//! Coupon validation and redemption.
//!
//! [`validate_coupon`] is a read-only check. [`apply_coupon`] repeats the check under the coupon's
//! row lock and records the redemption in the same (sub)transaction, so a coupon cannot be
//! over-redeemed by concurrent requests.

use crate::db::{
    errors::DbError,
    handlers::{Coupons, Enrollments},
    models::coupons::{CouponDBResponse, CouponUsageCreateDBRequest, CouponUsageDBResponse},
};
use crate::errors::{Error, Result};
use crate::purchase::pricing::{self, CouponRejection, Quote};
use crate::types::{EnrollmentId, UserId, abbrev_uuid};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Connection, PgConnection};
use tracing::{debug, instrument};

/// Outcome of checking a coupon against an order
#[derive(Debug, Clone)]
pub enum CouponValidation {
    Valid { coupon: CouponDBResponse, quote: Quote },
    Invalid { reason: CouponRejection },
}

impl CouponValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, CouponValidation::Valid { .. })
    }
}

/// Check whether `code` can be used by this user on an order of `order_amount`.
#[instrument(skip(conn), fields(user_id = %abbrev_uuid(&user_id), %order_amount), err)]
pub async fn validate_coupon(conn: &mut PgConnection, code: &str, user_id: UserId, order_amount: Decimal) -> Result<CouponValidation> {
    let mut coupons = Coupons::new(conn);
    let Some(coupon) = coupons.get_by_code(code).await? else {
        return Ok(CouponValidation::Invalid {
            reason: CouponRejection::UnknownCode,
        });
    };

    evaluate(&mut coupons, coupon, user_id, order_amount).await
}

/// Redeem `code` for an enrollment.
///
/// The enrollment must be active, owned by `user_id`, priced at `order_amount` and carry `code`
/// as its coupon, so a usage row always describes the discount that enrollment was sold with.
///
/// Runs in a nested transaction: when called inside an open transaction it becomes a savepoint
/// and commits with the caller. Fails with [`Error::InvalidOrExpiredCoupon`] if the coupon no
/// longer passes validation.
#[instrument(skip(conn), fields(user_id = %abbrev_uuid(&user_id), enrollment_id = %abbrev_uuid(&enrollment_id), %order_amount), err)]
pub async fn apply_coupon(
    conn: &mut PgConnection,
    code: &str,
    user_id: UserId,
    enrollment_id: EnrollmentId,
    order_amount: Decimal,
) -> Result<CouponUsageDBResponse> {
    if order_amount < Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Order amount cannot be negative".to_string(),
        });
    }

    let mut tx = conn.begin().await.map_err(|e| Error::Database(e.into()))?;

    let enrollment = Enrollments::new(&mut tx).get_by_id(enrollment_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Enrollment".to_string(),
        id: enrollment_id.to_string(),
    })?;
    if enrollment.student_id != user_id {
        return Err(Error::BadRequest {
            message: "Coupons can only be applied to the purchaser's own enrollment".to_string(),
        });
    }
    if !enrollment.is_active {
        return Err(Error::BadRequest {
            message: "Coupons cannot be applied to a cancelled enrollment".to_string(),
        });
    }
    if !enrollment.coupon_code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(code.trim())) {
        return Err(Error::BadRequest {
            message: "Enrollment was not purchased with this coupon".to_string(),
        });
    }
    if order_amount != enrollment.original_price {
        return Err(Error::BadRequest {
            message: format!("Order amount must match the enrollment price of {}", enrollment.original_price),
        });
    }

    let mut coupons = Coupons::new(&mut tx);
    let invalid = || Error::InvalidOrExpiredCoupon { code: code.trim().to_uppercase() };

    let coupon = coupons.lock_by_code(code).await?.ok_or_else(invalid)?;
    let (coupon, quote) = match evaluate(&mut coupons, coupon, user_id, order_amount).await? {
        CouponValidation::Valid { coupon, quote } => (coupon, quote),
        CouponValidation::Invalid { reason } => {
            debug!(%reason, "Coupon failed re-validation at apply time");
            return Err(invalid());
        }
    };

    let usage = coupons
        .record_usage(&CouponUsageCreateDBRequest {
            coupon_id: coupon.id,
            user_id,
            enrollment_id,
            order_amount,
            discount_amount: quote.discount,
            final_amount: quote.final_price,
        })
        .await
        .map_err(|e| match e {
            DbError::UniqueViolation { .. } => Error::Conflict {
                message: "A coupon has already been applied to this enrollment".to_string(),
            },
            other => Error::Database(other),
        })?;

    if !coupons.try_increment_usage(coupon.id).await? {
        return Err(invalid());
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(usage)
}

async fn evaluate(coupons: &mut Coupons<'_>, coupon: CouponDBResponse, user_id: UserId, order_amount: Decimal) -> Result<CouponValidation> {
    let prior_usages = coupons.count_user_usages(coupon.id, user_id).await?;

    Ok(match pricing::check_eligibility(&coupon, Utc::now(), order_amount, prior_usages) {
        Ok(()) => {
            let quote = pricing::quote(&coupon, order_amount);
            CouponValidation::Valid { coupon, quote }
        }
        Err(reason) => CouponValidation::Invalid { reason },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Repository;
    use crate::db::models::coupons::CouponUpdateDBRequest;
    use crate::test_utils::{create_test_course, create_test_coupon, create_test_discounted_enrollment, create_test_enrollment, create_test_user};
    use futures::future::join_all;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_validate_reports_discount(pool: PgPool) {
        let user = create_test_user(&pool).await;
        create_test_coupon(&pool, "SAVE10", Decimal::from(10), Some(Decimal::from(100)), None, 1).await;
        let mut conn = pool.acquire().await.unwrap();

        match validate_coupon(&mut conn, "save10", user.id, Decimal::from(500)).await.unwrap() {
            CouponValidation::Valid { quote, .. } => {
                assert_eq!(quote.discount, Decimal::from(50));
                assert_eq!(quote.final_price, Decimal::from(450));
            }
            CouponValidation::Invalid { reason } => panic!("unexpected rejection: {reason}"),
        }

        let below_min = validate_coupon(&mut conn, "SAVE10", user.id, Decimal::from(99)).await.unwrap();
        assert!(matches!(
            below_min,
            CouponValidation::Invalid {
                reason: CouponRejection::BelowMinimumPurchase
            }
        ));

        let unknown = validate_coupon(&mut conn, "NOPE", user.id, Decimal::from(500)).await.unwrap();
        assert!(matches!(
            unknown,
            CouponValidation::Invalid {
                reason: CouponRejection::UnknownCode
            }
        ));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_apply_records_usage_once(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(500)).await;
        let enrollment = create_test_discounted_enrollment(&pool, user.id, course.id, Decimal::from(500), Some("SAVE10"), Decimal::from(50)).await;
        let coupon = create_test_coupon(&pool, "SAVE10", Decimal::from(10), None, None, 2).await;
        let mut conn = pool.acquire().await.unwrap();

        let usage = apply_coupon(&mut conn, "SAVE10", user.id, enrollment.id, Decimal::from(500)).await.unwrap();
        assert_eq!(usage.discount_amount, Decimal::from(50));
        assert_eq!(usage.final_amount, Decimal::from(450));
        assert_eq!(usage.enrollment_id, enrollment.id);

        // One coupon per enrollment
        let err = apply_coupon(&mut conn, "SAVE10", user.id, enrollment.id, Decimal::from(500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let stored = Coupons::new(&mut conn).get_by_id(coupon.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_apply_requires_enrollment_sold_with_coupon(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(300)).await;
        let full_price = create_test_enrollment(&pool, user.id, course.id, Decimal::from(300)).await;
        let coupon = create_test_coupon(&pool, "HALF", Decimal::from(50), None, None, 5).await;
        let mut conn = pool.acquire().await.unwrap();

        let err = apply_coupon(&mut conn, "HALF", user.id, full_price.id, Decimal::from(300))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));

        let discounted = create_test_discounted_enrollment(&pool, user.id, course.id, Decimal::from(300), Some("HALF"), Decimal::from(150)).await;
        let err = apply_coupon(&mut conn, "HALF", user.id, discounted.id, Decimal::from(999_999))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));

        let err = apply_coupon(&mut conn, "HALF", user.id, discounted.id, Decimal::from(-5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));

        assert!(Coupons::new(&mut conn).list_usages(coupon.id).await.unwrap().is_empty());
        assert_eq!(Coupons::new(&mut conn).get_by_id(coupon.id).await.unwrap().unwrap().used_count, 0);

        let usage = apply_coupon(&mut conn, "half", user.id, discounted.id, Decimal::from(300)).await.unwrap();
        assert_eq!(usage.discount_amount, discounted.discount);
        assert_eq!(usage.final_amount, discounted.final_price);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_apply_rejects_cancelled_enrollment(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(200)).await;
        let enrollment = create_test_discounted_enrollment(&pool, user.id, course.id, Decimal::from(200), Some("SAVE10"), Decimal::from(20)).await;
        let coupon = create_test_coupon(&pool, "SAVE10", Decimal::from(10), None, None, 1).await;
        let mut conn = pool.acquire().await.unwrap();
        Enrollments::new(&mut conn).deactivate(enrollment.id).await.unwrap();

        let err = apply_coupon(&mut conn, "SAVE10", user.id, enrollment.id, Decimal::from(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
        assert_eq!(Coupons::new(&mut conn).get_by_id(coupon.id).await.unwrap().unwrap().used_count, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_apply_rejects_revoked_coupon(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(500)).await;
        let enrollment = create_test_discounted_enrollment(&pool, user.id, course.id, Decimal::from(500), Some("GONE"), Decimal::from(50)).await;
        let coupon = create_test_coupon(&pool, "GONE", Decimal::from(10), None, None, 1).await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(
            validate_coupon(&mut conn, "GONE", user.id, Decimal::from(500))
                .await
                .unwrap()
                .is_valid()
        );
        Coupons::new(&mut conn)
            .update(
                coupon.id,
                &CouponUpdateDBRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = apply_coupon(&mut conn, "GONE", user.id, enrollment.id, Decimal::from(500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOrExpiredCoupon { ref code } if code == "GONE"));
        assert!(Coupons::new(&mut conn).list_usages(coupon.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_apply_to_someone_elses_enrollment_rejected(pool: PgPool) {
        let owner = create_test_user(&pool).await;
        let intruder = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(500)).await;
        let enrollment = create_test_discounted_enrollment(&pool, owner.id, course.id, Decimal::from(500), Some("SAVE10"), Decimal::from(50)).await;
        create_test_coupon(&pool, "SAVE10", Decimal::from(10), None, None, 1).await;
        let mut conn = pool.acquire().await.unwrap();

        let err = apply_coupon(&mut conn, "SAVE10", intruder.id, enrollment.id, Decimal::from(500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_usage_limit_holds_under_concurrency(pool: PgPool) {
        let course = create_test_course(&pool, Decimal::from(200)).await;
        let coupon = create_test_coupon(&pool, "FIVE", Decimal::from(10), None, Some(5), 1).await;

        let mut attempts = Vec::new();
        for _ in 0..6 {
            let user = create_test_user(&pool).await;
            let enrollment = create_test_discounted_enrollment(&pool, user.id, course.id, Decimal::from(200), Some("FIVE"), Decimal::from(20)).await;
            attempts.push((user.id, enrollment.id));
        }

        let outcomes = join_all(attempts.into_iter().map(|(user_id, enrollment_id)| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                apply_coupon(&mut conn, "FIVE", user_id, enrollment_id, Decimal::from(200)).await
            })
        }))
        .await;

        let (ok, failed): (Vec<_>, Vec<_>) = outcomes.into_iter().map(|o| o.unwrap()).partition(|r| r.is_ok());
        assert_eq!(ok.len(), 5);
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0], Err(Error::InvalidOrExpiredCoupon { .. })));

        let mut conn = pool.acquire().await.unwrap();
        let stored = Coupons::new(&mut conn).get_by_id(coupon.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 5);
        assert_eq!(Coupons::new(&mut conn).list_usages(coupon.id).await.unwrap().len(), 5);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_per_user_limit_holds_under_concurrency(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let course = create_test_course(&pool, Decimal::from(200)).await;
        let coupon = create_test_coupon(&pool, "ONCE", Decimal::from(10), None, None, 1).await;
        let first = create_test_discounted_enrollment(&pool, user.id, course.id, Decimal::from(200), Some("ONCE"), Decimal::from(20)).await;
        let second = create_test_discounted_enrollment(&pool, user.id, course.id, Decimal::from(200), Some("ONCE"), Decimal::from(20)).await;

        let outcomes = join_all([first.id, second.id].map(|enrollment_id| {
            let pool = pool.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                apply_coupon(&mut conn, "ONCE", user_id, enrollment_id, Decimal::from(200)).await
            })
        }))
        .await;

        let succeeded = outcomes.into_iter().filter(|o| matches!(o, Ok(Ok(_)))).count();
        assert_eq!(succeeded, 1);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Coupons::new(&mut conn).get_by_id(coupon.id).await.unwrap().unwrap().used_count, 1);
    }
}
