//! Price resolution and discount arithmetic. Nothing in here touches the database.

use crate::db::models::{
    catalog::{CourseDBResponse, LessonDBResponse, SectionDBResponse},
    coupons::{CouponDBResponse, CouponType},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

/// Money is kept to two decimal places throughout
const MONEY_SCALE: u32 = 2;

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// The thing being bought, with the catalog rows already resolved
#[derive(Debug, Clone, Copy)]
pub enum PricedItem<'a> {
    FullCourse(&'a CourseDBResponse),
    Section(&'a CourseDBResponse, &'a SectionDBResponse),
    Lesson(&'a CourseDBResponse, &'a LessonDBResponse),
}

impl PricedItem<'_> {
    /// List price. Sections and lessons without their own price inherit the course price.
    pub fn original_price(&self) -> Decimal {
        match self {
            PricedItem::FullCourse(course) => course.price,
            PricedItem::Section(course, section) => section.price.unwrap_or(course.price),
            PricedItem::Lesson(course, lesson) => lesson.price.unwrap_or(course.price),
        }
    }
}

/// Discount and resulting price for one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub original_price: Decimal,
    pub discount: Decimal,
    pub final_price: Decimal,
}

impl Quote {
    pub fn undiscounted(original_price: Decimal) -> Self {
        Self {
            original_price,
            discount: Decimal::ZERO,
            final_price: original_price,
        }
    }

    pub fn is_free(&self) -> bool {
        self.final_price.is_zero()
    }
}

/// Discount a coupon grants on an order.
///
/// Percentage discounts are capped at `max_discount` when set; no discount ever exceeds the
/// order amount, so the final price is never negative. A negative order amount is treated as zero.
pub fn quote(coupon: &CouponDBResponse, order_amount: Decimal) -> Quote {
    let order_amount = order_amount.max(Decimal::ZERO);
    let raw = match coupon.coupon_type {
        CouponType::Percentage => {
            let discount = round_money(order_amount * coupon.value / Decimal::ONE_HUNDRED);
            match coupon.max_discount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        CouponType::Fixed => coupon.value,
    };
    let discount = raw.max(Decimal::ZERO).min(order_amount);

    Quote {
        original_price: order_amount,
        discount,
        final_price: order_amount - discount,
    }
}

/// Why a coupon cannot be used for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    UnknownCode,
    Inactive,
    NotYetValid,
    Expired,
    BelowMinimumPurchase,
    UsageLimitReached,
    PerUserLimitReached,
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CouponRejection::UnknownCode => "coupon code not recognised",
            CouponRejection::Inactive => "coupon is not active",
            CouponRejection::NotYetValid => "coupon is not valid yet",
            CouponRejection::Expired => "coupon has expired",
            CouponRejection::BelowMinimumPurchase => "order is below the coupon's minimum purchase",
            CouponRejection::UsageLimitReached => "coupon usage limit reached",
            CouponRejection::PerUserLimitReached => "coupon already used the maximum number of times by this user",
        };
        f.write_str(reason)
    }
}

/// Eligibility of a coupon for one user's order at `now`
pub fn check_eligibility(
    coupon: &CouponDBResponse,
    now: DateTime<Utc>,
    order_amount: Decimal,
    prior_user_usages: i64,
) -> Result<(), CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if now < coupon.valid_from {
        return Err(CouponRejection::NotYetValid);
    }
    if now > coupon.valid_until {
        return Err(CouponRejection::Expired);
    }
    if coupon.min_purchase.is_some_and(|min| order_amount < min) {
        return Err(CouponRejection::BelowMinimumPurchase);
    }
    if coupon.usage_limit.is_some_and(|limit| coupon.used_count >= limit) {
        return Err(CouponRejection::UsageLimitReached);
    }
    if prior_user_usages >= i64::from(coupon.usage_per_user) {
        return Err(CouponRejection::PerUserLimitReached);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn coupon(coupon_type: CouponType, value: &str) -> CouponDBResponse {
        let now = Utc::now();
        CouponDBResponse {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            coupon_type,
            value: dec(value),
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            usage_per_user: 1,
            used_count: 0,
            is_active: true,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            created_at: now,
        }
    }

    fn course(price: &str) -> CourseDBResponse {
        CourseDBResponse {
            id: Uuid::new_v4(),
            title: "Course".to_string(),
            price: dec(price),
            is_active: true,
            is_published: true,
            students_count: 0,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let q = quote(&coupon(CouponType::Percentage, "10"), dec("500"));
        assert_eq!(q.discount, dec("50"));
        assert_eq!(q.final_price, dec("450"));
    }

    #[test]
    fn test_percentage_discount_capped() {
        let mut c = coupon(CouponType::Percentage, "50");
        c.max_discount = Some(dec("100"));
        let q = quote(&c, dec("500"));
        assert_eq!(q.discount, dec("100"));
        assert_eq!(q.final_price, dec("400"));
    }

    #[test]
    fn test_percentage_discount_rounds_to_cents() {
        let q = quote(&coupon(CouponType::Percentage, "15"), dec("99.99"));
        assert_eq!(q.discount, dec("15.00"));
        assert_eq!(q.final_price, dec("84.99"));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_order() {
        let q = quote(&coupon(CouponType::Fixed, "75"), dec("60"));
        assert_eq!(q.discount, dec("60"));
        assert_eq!(q.final_price, Decimal::ZERO);
        assert!(q.is_free());

        let q = quote(&coupon(CouponType::Fixed, "25"), dec("60"));
        assert_eq!(q.final_price, dec("35"));
    }

    #[test]
    fn test_negative_order_quotes_nothing() {
        for c in [coupon(CouponType::Percentage, "10"), coupon(CouponType::Fixed, "25")] {
            let q = quote(&c, dec("-5"));
            assert_eq!(q.original_price, Decimal::ZERO);
            assert_eq!(q.discount, Decimal::ZERO);
            assert_eq!(q.final_price, Decimal::ZERO);
        }
    }

    #[test]
    fn test_full_percentage_is_free() {
        let q = quote(&coupon(CouponType::Percentage, "100"), dec("120"));
        assert!(q.is_free());
    }

    #[test]
    fn test_item_price_falls_back_to_course() {
        let c = course("300");
        let priced = SectionDBResponse {
            id: Uuid::new_v4(),
            course_id: c.id,
            title: "Priced".to_string(),
            price: Some(dec("80")),
        };
        let unpriced = LessonDBResponse {
            id: Uuid::new_v4(),
            course_id: c.id,
            section_id: None,
            title: "Unpriced".to_string(),
            price: None,
        };

        assert_eq!(PricedItem::FullCourse(&c).original_price(), dec("300"));
        assert_eq!(PricedItem::Section(&c, &priced).original_price(), dec("80"));
        assert_eq!(PricedItem::Lesson(&c, &unpriced).original_price(), dec("300"));
    }

    #[test]
    fn test_eligibility_rules() {
        let now = Utc::now();
        let base = coupon(CouponType::Percentage, "10");
        assert_eq!(check_eligibility(&base, now, dec("10"), 0), Ok(()));

        let mut inactive = base.clone();
        inactive.is_active = false;
        assert_eq!(check_eligibility(&inactive, now, dec("10"), 0), Err(CouponRejection::Inactive));

        let mut future = base.clone();
        future.valid_from = now + Duration::hours(1);
        assert_eq!(check_eligibility(&future, now, dec("10"), 0), Err(CouponRejection::NotYetValid));

        let mut expired = base.clone();
        expired.valid_until = now - Duration::hours(1);
        assert_eq!(check_eligibility(&expired, now, dec("10"), 0), Err(CouponRejection::Expired));

        let mut minimum = base.clone();
        minimum.min_purchase = Some(dec("100"));
        assert_eq!(
            check_eligibility(&minimum, now, dec("99.99"), 0),
            Err(CouponRejection::BelowMinimumPurchase)
        );
        assert_eq!(check_eligibility(&minimum, now, dec("100"), 0), Ok(()));

        let mut exhausted = base.clone();
        exhausted.usage_limit = Some(5);
        exhausted.used_count = 5;
        assert_eq!(check_eligibility(&exhausted, now, dec("10"), 0), Err(CouponRejection::UsageLimitReached));

        assert_eq!(check_eligibility(&base, now, dec("10"), 1), Err(CouponRejection::PerUserLimitReached));
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let c = coupon(CouponType::Fixed, "5");
        assert_eq!(check_eligibility(&c, c.valid_from, dec("10"), 0), Ok(()));
        assert_eq!(check_eligibility(&c, c.valid_until, dec("10"), 0), Ok(()));
    }
}
