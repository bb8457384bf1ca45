//! Database repository for coupons and coupon redemptions.
//!
//! Codes are normalised to upper case on write and matched case-insensitively on read.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::coupons::{
        CouponCreateDBRequest, CouponDBResponse, CouponFilter, CouponUpdateDBRequest, CouponUsageCreateDBRequest, CouponUsageDBResponse,
    },
};
use crate::types::{CouponId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;

pub struct Coupons<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Coupons<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_code(&mut self, code: &str) -> Result<Option<CouponDBResponse>> {
        let coupon = sqlx::query_as::<_, CouponDBResponse>("SELECT * FROM coupons WHERE code = UPPER($1)")
            .bind(code.trim())
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(coupon)
    }

    /// Fetch a coupon and hold its row lock until the surrounding transaction ends.
    ///
    /// Redemptions of the same coupon serialize on this lock, which keeps the per-user count
    /// check and the usage insert together.
    #[instrument(skip(self), err)]
    pub async fn lock_by_code(&mut self, code: &str) -> Result<Option<CouponDBResponse>> {
        let coupon = sqlx::query_as::<_, CouponDBResponse>("SELECT * FROM coupons WHERE code = UPPER($1) FOR UPDATE")
            .bind(code.trim())
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(coupon)
    }

    /// Number of times this user has redeemed the coupon
    pub async fn count_user_usages(&mut self, coupon_id: CouponId, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2")
            .bind(coupon_id)
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self, request), fields(coupon_id = %abbrev_uuid(&request.coupon_id), enrollment_id = %abbrev_uuid(&request.enrollment_id)), err)]
    pub async fn record_usage(&mut self, request: &CouponUsageCreateDBRequest) -> Result<CouponUsageDBResponse> {
        let usage = sqlx::query_as::<_, CouponUsageDBResponse>(
            r#"
            INSERT INTO coupon_usages (coupon_id, user_id, enrollment_id, order_amount, discount_amount, final_amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.coupon_id)
        .bind(request.user_id)
        .bind(request.enrollment_id)
        .bind(request.order_amount)
        .bind(request.discount_amount)
        .bind(request.final_amount)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(usage)
    }

    /// Bump `used_count` by one if the coupon is still under its limit.
    ///
    /// Returns `false` when the limit had already been reached.
    #[instrument(skip(self), fields(coupon_id = %abbrev_uuid(&id)), err)]
    pub async fn try_increment_usage(&mut self, id: CouponId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET used_count = used_count + 1
            WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)
            "#,
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count(&mut self, active_only: bool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM coupons WHERE ($1 = FALSE OR is_active)")
            .bind(active_only)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    pub async fn list_usages(&mut self, coupon_id: CouponId) -> Result<Vec<CouponUsageDBResponse>> {
        let usages = sqlx::query_as::<_, CouponUsageDBResponse>("SELECT * FROM coupon_usages WHERE coupon_id = $1 ORDER BY used_at")
            .bind(coupon_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(usages)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Coupons<'c> {
    type CreateRequest = CouponCreateDBRequest;
    type UpdateRequest = CouponUpdateDBRequest;
    type Response = CouponDBResponse;
    type Id = CouponId;
    type Filter = CouponFilter;

    #[instrument(skip(self, request), fields(code = %request.code), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let coupon = sqlx::query_as::<_, CouponDBResponse>(
            r#"
            INSERT INTO coupons
                (code, coupon_type, value, min_purchase, max_discount, usage_limit, usage_per_user, valid_from, valid_until)
            VALUES (UPPER($1), $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(request.code.trim())
        .bind(request.coupon_type)
        .bind(request.value)
        .bind(request.min_purchase)
        .bind(request.max_discount)
        .bind(request.usage_limit)
        .bind(request.usage_per_user)
        .bind(request.valid_from)
        .bind(request.valid_until)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(coupon)
    }

    #[instrument(skip(self), fields(coupon_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let coupon = sqlx::query_as::<_, CouponDBResponse>("SELECT * FROM coupons WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(coupon)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let coupons = sqlx::query_as::<_, CouponDBResponse>("SELECT * FROM coupons WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(coupons.into_iter().map(|c| (c.id, c)).collect())
    }

    #[instrument(skip(self, filter), fields(active_only = filter.active_only, limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let coupons = sqlx::query_as::<_, CouponDBResponse>(
            r#"
            SELECT * FROM coupons
            WHERE ($1 = FALSE OR is_active)
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(filter.active_only)
        .bind(filter.skip)
        .bind(filter.limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(coupons)
    }

    /// Coupons are referenced by their redemptions, so deleting one retires it instead
    #[instrument(skip(self), fields(coupon_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("UPDATE coupons SET is_active = FALSE WHERE id = $1 AND is_active")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(coupon_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let coupon = sqlx::query_as::<_, CouponDBResponse>(
            r#"
            UPDATE coupons SET
                is_active = COALESCE($2, is_active),
                valid_from = COALESCE($3, valid_from),
                valid_until = COALESCE($4, valid_until),
                usage_per_user = COALESCE($5, usage_per_user),
                usage_limit = CASE WHEN $6 THEN $7 ELSE usage_limit END,
                max_discount = CASE WHEN $8 THEN $9 ELSE max_discount END,
                min_purchase = CASE WHEN $10 THEN $11 ELSE min_purchase END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.is_active)
        .bind(request.valid_from)
        .bind(request.valid_until)
        .bind(request.usage_per_user)
        .bind(request.usage_limit.is_some())
        .bind(request.usage_limit.flatten())
        .bind(request.max_discount.is_some())
        .bind(request.max_discount.flatten())
        .bind(request.min_purchase.is_some())
        .bind(request.min_purchase.flatten())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(coupon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::coupons::CouponType;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn create_request(code: &str) -> CouponCreateDBRequest {
        CouponCreateDBRequest {
            code: code.to_string(),
            coupon_type: CouponType::Percentage,
            value: Decimal::from(10),
            min_purchase: Some(Decimal::from(100)),
            max_discount: None,
            usage_limit: Some(2),
            usage_per_user: 1,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(30),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_normalises_code(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Coupons::new(&mut conn);

        let coupon = repo.create(&create_request(" save10 ")).await.unwrap();
        assert_eq!(coupon.code, "SAVE10");
        assert_eq!(coupon.used_count, 0);
        assert!(coupon.is_active);

        assert_eq!(repo.get_by_code("Save10").await.unwrap().unwrap().id, coupon.id);
        assert!(repo.get_by_code("SAVE20").await.unwrap().is_none());

        let err = repo.create(&create_request("SAVE10")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalid_coupons_rejected_by_schema(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Coupons::new(&mut conn);

        let mut over_hundred = create_request("BIG");
        over_hundred.value = Decimal::from(150);
        assert!(matches!(repo.create(&over_hundred).await.unwrap_err(), DbError::CheckViolation { .. }));

        let mut backwards = create_request("BACKWARDS");
        backwards.valid_until = backwards.valid_from - Duration::days(1);
        assert!(matches!(repo.create(&backwards).await.unwrap_err(), DbError::CheckViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_increment_stops_at_limit(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Coupons::new(&mut conn);
        let coupon = repo.create(&create_request("LIMITED")).await.unwrap();

        assert!(repo.try_increment_usage(coupon.id).await.unwrap());
        assert!(repo.try_increment_usage(coupon.id).await.unwrap());
        assert!(!repo.try_increment_usage(coupon.id).await.unwrap());

        assert_eq!(repo.get_by_id(coupon.id).await.unwrap().unwrap().used_count, 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_list_and_retire(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Coupons::new(&mut conn);
        let first = repo.create(&create_request("FIRST")).await.unwrap();
        let second = repo.create(&create_request("SECOND")).await.unwrap();

        let updated = repo
            .update(
                first.id,
                &CouponUpdateDBRequest {
                    usage_limit: Some(Some(50)),
                    max_discount: Some(Some(Decimal::from(25))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.usage_limit, Some(50));
        assert_eq!(updated.max_discount, Some(Decimal::from(25)));
        assert_eq!(updated.min_purchase, first.min_purchase);

        let cleared = repo
            .update(
                first.id,
                &CouponUpdateDBRequest {
                    usage_limit: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.usage_limit, None);
        assert_eq!(cleared.max_discount, Some(Decimal::from(25)));

        assert!(repo.delete(second.id).await.unwrap());
        assert!(!repo.delete(second.id).await.unwrap());

        let active = repo.list(&CouponFilter::new(true, 0, 10)).await.unwrap();
        assert_eq!(active.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first.id]);
        assert_eq!(repo.list(&CouponFilter::new(false, 0, 10)).await.unwrap().len(), 2);

        let bulk = repo.get_bulk(vec![first.id, second.id]).await.unwrap();
        assert_eq!(bulk.len(), 2);
        assert!(!bulk[&second.id].is_active);

        let missing = repo.update(uuid::Uuid::new_v4(), &CouponUpdateDBRequest::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }
}
