//! Test fixtures: an in-process server, users, catalog rows, coupons and funded wallets.

use crate::config::{Config, DatabaseConfig, NotificationsConfig, PoolSettings};
use crate::db::{
    handlers::{Coupons, Enrollments, Repository, Users, Wallets},
    models::{
        catalog::{CourseDBResponse, LessonDBResponse, SectionDBResponse},
        coupons::{CouponCreateDBRequest, CouponDBResponse, CouponType},
        enrollments::{EnrollmentCreateDBRequest, EnrollmentDBResponse, EnrollmentType},
        transactions::{TransactionDBResponse, WalletMovementDBRequest},
        users::{UserCreateDBRequest, UserDBResponse},
    },
};
use crate::types::{CourseId, UserId};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> TestServer {
    crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application")
        .into_test_server()
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            // Tests always hand in their own pool
            url: "postgres://unused".to_string(),
            pool: PoolSettings {
                max_connections: 1,
                min_connections: 1,
                ..Default::default()
            },
        },
        notifications: NotificationsConfig { enabled: true },
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

async fn insert_user(pool: &PgPool, is_admin: bool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let tag = Uuid::new_v4().simple();
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: format!("student_{tag}@example.com"),
            display_name: Some("Test User".to_string()),
            is_admin,
        })
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_user(pool: &PgPool) -> UserDBResponse {
    insert_user(pool, false).await
}

pub async fn create_test_admin_user(pool: &PgPool) -> UserDBResponse {
    insert_user(pool, true).await
}

/// Header that authenticates `user` through the proxy-header extractor
pub fn add_auth_headers(user: &UserDBResponse) -> (String, String) {
    ("x-edupay-user".to_string(), user.email.clone())
}

/// An active, published course
pub async fn create_test_course(pool: &PgPool, price: Decimal) -> CourseDBResponse {
    sqlx::query_as::<_, CourseDBResponse>(
        r#"
        INSERT INTO courses (title, price, is_active, is_published)
        VALUES ($1, $2, TRUE, TRUE)
        RETURNING id, title, price, is_active, is_published, students_count
        "#,
    )
    .bind(format!("Course {}", Uuid::new_v4().simple()))
    .bind(price)
    .fetch_one(pool)
    .await
    .expect("Failed to create test course")
}

pub async fn create_test_section(pool: &PgPool, course_id: CourseId, price: Option<Decimal>) -> SectionDBResponse {
    sqlx::query_as::<_, SectionDBResponse>(
        "INSERT INTO course_sections (course_id, title, price) VALUES ($1, 'Section', $2) RETURNING id, course_id, title, price",
    )
    .bind(course_id)
    .bind(price)
    .fetch_one(pool)
    .await
    .expect("Failed to create test section")
}

pub async fn create_test_lesson(pool: &PgPool, course_id: CourseId, price: Option<Decimal>) -> LessonDBResponse {
    sqlx::query_as::<_, LessonDBResponse>(
        "INSERT INTO lessons (course_id, title, price) VALUES ($1, 'Lesson', $2) RETURNING id, course_id, section_id, title, price",
    )
    .bind(course_id)
    .bind(price)
    .fetch_one(pool)
    .await
    .expect("Failed to create test lesson")
}

/// A percentage coupon valid from an hour ago for thirty days
pub async fn create_test_coupon(
    pool: &PgPool,
    code: &str,
    percent: Decimal,
    min_purchase: Option<Decimal>,
    usage_limit: Option<i32>,
    usage_per_user: i32,
) -> CouponDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Coupons::new(&mut conn)
        .create(&CouponCreateDBRequest {
            code: code.to_string(),
            coupon_type: CouponType::Percentage,
            value: percent,
            min_purchase,
            max_discount: None,
            usage_limit,
            usage_per_user,
            valid_from: Utc::now() - Duration::hours(1),
            valid_until: Utc::now() + Duration::days(30),
        })
        .await
        .expect("Failed to create test coupon")
}

/// A full-course enrollment written directly, without touching the wallet
pub async fn create_test_enrollment(pool: &PgPool, student_id: UserId, course_id: CourseId, price: Decimal) -> EnrollmentDBResponse {
    create_test_discounted_enrollment(pool, student_id, course_id, price, None, Decimal::ZERO).await
}

/// An enrollment sold with `coupon_code` for `discount` off `price`, with no usage recorded yet
pub async fn create_test_discounted_enrollment(
    pool: &PgPool,
    student_id: UserId,
    course_id: CourseId,
    price: Decimal,
    coupon_code: Option<&str>,
    discount: Decimal,
) -> EnrollmentDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Enrollments::new(&mut conn)
        .create(&EnrollmentCreateDBRequest {
            id: Uuid::new_v4(),
            student_id,
            course_id,
            enrollment_type: EnrollmentType::FullCourse,
            section_id: None,
            lesson_id: None,
            original_price: price,
            discount,
            final_price: price - discount,
            coupon_code: coupon_code.map(str::to_string),
        })
        .await
        .expect("Failed to create test enrollment")
}

/// Credit `amount` to the user's wallet through the ledger
pub async fn fund_wallet(pool: &PgPool, user_id: UserId, amount: Decimal) -> TransactionDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Wallets::new(&mut conn)
        .deposit(&WalletMovementDBRequest::deposit(user_id, amount, "Test top-up", json!({ "source": "test" })))
        .await
        .expect("Failed to fund test wallet")
}
