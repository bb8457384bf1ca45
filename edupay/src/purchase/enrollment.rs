//! The purchase pipeline.
//!
//! 1. Resolve the course and the purchased item, and price it.
//! 2. Apply the coupon if one was supplied and it validates (an invalid coupon is ignored).
//! 3. Check the wallet covers the final price.
//! 4. In one transaction: debit the wallet, create the enrollment, redeem the coupon and bump the
//!    course's student count. Any failure rolls all of it back.
//! 5. After commit: pay the referral bonus and notify admins. Neither can fail the purchase.

use crate::config::Config;
use crate::db::{
    handlers::{Catalog, Enrollments, Users, Wallets, wallets::Debit},
    models::{
        catalog::{CourseDBResponse, LessonDBResponse, SectionDBResponse},
        coupons::CouponUsageDBResponse,
        enrollments::{EnrollmentCreateDBRequest, EnrollmentDBResponse, EnrollmentType},
        transactions::{TransactionDBResponse, TransactionType, WalletMovementDBRequest},
    },
};
use crate::errors::{Error, Result};
use crate::notifications::{AdminNotifier, NewEnrollment};
use crate::purchase::{
    coupons::{self, CouponValidation},
    effects::{EffectsReport, PostCommitEffect, PostCommitEffects},
    pricing::{PricedItem, Quote},
    referrals::ReferralService,
};
use crate::types::{CourseId, EnrollmentId, LessonId, SectionId, UserId, abbrev_uuid};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{Connection, PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EnrollRequest {
    pub student_id: UserId,
    pub course_id: CourseId,
    pub enrollment_type: EnrollmentType,
    pub section_id: Option<SectionId>,
    pub lesson_id: Option<LessonId>,
    pub coupon_code: Option<String>,
}

/// A completed purchase
#[derive(Debug, Clone)]
pub struct Purchase {
    pub enrollment: EnrollmentDBResponse,
    /// The paying debit; `None` for free items
    pub transaction: Option<TransactionDBResponse>,
    pub coupon_usage: Option<CouponUsageDBResponse>,
    pub effects: EffectsReport,
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    pub enrollment: EnrollmentDBResponse,
    pub refund: Option<TransactionDBResponse>,
}

enum Target {
    FullCourse,
    Section(SectionDBResponse),
    Lesson(LessonDBResponse),
}

impl Target {
    fn priced<'a>(&'a self, course: &'a CourseDBResponse) -> PricedItem<'a> {
        match self {
            Target::FullCourse => PricedItem::FullCourse(course),
            Target::Section(section) => PricedItem::Section(course, section),
            Target::Lesson(lesson) => PricedItem::Lesson(course, lesson),
        }
    }

    fn describe(&self, course: &CourseDBResponse) -> String {
        match self {
            Target::FullCourse => course.title.clone(),
            Target::Section(section) => format!("{} / {}", course.title, section.title),
            Target::Lesson(lesson) => format!("{} / {}", course.title, lesson.title),
        }
    }

    fn ids(&self) -> (Option<SectionId>, Option<LessonId>) {
        match self {
            Target::FullCourse => (None, None),
            Target::Section(section) => (Some(section.id), None),
            Target::Lesson(lesson) => (lesson.section_id, Some(lesson.id)),
        }
    }
}

#[derive(Clone)]
pub struct EnrollmentService {
    db: PgPool,
    currency: String,
    effects: PostCommitEffects,
}

impl EnrollmentService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        let referrals = ReferralService::new(db.clone(), config.referrals.clone(), config.wallet.currency.clone());
        let notifier = AdminNotifier::new(db.clone(), config.notifications.enabled);
        Self {
            currency: config.wallet.currency.clone(),
            effects: PostCommitEffects::new(referrals, notifier),
            db,
        }
    }

    /// Buy a course, section or lesson from the student's wallet.
    #[instrument(
        skip(self, request),
        fields(
            student_id = %abbrev_uuid(&request.student_id),
            course_id = %abbrev_uuid(&request.course_id),
            enrollment_type = ?request.enrollment_type
        ),
        err
    )]
    pub async fn enroll(&self, request: &EnrollRequest) -> Result<Purchase> {
        let result = self.run_purchase(request).await;

        let outcome = match &result {
            Ok(_) => "completed",
            Err(Error::InsufficientBalance { .. }) => "insufficient_balance",
            Err(Error::CourseUnavailable { .. }) => "course_unavailable",
            Err(Error::InvalidOrExpiredCoupon { .. }) => "invalid_coupon",
            Err(_) => "failed",
        };
        metrics::counter!("edupay_purchases_total", "outcome" => outcome).increment(1);

        result
    }

    async fn run_purchase(&self, request: &EnrollRequest) -> Result<Purchase> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

        let student = Users::new(&mut conn).get_by_id(request.student_id).await?.ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: request.student_id.to_string(),
        })?;

        let course = Catalog::new(&mut conn).get_course(request.course_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Course".to_string(),
            id: request.course_id.to_string(),
        })?;
        if !course.is_purchasable() {
            return Err(Error::CourseUnavailable { course_id: course.id });
        }

        let target = resolve_target(&mut conn, &course, request).await?;
        let original_price = target.priced(&course).original_price();

        let coupon_code = request.coupon_code.as_deref().map(str::trim).filter(|code| !code.is_empty());
        let (quote, applied_code) = match coupon_code {
            Some(code) => match coupons::validate_coupon(&mut conn, code, student.id, original_price).await? {
                CouponValidation::Valid { coupon, quote } => (quote, Some(coupon.code)),
                CouponValidation::Invalid { reason } => {
                    info!(%reason, "Ignoring coupon that failed validation; charging full price");
                    (Quote::undiscounted(original_price), None)
                }
            },
            None => (Quote::undiscounted(original_price), None),
        };

        if !quote.is_free() {
            let mut wallets = Wallets::new(&mut conn).with_currency(self.currency.clone());
            if !wallets.has_enough_balance(student.id, quote.final_price).await? {
                return Err(Error::InsufficientBalance {
                    required: quote.final_price,
                    current_balance: wallets.get_balance(student.id).await?,
                });
            }
        }

        let enrollment_id = Uuid::new_v4();
        let (section_id, lesson_id) = target.ids();
        let mut tx = conn.begin().await.map_err(|e| Error::Database(e.into()))?;

        let transaction = if quote.is_free() {
            None
        } else {
            let debit = WalletMovementDBRequest::withdrawal(
                student.id,
                quote.final_price,
                format!("Purchase: {}", target.describe(&course)),
                json!({
                    "enrollment_id": enrollment_id,
                    "course_id": course.id,
                    "section_id": section_id,
                    "lesson_id": lesson_id,
                    "enrollment_type": request.enrollment_type,
                    "original_price": quote.original_price,
                    "discount": quote.discount,
                    "coupon_code": applied_code,
                }),
            );
            match Wallets::new(&mut tx).with_currency(self.currency.clone()).withdraw(&debit).await? {
                Debit::Applied(transaction) => Some(transaction),
                // Another purchase spent the money between the check and the debit
                Debit::Insufficient { current_balance } => {
                    return Err(Error::InsufficientBalance {
                        required: quote.final_price,
                        current_balance,
                    });
                }
            }
        };

        let enrollment = Enrollments::new(&mut tx)
            .create(&EnrollmentCreateDBRequest {
                id: enrollment_id,
                student_id: student.id,
                course_id: course.id,
                enrollment_type: request.enrollment_type,
                section_id,
                lesson_id,
                original_price: quote.original_price,
                discount: quote.discount,
                final_price: quote.final_price,
                coupon_code: applied_code.clone(),
            })
            .await?;

        let coupon_usage = match &applied_code {
            Some(code) => {
                let usage = coupons::apply_coupon(&mut tx, code, student.id, enrollment.id, quote.original_price).await?;
                if usage.discount_amount != quote.discount {
                    return Err(Error::Conflict {
                        message: "Coupon terms changed during checkout, please retry".to_string(),
                    });
                }
                Some(usage)
            }
            None => None,
        };

        if request.enrollment_type == EnrollmentType::FullCourse {
            Catalog::new(&mut tx).increment_students(course.id).await?;
        }

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        drop(conn);

        info!(
            enrollment_id = %abbrev_uuid(&enrollment.id),
            final_price = %enrollment.final_price,
            discount = %enrollment.discount,
            "Enrollment purchased"
        );

        let effects = self
            .effects
            .run(vec![
                PostCommitEffect::ReferralPayout {
                    enrollment_id: enrollment.id,
                },
                PostCommitEffect::NotifyAdmins(NewEnrollment {
                    enrollment: enrollment.clone(),
                    student_email: student.email,
                    course_title: course.title,
                }),
            ])
            .await;

        Ok(Purchase {
            enrollment,
            transaction,
            coupon_usage,
            effects,
        })
    }

    /// Cancel an active enrollment, optionally refunding what was paid.
    #[instrument(skip(self), fields(enrollment_id = %abbrev_uuid(&enrollment_id)), err)]
    pub async fn cancel_enrollment(&self, enrollment_id: EnrollmentId, refund: bool) -> Result<Cancellation> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let enrollment = match Enrollments::new(&mut tx).deactivate(enrollment_id).await? {
            Some(enrollment) => enrollment,
            None => {
                return match Enrollments::new(&mut tx).get_by_id(enrollment_id).await? {
                    Some(_) => Err(Error::Conflict {
                        message: "Enrollment is already cancelled".to_string(),
                    }),
                    None => Err(Error::NotFound {
                        resource: "Enrollment".to_string(),
                        id: enrollment_id.to_string(),
                    }),
                };
            }
        };

        let refund = if refund && enrollment.final_price > Decimal::ZERO {
            let credit = WalletMovementDBRequest::deposit(
                enrollment.student_id,
                enrollment.final_price,
                "Enrollment refund",
                json!({
                    "enrollment_id": enrollment.id,
                    "course_id": enrollment.course_id,
                }),
            )
            .with_type(TransactionType::Refund);
            Some(Wallets::new(&mut tx).with_currency(self.currency.clone()).deposit(&credit).await?)
        } else {
            None
        };

        if enrollment.enrollment_type == EnrollmentType::FullCourse {
            Catalog::new(&mut tx).decrement_students(enrollment.course_id).await?;
        }

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        info!(refunded = refund.is_some(), "Enrollment cancelled");

        Ok(Cancellation { enrollment, refund })
    }

    pub async fn list_for_student(&self, student_id: UserId, skip: i64, limit: i64) -> Result<(Vec<EnrollmentDBResponse>, i64)> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = Enrollments::new(&mut conn);
        let enrollments = repo.list_for_student(student_id, skip, limit).await?;
        let total = repo.count_for_student(student_id).await?;
        Ok((enrollments, total))
    }
}

async fn resolve_target(conn: &mut PgConnection, course: &CourseDBResponse, request: &EnrollRequest) -> Result<Target> {
    let mut catalog = Catalog::new(conn);
    match request.enrollment_type {
        EnrollmentType::FullCourse => {
            if request.section_id.is_some() || request.lesson_id.is_some() {
                return Err(Error::BadRequest {
                    message: "A full course enrollment cannot name a section or lesson".to_string(),
                });
            }
            Ok(Target::FullCourse)
        }
        EnrollmentType::Section => {
            let section_id = request.section_id.ok_or_else(|| Error::BadRequest {
                message: "section_id is required for a section enrollment".to_string(),
            })?;
            let section = catalog.get_section(course.id, section_id).await?.ok_or_else(|| Error::NotFound {
                resource: "Section".to_string(),
                id: section_id.to_string(),
            })?;
            Ok(Target::Section(section))
        }
        EnrollmentType::Lesson => {
            let lesson_id = request.lesson_id.ok_or_else(|| Error::BadRequest {
                message: "lesson_id is required for a lesson enrollment".to_string(),
            })?;
            let lesson = catalog.get_lesson(course.id, lesson_id).await?.ok_or_else(|| Error::NotFound {
                resource: "Lesson".to_string(),
                id: lesson_id.to_string(),
            })?;
            Ok(Target::Lesson(lesson))
        }
    }
}
