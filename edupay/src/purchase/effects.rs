//! Side effects that run after a purchase has committed.
//!
//! None of these can fail the purchase. The referral payout is awaited so its outcome is known
//! when the purchase returns; the admin notification is spawned and not waited for.

use crate::notifications::{AdminNotifier, NewEnrollment};
use crate::purchase::referrals::{GrantOutcome, ReferralService};
use crate::types::{EnrollmentId, abbrev_uuid};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum PostCommitEffect {
    ReferralPayout { enrollment_id: EnrollmentId },
    NotifyAdmins(NewEnrollment),
}

/// What happened to the effects of one purchase
#[derive(Debug, Clone, Default)]
pub struct EffectsReport {
    /// `None` when no payout was attempted or the attempt failed
    pub referral: Option<GrantOutcome>,
    pub referral_failed: bool,
    pub notification_dispatched: bool,
}

#[derive(Clone)]
pub struct PostCommitEffects {
    referrals: ReferralService,
    notifier: AdminNotifier,
}

impl PostCommitEffects {
    pub fn new(referrals: ReferralService, notifier: AdminNotifier) -> Self {
        Self { referrals, notifier }
    }

    pub async fn run(&self, effects: Vec<PostCommitEffect>) -> EffectsReport {
        let mut report = EffectsReport::default();

        for effect in effects {
            match effect {
                PostCommitEffect::ReferralPayout { enrollment_id } => match self.referrals.grant_bonus_on_purchase(enrollment_id).await {
                    Ok(outcome) => {
                        debug!(enrollment_id = %abbrev_uuid(&enrollment_id), ?outcome, "Referral payout step finished");
                        report.referral = Some(outcome);
                    }
                    Err(e) => {
                        warn!(
                            enrollment_id = %abbrev_uuid(&enrollment_id),
                            error = %e,
                            "Referral payout failed; the purchase stands and the bonus stays unpaid"
                        );
                        metrics::counter!("edupay_referral_payouts_total", "outcome" => "failed").increment(1);
                        report.referral_failed = true;
                    }
                },
                PostCommitEffect::NotifyAdmins(info) => {
                    self.notifier.dispatch_new_enrollment(info);
                    report.notification_dispatched = true;
                }
            }
        }

        report
    }
}
