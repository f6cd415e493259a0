//! Paid-subscription resolution
//!
//! Answers one question: is this organization actually paying us? Status
//! alone is not enough; an org can sit on `active` with the zero-price
//! default plan, and that must never unlock paid features. Every ambiguous
//! case resolves to "not paid".

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crewdesk_shared::{Organization, SubscriptionPlan, SubscriptionStatus};

use crate::error::BillingResult;
use crate::plans::PlanCatalog;
use crate::trial::{TrialReport, TrialWindow};

/// Whether an organization has a paid subscription.
///
/// True only when all three hold: the status is `active`, the plan resolved,
/// and the plan costs something. A missing plan with an active status is a
/// data inconsistency and fails safe to false.
pub fn has_paid_subscription(
    status: SubscriptionStatus,
    plan: Option<&SubscriptionPlan>,
) -> bool {
    if status != SubscriptionStatus::Active {
        return false;
    }
    match plan {
        Some(plan) => plan.is_paid(),
        None => false,
    }
}

/// Everything the route guard and trial endpoints need to know about an
/// organization's standing, resolved at a single point in time.
#[derive(Debug, Clone)]
pub struct EntitlementSnapshot {
    pub org_id: Uuid,
    pub status: SubscriptionStatus,
    pub has_paid_subscription: bool,
    /// Trial lapsed or subscription cancelled; gates access to paid routes.
    pub subscription_expired: bool,
    pub trial: TrialReport,
}

/// Resolves entitlement snapshots from organization rows.
#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
    plans: PlanCatalog,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        let plans = PlanCatalog::new(pool.clone());
        Self { pool, plans }
    }

    /// Load an organization row by id.
    pub async fn get_organization(&self, org_id: Uuid) -> BillingResult<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, trial_start_date, trial_end_date, trial_expired,
                   subscription_status, subscription_plan_id, subscription_id,
                   stripe_customer_id, subscription_period_end, created_at, updated_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(org)
    }

    /// Resolve an organization's entitlement at `now`.
    ///
    /// A plan lookup failure is logged and treated as "no plan"; entitlement
    /// degrades to not-paid rather than surfacing an error to the guard.
    pub async fn resolve(&self, org: &Organization, now: OffsetDateTime) -> EntitlementSnapshot {
        let plan = match org.subscription_plan_id {
            Some(plan_id) => match self.plans.by_id(plan_id).await {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!(
                        org_id = %org.id,
                        plan_id = %plan_id,
                        error = %e,
                        "Plan lookup failed, treating organization as not paid"
                    );
                    None
                }
            },
            None => None,
        };

        let has_paid = has_paid_subscription(org.subscription_status, plan.as_ref());
        let window = TrialWindow::new(org.trial_start_date, org.trial_end_date);

        // A trial whose window has passed is gated immediately, even if the
        // hourly sweep has not flipped the stored flag yet. Orgs without an
        // end date are not on a ticking trial and stay ungated here.
        let trial_lapsed = org.subscription_status == SubscriptionStatus::Trial
            && !has_paid
            && window.end.is_some_and(|end| now >= end);

        EntitlementSnapshot {
            org_id: org.id,
            status: org.subscription_status,
            has_paid_subscription: has_paid,
            subscription_expired: org.trial_expired
                || org.subscription_status == SubscriptionStatus::Expired
                || trial_lapsed,
            trial: window.report(now, has_paid),
        }
    }
}

/// Flag organizations whose trial window has passed but whose status still
/// says `trial`. Run hourly by the worker; safe to run concurrently since
/// the WHERE clause makes it idempotent.
pub async fn mark_expired_trials(pool: &PgPool) -> BillingResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE organizations
        SET trial_expired = TRUE,
            subscription_status = 'expired',
            updated_at = NOW()
        WHERE subscription_status = 'trial'
          AND trial_end_date IS NOT NULL
          AND trial_end_date < NOW()
        "#,
    )
    .execute(pool)
    .await?;

    let affected = result.rows_affected();
    if affected > 0 {
        tracing::info!(count = affected, "Marked lapsed trials as expired");
    }
    Ok(affected)
}
