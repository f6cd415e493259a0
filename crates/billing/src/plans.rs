//! Subscription plan catalog lookups
//!
//! The plan table is seeded by migrations and read-only at runtime; every
//! lookup goes straight to the database (the catalog is tiny and rarely hit).

use sqlx::PgPool;
use uuid::Uuid;

use crewdesk_shared::SubscriptionPlan;

use crate::error::{BillingError, BillingResult};

/// Read access to the subscription plan catalog
#[derive(Clone)]
pub struct PlanCatalog {
    pool: PgPool,
}

impl PlanCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a plan by its id. Returns None rather than an error so callers
    /// can fail safe (an org pointing at a deleted plan is not entitled).
    pub async fn by_id(&self, plan_id: Uuid) -> BillingResult<Option<SubscriptionPlan>> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, name, price_cents, max_members, features, stripe_price_id, is_default
            FROM subscription_plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }

    /// Look up a plan by its Stripe price id (used when reconciling checkout
    /// sessions and subscription line items).
    pub async fn by_stripe_price(&self, price_id: &str) -> BillingResult<Option<SubscriptionPlan>> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, name, price_cents, max_members, features, stripe_price_id, is_default
            FROM subscription_plans
            WHERE stripe_price_id = $1
            "#,
        )
        .bind(price_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }

    /// The zero-price default plan that cancelled orgs fall back to.
    /// The migration guarantees exactly one row has is_default = TRUE.
    pub async fn default_plan(&self) -> BillingResult<SubscriptionPlan> {
        let plan = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, name, price_cents, max_members, features, stripe_price_id, is_default
            FROM subscription_plans
            WHERE is_default = TRUE
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        plan.ok_or_else(|| BillingError::PlanNotFound("no default plan seeded".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crewdesk_shared::create_pool;

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_default_plan_is_free() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.expect("Failed to create pool");
        let catalog = PlanCatalog::new(pool);

        let plan = catalog.default_plan().await.unwrap();
        assert_eq!(plan.price_cents, 0);
        assert!(!plan.is_paid());
    }
}
