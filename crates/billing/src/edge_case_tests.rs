// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Subscription Core
//!
//! Tests critical boundary conditions in:
//! - Trial window math (degenerate windows, boundary instants)
//! - Paid-entitlement resolution (fail-safe combinations)
//! - Webhook signature verification (malformed and stale signatures)
//! - Audit log action encoding

#[cfg(test)]
mod trial_boundary_tests {
    use crate::trial::{TrialMilestone, TrialWindow};
    use time::macros::datetime;
    use time::Duration;

    // =========================================================================
    // Trial active exactly at the end instant - must read as inactive
    // =========================================================================
    #[test]
    fn test_trial_inactive_at_end_instant() {
        let end = datetime!(2026-04-01 00:00:00 UTC);
        let window = TrialWindow::new(Some(end - Duration::days(14)), Some(end));

        assert!(window.is_active(end - Duration::seconds(1), false));
        assert!(!window.is_active(end, false));
        assert!(!window.is_active(end + Duration::seconds(1), false));
    }

    // =========================================================================
    // Inverted window (end before start) - progress saturates at 100
    // =========================================================================
    #[test]
    fn test_inverted_window_reads_as_complete() {
        let window = TrialWindow::new(
            Some(datetime!(2026-04-10 00:00:00 UTC)),
            Some(datetime!(2026-04-01 00:00:00 UTC)),
        );
        let now = datetime!(2026-04-05 00:00:00 UTC);

        assert_eq!(window.progress(now), 100.0);
        assert_eq!(window.milestone(now), Some(TrialMilestone::Ending));
        assert!(!window.is_active(now, false));
    }

    // =========================================================================
    // Window entirely missing - every figure degrades safely
    // =========================================================================
    #[test]
    fn test_missing_window_degrades() {
        let window = TrialWindow::new(None, None);
        let now = datetime!(2026-04-05 00:00:00 UTC);

        assert!(!window.is_active(now, false));
        assert_eq!(window.days_left(now), 0);
        assert_eq!(window.progress(now), 100.0);
    }

    // =========================================================================
    // Milestone boundaries: exact threshold values land in the upper bucket
    // =========================================================================
    #[test]
    fn test_milestone_threshold_instants() {
        let start = datetime!(2026-04-01 00:00:00 UTC);
        // 100-hour window makes percent math exact
        let window = TrialWindow::new(Some(start), Some(start + Duration::hours(100)));

        let at = |pct: i64| start + Duration::hours(pct);
        assert_eq!(window.milestone(at(0)), Some(TrialMilestone::Beginning));
        assert_eq!(window.milestone(at(9)), Some(TrialMilestone::Beginning));
        assert_eq!(window.milestone(at(10)), None);
        assert_eq!(window.milestone(at(24)), None);
        assert_eq!(window.milestone(at(25)), Some(TrialMilestone::Quarter));
        assert_eq!(window.milestone(at(49)), Some(TrialMilestone::Quarter));
        assert_eq!(window.milestone(at(50)), Some(TrialMilestone::Halfway));
        assert_eq!(window.milestone(at(75)), Some(TrialMilestone::ThreeQuarters));
        assert_eq!(window.milestone(at(90)), Some(TrialMilestone::Ending));
        assert_eq!(window.milestone(at(100)), Some(TrialMilestone::Ending));
    }
}

#[cfg(test)]
mod entitlement_tests {
    use crate::entitlement::has_paid_subscription;
    use crewdesk_shared::{SubscriptionPlan, SubscriptionStatus};
    use uuid::Uuid;

    fn plan(price_cents: i32) -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::new_v4(),
            name: "Plan".to_string(),
            price_cents,
            max_members: 10,
            features: serde_json::json!({}),
            stripe_price_id: None,
            is_default: price_cents == 0,
        }
    }

    // =========================================================================
    // Full truth table: only active + present + priced counts as paid
    // =========================================================================
    #[test]
    fn test_paid_truth_table() {
        let paid = plan(4900);
        let free = plan(0);
        let statuses = [
            SubscriptionStatus::Trial,
            SubscriptionStatus::Active,
            SubscriptionStatus::Expired,
        ];

        for status in statuses {
            let expect_paid = status == SubscriptionStatus::Active;
            assert_eq!(has_paid_subscription(status, Some(&paid)), expect_paid);
            assert!(!has_paid_subscription(status, Some(&free)));
            assert!(!has_paid_subscription(status, None));
        }
    }

    // =========================================================================
    // Negative price never unlocks anything
    // =========================================================================
    #[test]
    fn test_negative_price_not_paid() {
        let weird = plan(-100);
        assert!(!has_paid_subscription(
            SubscriptionStatus::Active,
            Some(&weird)
        ));
    }
}

#[cfg(test)]
mod webhook_signature_tests {
    use crate::client::{StripeClient, StripeConfig};
    use crate::error::BillingError;
    use crate::webhooks::WebhookHandler;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use sqlx::postgres::PgPoolOptions;

    const SECRET: &str = "whsec_test_secret_key";

    fn handler() -> WebhookHandler {
        let config = StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: SECRET.to_string(),
            app_base_url: "http://localhost:3000".to_string(),
        };
        // Lazy pool: signature verification never touches the database
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/crewdesk_test")
            .unwrap();
        WebhookHandler::new(StripeClient::new(config), pool)
    }

    fn sign(payload: &str, timestamp: i64) -> String {
        let key = SECRET.strip_prefix("whsec_").unwrap();
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn now_unix() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    // =========================================================================
    // Wrong v1 signature - rejected before any event logic runs
    // =========================================================================
    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let handler = handler();
        let header = format!("t={},v1=deadbeef", now_unix());
        let result = handler.verify_event("{}", &header);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    // =========================================================================
    // Missing timestamp component - rejected
    // =========================================================================
    #[tokio::test]
    async fn test_missing_timestamp_rejected() {
        let handler = handler();
        let result = handler.verify_event("{}", "v1=deadbeef");
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    // =========================================================================
    // Correct signature but stale timestamp (> 5 minutes) - rejected
    // =========================================================================
    #[tokio::test]
    async fn test_stale_timestamp_rejected() {
        let handler = handler();
        let payload = "{}";
        let stale = now_unix() - 600;
        let header = format!("t={},v1={}", stale, sign(payload, stale));
        let result = handler.verify_event(payload, &header);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    // =========================================================================
    // Garbage header - rejected, never panics
    // =========================================================================
    #[tokio::test]
    async fn test_garbage_header_rejected() {
        let handler = handler();
        for header in ["", ",,,", "t=abc,v1=", "=t=1=v1=2"] {
            let result = handler.verify_event("{}", header);
            assert!(
                matches!(result, Err(BillingError::WebhookSignatureInvalid)),
                "header {:?} should be rejected",
                header
            );
        }
    }
}

#[cfg(test)]
mod reconciler_db_tests {
    use crate::client::{StripeClient, StripeConfig};
    use crate::webhooks::WebhookHandler;
    use crewdesk_shared::create_pool;
    use sqlx::PgPool;
    use uuid::Uuid;

    async fn db_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        create_pool(&url).await.expect("Failed to create pool")
    }

    fn handler(pool: PgPool) -> WebhookHandler {
        let config = StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test_secret_key".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
        };
        WebhookHandler::new(StripeClient::new(config), pool)
    }

    /// A customer.subscription.deleted event in the shape Stripe delivers it
    fn subscription_deleted_event(event_id: &str, customer_id: &str) -> stripe::Event {
        serde_json::from_value(serde_json::json!({
            "id": event_id,
            "created": 1_750_000_000,
            "livemode": false,
            "pending_webhooks": 1,
            "type": "customer.subscription.deleted",
            "data": {
                "object": {
                    "object": "subscription",
                    "id": "sub_reconcile_test",
                    "automatic_tax": {"enabled": false},
                    "billing_cycle_anchor": 1_750_000_000,
                    "cancel_at_period_end": false,
                    "created": 1_750_000_000,
                    "currency": "usd",
                    "current_period_end": 1_752_592_000,
                    "current_period_start": 1_750_000_000,
                    "customer": customer_id,
                    "items": {
                        "data": [],
                        "has_more": false,
                        "url": "/v1/subscription_items?subscription=sub_reconcile_test"
                    },
                    "livemode": false,
                    "metadata": {},
                    "start_date": 1_750_000_000,
                    "status": "canceled"
                }
            }
        }))
        .expect("event fixture should deserialize")
    }

    async fn ledger_row(pool: &PgPool, event_id: &str) -> (i64, String) {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM billing_webhook_events WHERE stripe_event_id = $1",
        )
        .bind(event_id)
        .fetch_one(pool)
        .await
        .unwrap();
        let (result,): (String,) = sqlx::query_as(
            "SELECT processing_result FROM billing_webhook_events WHERE stripe_event_id = $1",
        )
        .bind(event_id)
        .fetch_one(pool)
        .await
        .unwrap();
        (count, result)
    }

    // =========================================================================
    // Trial expiry sweep is idempotent: second run affects zero rows
    // =========================================================================
    #[tokio::test]
    #[ignore] // Requires database
    async fn test_mark_expired_trials_idempotent() {
        let pool = db_pool().await;

        crate::entitlement::mark_expired_trials(&pool).await.unwrap();
        let second = crate::entitlement::mark_expired_trials(&pool).await.unwrap();
        assert_eq!(second, 0);
    }

    // =========================================================================
    // Events for customers we have no org mapping for succeed as no-ops
    // =========================================================================
    #[tokio::test]
    #[ignore] // Requires database
    async fn test_unknown_customer_event_is_noop() {
        let pool = db_pool().await;
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        let customer_id = format!("cus_{}", Uuid::new_v4().simple());

        let event = subscription_deleted_event(&event_id, &customer_id);
        handler(pool.clone()).handle_event(event).await.unwrap();

        let (count, result) = ledger_row(&pool, &event_id).await;
        assert_eq!(count, 1);
        assert_eq!(result, "success");
    }

    // =========================================================================
    // Redelivering a processed event changes nothing: one ledger row, one
    // audit entry, one state transition
    // =========================================================================
    #[tokio::test]
    #[ignore] // Requires database
    async fn test_redelivered_event_applies_once() {
        let pool = db_pool().await;
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        let customer_id = format!("cus_{}", Uuid::new_v4().simple());

        let (org_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO organizations (name, stripe_customer_id) VALUES ($1, $2) RETURNING id",
        )
        .bind("Replay Test Org")
        .bind(&customer_id)
        .fetch_one(&pool)
        .await
        .unwrap();

        let handler = handler(pool.clone());
        for _ in 0..2 {
            let event = subscription_deleted_event(&event_id, &customer_id);
            handler.handle_event(event).await.unwrap();
        }

        let (count, result) = ledger_row(&pool, &event_id).await;
        assert_eq!(count, 1);
        assert_eq!(result, "success");

        let (status,): (String,) =
            sqlx::query_as("SELECT subscription_status FROM organizations WHERE id = $1")
                .bind(org_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "expired");

        let (audit_entries,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM subscription_audit_log WHERE org_id = $1 AND action = 'subscription_cancelled'",
        )
        .bind(org_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(audit_entries, 1);
    }

    // =========================================================================
    // A row left in 'error' is reclaimed on redelivery and reprocessed
    // =========================================================================
    #[tokio::test]
    #[ignore] // Requires database
    async fn test_errored_event_reprocessed_on_redelivery() {
        let pool = db_pool().await;
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        let customer_id = format!("cus_{}", Uuid::new_v4().simple());

        sqlx::query(
            r#"
            INSERT INTO billing_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result, error_message)
            VALUES ($1, 'customer.subscription.deleted', NOW(), 'error', 'transient failure')
            "#,
        )
        .bind(&event_id)
        .execute(&pool)
        .await
        .unwrap();

        let event = subscription_deleted_event(&event_id, &customer_id);
        handler(pool.clone()).handle_event(event).await.unwrap();

        let (count, result) = ledger_row(&pool, &event_id).await;
        assert_eq!(count, 1);
        assert_eq!(result, "success");
    }
}
