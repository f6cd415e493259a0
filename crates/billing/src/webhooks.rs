//! Stripe webhook reconciliation
//!
//! Translates verified Stripe events into organization subscription state.
//! Processing is idempotent per event id, resolves organizations only by
//! their stored Stripe customer id (or explicit metadata), and treats audit
//! log and notification writes as best-effort appendages that never roll
//! back an applied state change.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::generated::billing::subscription::SubscriptionProrationBehavior;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Event, EventObject, EventType, Invoice, SetupIntent,
    Subscription, SubscriptionId, UpdateSubscription, UpdateSubscriptionItems, Webhook,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntryBuilder, SubscriptionAuditLogger};
use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::notifications::{NotificationKind, NotificationService};
use crate::plans::PlanCatalog;

type HmacSha256 = Hmac<Sha256>;

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    plans: PlanCatalog,
    audit: SubscriptionAuditLogger,
    notifications: NotificationService,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let plans = PlanCatalog::new(pool.clone());
        let audit = SubscriptionAuditLogger::new(pool.clone());
        let notifications = NotificationService::new(pool.clone());
        Self {
            stripe,
            pool,
            plans,
            audit,
            notifications,
        }
    }

    /// Verify and parse a Stripe webhook event
    ///
    /// Uses manual signature verification as a fallback to work around
    /// async-stripe version incompatibility with newer Stripe API versions.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        // Try the standard method first
        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        // Manual signature verification for newer Stripe API versions
        // Parse the signature header: t=timestamp,v1=signature,v0=signature
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;

        for part in signature.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() == 2 {
                match kv[0] {
                    "t" => timestamp = kv[1].parse().ok(),
                    "v1" => v1_signature = Some(kv[1].to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::error!("Missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::error!("Missing v1 signature in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        // Check timestamp tolerance (5 minutes)
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!("System time error: {}", e);
                BillingError::WebhookSignatureInvalid
            })?
            .as_secs() as i64;

        if (now - timestamp).abs() > 300 {
            tracing::error!(
                timestamp = timestamp,
                now = now,
                diff = (now - timestamp).abs(),
                "Webhook timestamp too old"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        // Compute expected signature over "{timestamp}.{payload}"
        let secret_key = webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
            tracing::error!("Invalid webhook secret key");
            BillingError::WebhookSignatureInvalid
        })?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::error!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(
                parse_error = %e,
                "Failed to parse webhook event JSON"
            );
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event
    ///
    /// Uses INSERT...ON CONFLICT...RETURNING to atomically claim exclusive
    /// processing rights per event id. Duplicate deliveries (and concurrent
    /// deliveries of the same event) become logged no-ops. Events stuck in
    /// 'processing' for over 30 minutes are reclaimable, as are events whose
    /// last attempt errored, so Stripe redelivery retries transient failures.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();

        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO billing_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                error_message = CONCAT('Reclaimed for retry at ', NOW()::TEXT)
            WHERE (billing_webhook_events.processing_result = 'processing'
                   AND billing_webhook_events.processing_started_at < NOW() - ($4 || ' minutes')::INTERVAL)
               OR billing_webhook_events.processing_result = 'error'
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type_str)
        .bind(event_timestamp)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to claim webhook event for processing"
            );
            BillingError::Database(e.to_string())
        })?;

        if claimed.is_none() {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                "Duplicate webhook event, skipping (already claimed or processed)"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Processing Stripe webhook event"
        );

        let result = self.process_event_internal(&event).await;

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success".to_string(), None),
            Err(e) => ("error".to_string(), Some(e.to_string())),
        };

        // Record the outcome; retry once since the ledger drives idempotency
        let update_result = sqlx::query(
            r#"
            UPDATE billing_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(&processing_result)
        .bind(&error_message)
        .bind(&event_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = update_result {
            tracing::warn!(
                event_id = %event_id,
                error = %e,
                "First attempt to update webhook event record failed, retrying..."
            );

            if let Err(retry_err) = sqlx::query(
                r#"
                UPDATE billing_webhook_events
                SET processing_result = $1, error_message = $2
                WHERE stripe_event_id = $3
                "#,
            )
            .bind(&processing_result)
            .bind(&error_message)
            .bind(&event_id)
            .execute(&self.pool)
            .await
            {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event.type_,
                    processing_result = %processing_result,
                    error_message = ?error_message,
                    first_error = %e,
                    retry_error = %retry_err,
                    "Failed to update webhook event record after retry; \
                     event may appear stuck in 'processing' state"
                );
            }
        }

        result
    }

    /// Internal event dispatch
    async fn process_event_internal(&self, event: &Event) -> BillingResult<()> {
        let event_owned = event.clone();

        match event.type_ {
            // Checkout: a new paid subscription was purchased
            EventType::CheckoutSessionCompleted => {
                self.handle_checkout_completed(event_owned).await?;
            }

            // Plan change flow confirms with a setup intent
            EventType::SetupIntentSucceeded => {
                self.handle_setup_intent_succeeded(event_owned).await?;
            }

            // Subscription lifecycle
            EventType::CustomerSubscriptionCreated => {
                self.handle_subscription_synced(event_owned, AuditAction::SubscriptionCreated)
                    .await?;
            }
            EventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_synced(event_owned, AuditAction::SubscriptionUpdated)
                    .await?;
            }
            EventType::CustomerSubscriptionDeleted => {
                self.handle_subscription_deleted(event_owned).await?;
            }

            // Invoices are audit-only: the subscription events above own the
            // org state, so a failed invoice deliberately does not downgrade
            EventType::InvoicePaymentSucceeded | EventType::InvoicePaid => {
                self.handle_invoice_payment_succeeded(event_owned).await?;
            }
            EventType::InvoicePaymentFailed => {
                self.handle_invoice_payment_failed(event_owned).await?;
            }

            _ => {
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
            }
        }

        Ok(())
    }

    // =========================================================================
    // Event handlers
    // =========================================================================

    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let session = self.extract_checkout_session(event)?;

        if session.mode != CheckoutSessionMode::Subscription {
            tracing::info!(
                session_id = %session.id,
                mode = ?session.mode,
                "Ignoring non-subscription checkout session"
            );
            return Ok(());
        }

        let org_id = match self.resolve_checkout_org(&session).await? {
            Some(org_id) => org_id,
            None => return Ok(()),
        };

        let subscription_id = match &session.subscription {
            Some(sub) => expandable_subscription_id(sub),
            None => {
                tracing::warn!(
                    session_id = %session.id,
                    "Checkout session completed without a subscription"
                );
                return Ok(());
            }
        };

        // Pull the live subscription for the price and period end
        let sub_id: SubscriptionId = subscription_id
            .parse()
            .map_err(|_| BillingError::Validation("invalid subscription id".to_string()))?;
        let subscription = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;

        let plan = self.resolve_plan(&session, &subscription).await?;
        let period_end = OffsetDateTime::from_unix_timestamp(subscription.current_period_end).ok();
        let customer_id = expandable_customer_id(&subscription.customer);

        sqlx::query(
            r#"
            UPDATE organizations
            SET subscription_status = 'active',
                trial_expired = FALSE,
                subscription_id = $2,
                subscription_plan_id = $3,
                stripe_customer_id = $4,
                subscription_period_end = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(&subscription_id)
        .bind(plan.as_ref().map(|p| p.id))
        .bind(&customer_id)
        .bind(period_end)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self
            .audit
            .log(
                AuditEntryBuilder::new(org_id, AuditAction::SubscriptionCreated).payload(
                    serde_json::json!({
                        "stripe_subscription_id": subscription_id,
                        "plan": plan.as_ref().map(|p| p.name.clone()),
                        "checkout_session_id": session.id.to_string(),
                    }),
                ),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription created audit entry");
        }

        if let Err(e) = self
            .notifications
            .notify_org_admins(
                org_id,
                "Subscription Activated",
                "Your subscription is now active. Welcome aboard!",
                NotificationKind::Success,
                Some("/subscription"),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to send subscription activated notifications");
        }

        tracing::info!(
            org_id = %org_id,
            subscription_id = %subscription_id,
            "Subscription activated from checkout"
        );

        Ok(())
    }

    async fn handle_setup_intent_succeeded(&self, event: Event) -> BillingResult<()> {
        let setup_intent = self.extract_setup_intent(event)?;

        let metadata = match &setup_intent.metadata {
            Some(metadata) => metadata,
            None => {
                tracing::info!(
                    setup_intent_id = %setup_intent.id,
                    "Setup intent has no metadata, not a plan change"
                );
                return Ok(());
            }
        };

        let subscription_id = match metadata.get("subscription_id") {
            Some(id) => id.clone(),
            None => {
                tracing::info!(
                    setup_intent_id = %setup_intent.id,
                    "Setup intent missing subscription_id metadata, not a plan change"
                );
                return Ok(());
            }
        };

        let new_plan_id: Uuid = metadata
            .get("new_plan_id")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| {
                BillingError::Validation("setup intent missing new_plan_id metadata".to_string())
            })?;

        let org_id = match &setup_intent.customer {
            Some(customer) => {
                let customer_id = expandable_customer_id(customer);
                match self.get_org_id_from_customer(&customer_id).await? {
                    Some(org_id) => org_id,
                    None => return Ok(()),
                }
            }
            None => {
                tracing::warn!(
                    setup_intent_id = %setup_intent.id,
                    "Setup intent has no customer, cannot resolve organization"
                );
                return Ok(());
            }
        };

        let new_plan = self
            .plans
            .by_id(new_plan_id)
            .await?
            .ok_or_else(|| BillingError::PlanNotFound(new_plan_id.to_string()))?;
        let new_price_id = new_plan.stripe_price_id.clone().ok_or_else(|| {
            BillingError::Validation(format!("plan {} has no Stripe price", new_plan.name))
        })?;

        // Swap the subscription's single item to the new price, prorating the
        // difference on the next invoice
        let sub_id: SubscriptionId = subscription_id
            .parse()
            .map_err(|_| BillingError::Validation("invalid subscription id".to_string()))?;
        let subscription = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;

        let item_id = subscription
            .items
            .data
            .first()
            .map(|item| item.id.to_string())
            .ok_or_else(|| {
                BillingError::SubscriptionNotFound(format!(
                    "subscription {} has no items",
                    subscription_id
                ))
            })?;
        let previous_plan_id = metadata.get("current_plan_id").cloned();

        Subscription::update(
            self.stripe.inner(),
            &sub_id,
            UpdateSubscription {
                items: Some(vec![UpdateSubscriptionItems {
                    id: Some(item_id),
                    price: Some(new_price_id),
                    ..Default::default()
                }]),
                proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
                ..Default::default()
            },
        )
        .await?;

        sqlx::query(
            r#"
            UPDATE organizations
            SET subscription_plan_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(new_plan.id)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self
            .audit
            .log(
                AuditEntryBuilder::new(org_id, AuditAction::PlanChanged).payload(
                    serde_json::json!({
                        "stripe_subscription_id": subscription_id,
                        "previous_plan_id": previous_plan_id,
                        "new_plan_id": new_plan.id,
                        "new_plan": new_plan.name,
                    }),
                ),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log plan change audit entry");
        }

        if let Err(e) = self
            .notifications
            .notify_org_admins(
                org_id,
                "Plan Updated",
                &format!("Your organization is now on the {} plan.", new_plan.name),
                NotificationKind::Info,
                Some("/subscription"),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to send plan change notifications");
        }

        tracing::info!(
            org_id = %org_id,
            subscription_id = %subscription_id,
            new_plan = %new_plan.name,
            "Plan change applied with proration"
        );

        Ok(())
    }

    /// Shared handler for subscription created/updated: sync provider state
    /// onto the organization row.
    async fn handle_subscription_synced(
        &self,
        event: Event,
        action: AuditAction,
    ) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;

        let customer_id = expandable_customer_id(&subscription.customer);
        let org_id = match self.get_org_id_from_customer(&customer_id).await? {
            Some(org_id) => org_id,
            None => return Ok(()),
        };

        let status = map_provider_status(subscription.status);
        let period_end = OffsetDateTime::from_unix_timestamp(subscription.current_period_end).ok();

        let plan = match subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
        {
            Some(price) => self.plans.by_stripe_price(price.id.as_str()).await?,
            None => None,
        };

        // trial_expired clears only on activation; COALESCE keeps the stored
        // plan when the price doesn't map to our catalog
        sqlx::query(
            r#"
            UPDATE organizations
            SET subscription_status = $2,
                trial_expired = CASE WHEN $2 = 'active' THEN FALSE ELSE trial_expired END,
                subscription_id = $3,
                subscription_plan_id = COALESCE($4, subscription_plan_id),
                subscription_period_end = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(status)
        .bind(subscription.id.to_string())
        .bind(plan.as_ref().map(|p| p.id))
        .bind(period_end)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self
            .audit
            .log(AuditEntryBuilder::new(org_id, action).payload(serde_json::json!({
                "stripe_subscription_id": subscription.id.to_string(),
                "provider_status": format!("{:?}", subscription.status),
                "mapped_status": status,
                "period_end": subscription.current_period_end,
            })))
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription sync audit entry");
        }

        tracing::info!(
            org_id = %org_id,
            subscription_id = %subscription.id,
            status = ?subscription.status,
            "Subscription state synced"
        );

        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;

        let customer_id = expandable_customer_id(&subscription.customer);
        let org_id = match self.get_org_id_from_customer(&customer_id).await? {
            Some(org_id) => org_id,
            None => return Ok(()),
        };

        // Back to the free default plan; the org keeps its data but loses
        // paid entitlements immediately
        let default_plan = self.plans.default_plan().await?;

        sqlx::query(
            r#"
            UPDATE organizations
            SET subscription_status = 'expired',
                subscription_id = NULL,
                subscription_plan_id = $2,
                subscription_period_end = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id)
        .bind(default_plan.id)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self
            .audit
            .log(
                AuditEntryBuilder::new(org_id, AuditAction::SubscriptionCancelled).payload(
                    serde_json::json!({
                        "stripe_subscription_id": subscription.id.to_string(),
                        "previous_status": format!("{:?}", subscription.status),
                        "reset_to_plan": default_plan.name,
                    }),
                ),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription cancelled audit entry");
        }

        if let Err(e) = self
            .notifications
            .notify_org_admins(
                org_id,
                "Subscription Cancelled",
                "Your subscription has ended and your organization has been moved to the Basic plan.",
                NotificationKind::Info,
                Some("/subscription"),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to send subscription cancelled notifications");
        }

        tracing::info!(
            org_id = %org_id,
            subscription_id = %subscription.id,
            "Subscription cancelled, organization reset to default plan"
        );

        Ok(())
    }

    async fn handle_invoice_payment_succeeded(&self, event: Event) -> BillingResult<()> {
        let invoice = self.extract_invoice(event)?;

        let org_id = match self.resolve_invoice_org(&invoice).await? {
            Some(org_id) => org_id,
            None => return Ok(()),
        };

        if let Err(e) = self
            .audit
            .log(
                AuditEntryBuilder::new(org_id, AuditAction::PaymentSucceeded).payload(
                    serde_json::json!({
                        "stripe_invoice_id": invoice.id.to_string(),
                        "amount_paid": invoice.amount_paid,
                    }),
                ),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment succeeded audit entry");
        }

        tracing::info!(
            org_id = %org_id,
            invoice_id = %invoice.id,
            "Invoice payment succeeded"
        );

        Ok(())
    }

    async fn handle_invoice_payment_failed(&self, event: Event) -> BillingResult<()> {
        let invoice = self.extract_invoice(event)?;

        let org_id = match self.resolve_invoice_org(&invoice).await? {
            Some(org_id) => org_id,
            None => return Ok(()),
        };

        if let Err(e) = self
            .audit
            .log(
                AuditEntryBuilder::new(org_id, AuditAction::PaymentFailed).payload(
                    serde_json::json!({
                        "stripe_invoice_id": invoice.id.to_string(),
                        "amount_due": invoice.amount_due,
                        "attempt_count": invoice.attempt_count,
                    }),
                ),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment failed audit entry");
        }

        // Stripe retries the charge on its own schedule; the subscription
        // events decide if the org is eventually downgraded
        if let Err(e) = self
            .notifications
            .notify_org_admins(
                org_id,
                "Payment Failed",
                "We could not process your latest payment. Please update your payment method.",
                NotificationKind::Error,
                Some("/subscription"),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to send payment failed notifications");
        }

        tracing::warn!(
            org_id = %org_id,
            invoice_id = %invoice.id,
            "Invoice payment failed"
        );

        Ok(())
    }

    // =========================================================================
    // Organization and object resolution
    // =========================================================================

    /// Resolve an organization by its stored Stripe customer id. Unknown
    /// customers (deleted orgs, foreign events) are logged no-ops.
    async fn get_org_id_from_customer(&self, customer_id: &str) -> BillingResult<Option<Uuid>> {
        let org: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM organizations WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        if org.is_none() {
            tracing::info!(
                customer_id = %customer_id,
                "No organization for Stripe customer, skipping event"
            );
        }
        Ok(org.map(|(id,)| id))
    }

    /// Checkout sessions carry our org id in metadata; the customer id is the
    /// fallback for sessions created before we started setting it.
    async fn resolve_checkout_org(&self, session: &CheckoutSession) -> BillingResult<Option<Uuid>> {
        if let Some(metadata) = &session.metadata {
            if let Some(org_id) = metadata.get("org_id").and_then(|id| id.parse::<Uuid>().ok()) {
                return Ok(Some(org_id));
            }
        }

        match &session.customer {
            Some(customer) => {
                let customer_id = expandable_customer_id(customer);
                self.get_org_id_from_customer(&customer_id).await
            }
            None => {
                tracing::warn!(
                    session_id = %session.id,
                    "Checkout session has neither org_id metadata nor a customer"
                );
                Ok(None)
            }
        }
    }

    async fn resolve_invoice_org(&self, invoice: &Invoice) -> BillingResult<Option<Uuid>> {
        match &invoice.customer {
            Some(customer) => {
                let customer_id = expandable_customer_id(customer);
                self.get_org_id_from_customer(&customer_id).await
            }
            None => {
                tracing::info!(
                    invoice_id = %invoice.id,
                    "Invoice has no customer, skipping event"
                );
                Ok(None)
            }
        }
    }

    /// Plan for a fresh checkout: explicit metadata plan_id wins, else map
    /// the subscription's price back through the catalog.
    async fn resolve_plan(
        &self,
        session: &CheckoutSession,
        subscription: &Subscription,
    ) -> BillingResult<Option<crewdesk_shared::SubscriptionPlan>> {
        if let Some(metadata) = &session.metadata {
            if let Some(plan_id) = metadata
                .get("plan_id")
                .and_then(|id| id.parse::<Uuid>().ok())
            {
                if let Some(plan) = self.plans.by_id(plan_id).await? {
                    return Ok(Some(plan));
                }
            }
        }

        match subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
        {
            Some(price) => self.plans.by_stripe_price(price.id.as_str()).await,
            None => Ok(None),
        }
    }

    fn extract_subscription(&self, event: Event) -> BillingResult<Subscription> {
        match event.data.object {
            EventObject::Subscription(subscription) => Ok(subscription),
            _ => Err(BillingError::Internal(
                "expected subscription object in event".to_string(),
            )),
        }
    }

    fn extract_invoice(&self, event: Event) -> BillingResult<Invoice> {
        match event.data.object {
            EventObject::Invoice(invoice) => Ok(invoice),
            _ => Err(BillingError::Internal(
                "expected invoice object in event".to_string(),
            )),
        }
    }

    fn extract_checkout_session(&self, event: Event) -> BillingResult<CheckoutSession> {
        match event.data.object {
            EventObject::CheckoutSession(session) => Ok(session),
            _ => Err(BillingError::Internal(
                "expected checkout session object in event".to_string(),
            )),
        }
    }

    fn extract_setup_intent(&self, event: Event) -> BillingResult<SetupIntent> {
        match event.data.object {
            EventObject::SetupIntent(setup_intent) => Ok(setup_intent),
            _ => Err(BillingError::Internal(
                "expected setup intent object in event".to_string(),
            )),
        }
    }
}

/// Map a provider subscription status to our org status. Anything other than
/// a fully active subscription keeps the org in trial; cancellation is
/// handled by the deleted event, never by this mapping.
fn map_provider_status(status: stripe::SubscriptionStatus) -> &'static str {
    match status {
        stripe::SubscriptionStatus::Active => "active",
        _ => "trial",
    }
}

fn expandable_customer_id(customer: &stripe::Expandable<stripe::Customer>) -> String {
    match customer {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(customer) => customer.id.to_string(),
    }
}

fn expandable_subscription_id(subscription: &stripe::Expandable<Subscription>) -> String {
    match subscription {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(subscription) => subscription.id.to_string(),
    }
}
