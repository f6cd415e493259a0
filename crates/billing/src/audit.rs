//! Subscription audit log
//!
//! Append-only record of every subscription state change applied by the
//! webhook reconciler. Writes are best-effort: a failed audit insert is
//! logged and never rolls back the organization update it describes.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Audit log action, stored as its snake_case string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    PlanChanged,
    PaymentSucceeded,
    PaymentFailed,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::PlanChanged => "plan_changed",
            Self::PaymentSucceeded => "payment_succeeded",
            Self::PaymentFailed => "payment_failed",
        };
        write!(f, "{}", s)
    }
}

/// Builder for audit entries
pub struct AuditEntryBuilder {
    org_id: Uuid,
    action: AuditAction,
    payload: serde_json::Value,
}

impl AuditEntryBuilder {
    pub fn new(org_id: Uuid, action: AuditAction) -> Self {
        Self {
            org_id,
            action,
            payload: serde_json::json!({}),
        }
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Writes subscription audit entries
#[derive(Clone)]
pub struct SubscriptionAuditLogger {
    pool: PgPool,
}

impl SubscriptionAuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an audit entry. Callers in the reconciler wrap this in
    /// `if let Err` and log rather than propagate.
    pub async fn log(&self, entry: AuditEntryBuilder) -> BillingResult<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO subscription_audit_log (org_id, user_id, action, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(entry.org_id)
        // The reconciler acts on provider events, never on behalf of a user
        .bind(None::<Uuid>)
        .bind(entry.action.to_string())
        .bind(&entry.payload)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            org_id = %entry.org_id,
            action = %entry.action,
            audit_id = %id,
            "Subscription audit entry recorded"
        );
        Ok(id)
    }
}
