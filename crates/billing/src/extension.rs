//! Trial extension requests
//!
//! Customers on an expiring trial can ask for more time. The request itself
//! is a support-queue row; nothing about the trial changes until someone
//! approves it. Analytics events bracket the attempt so funnel reporting can
//! see requested vs submitted vs failed.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::analytics::AnalyticsEmitter;
use crate::error::{BillingError, BillingResult};

/// A stored trial extension request
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrialExtensionRequest {
    pub id: Uuid,
    pub org_id: Uuid,
    pub reason: String,
    pub contact_email: String,
    pub status: String,
    pub created_at: OffsetDateTime,
}

/// Handles trial extension submissions
#[derive(Clone)]
pub struct TrialExtensionService {
    pool: PgPool,
    analytics: AnalyticsEmitter,
}

impl TrialExtensionService {
    pub fn new(pool: PgPool) -> Self {
        let analytics = AnalyticsEmitter::new(pool.clone());
        Self { pool, analytics }
    }

    /// Submit a trial extension request for an organization.
    ///
    /// An empty or whitespace-only reason is rejected before anything is
    /// written or emitted, so the caller can surface the message inline and
    /// keep the form state. On persistence failure the original error is
    /// returned to the caller; only the outcome analytics differ.
    pub async fn submit(
        &self,
        org_id: Uuid,
        reason: &str,
        contact_email: &str,
    ) -> BillingResult<TrialExtensionRequest> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BillingError::Validation(
                "Please provide a reason for the extension request".to_string(),
            ));
        }

        self.analytics.emit(
            Some(org_id),
            "trial_extension_requested",
            serde_json::json!({ "reason_length": reason.len() }),
        );

        let inserted = sqlx::query_as::<_, TrialExtensionRequest>(
            r#"
            INSERT INTO trial_extension_requests (org_id, reason, contact_email)
            VALUES ($1, $2, $3)
            RETURNING id, org_id, reason, contact_email, status, created_at
            "#,
        )
        .bind(org_id)
        .bind(reason)
        .bind(contact_email)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(request) => {
                self.analytics.emit(
                    Some(org_id),
                    "trial_extension_submitted",
                    serde_json::json!({ "request_id": request.id }),
                );
                tracing::info!(
                    org_id = %org_id,
                    request_id = %request.id,
                    "Trial extension request submitted"
                );
                Ok(request)
            }
            Err(e) => {
                self.analytics.emit(
                    Some(org_id),
                    "trial_extension_failed",
                    serde_json::json!({ "error": e.to_string() }),
                );
                Err(e.into())
            }
        }
    }
}
