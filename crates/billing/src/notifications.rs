//! In-app notification fan-out
//!
//! Billing events notify every admin of the affected organization. Like the
//! audit log, delivery is best-effort: a failed insert never rolls back the
//! subscription state that triggered it.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Notification severity, stored as its lowercase string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
    Error,
}

impl NotificationKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

/// Writes notifications for org admins
#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one notification row per admin or super_admin of the org.
    /// Returns the number of recipients.
    pub async fn notify_org_admins(
        &self,
        org_id: Uuid,
        title: &str,
        message: &str,
        kind: NotificationKind,
        action_url: Option<&str>,
    ) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, org_id, title, message, kind, action_url)
            SELECT id, $1, $2, $3, $4, $5
            FROM user_profiles
            WHERE org_id = $1 AND role IN ('admin', 'super_admin')
            "#,
        )
        .bind(org_id)
        .bind(title)
        .bind(message)
        .bind(kind.as_str())
        .bind(action_url)
        .execute(&self.pool)
        .await?;

        let recipients = result.rows_affected();
        tracing::debug!(
            org_id = %org_id,
            recipients = recipients,
            title = %title,
            "Notified organization admins"
        );
        Ok(recipients)
    }
}
