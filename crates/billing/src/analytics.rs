//! Fire-and-forget analytics event emission
//!
//! Analytics must never slow down or fail the operation that triggered them.
//! `emit` spawns the insert onto the runtime and returns immediately; insert
//! failures are logged and dropped.

use sqlx::PgPool;
use uuid::Uuid;

/// Emits product analytics events without blocking the caller.
#[derive(Clone)]
pub struct AnalyticsEmitter {
    pool: PgPool,
}

impl AnalyticsEmitter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an event. Returns before the write completes.
    pub fn emit(&self, org_id: Option<Uuid>, event: &str, properties: serde_json::Value) {
        let pool = self.pool.clone();
        let event = event.to_string();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO analytics_events (org_id, event, properties)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(org_id)
            .bind(&event)
            .bind(&properties)
            .execute(&pool)
            .await;

            if let Err(e) = result {
                tracing::warn!(
                    event = %event,
                    error = %e,
                    "Failed to record analytics event"
                );
            }
        });
    }
}
