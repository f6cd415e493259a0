//! Crewdesk Background Worker
//!
//! Scheduled jobs:
//! - Trial expiry sweep (hourly): flags organizations whose trial window has
//!   lapsed while their status still says trial
//! - Webhook ledger retention (daily at 3:00 AM UTC): deletes processed
//!   webhook event records older than 90 days

use std::time::Duration;

use crewdesk_billing::mark_expired_trials;
use crewdesk_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// How long processed webhook event records are kept
const WEBHOOK_RETENTION_DAYS: i32 = 90;

async fn cleanup_webhook_events(pool: &sqlx::PgPool) {
    // Rows still marked 'processing' are left alone: they are either in
    // flight or reclaimable stuck claims, never garbage
    let result = sqlx::query(
        r#"
        DELETE FROM billing_webhook_events
        WHERE processing_result <> 'processing'
          AND created_at < NOW() - make_interval(days => $1)
        "#,
    )
    .bind(WEBHOOK_RETENTION_DAYS)
    .execute(pool)
    .await;

    match result {
        Ok(r) => info!(deleted = r.rows_affected(), "Webhook ledger cleanup complete"),
        Err(e) => error!(error = %e, "Webhook ledger cleanup failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    info!("Starting Crewdesk Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url).await?;
    info!("Database pool created");

    let scheduler = JobScheduler::new().await?;

    // Job 1: Trial expiry sweep (hourly, at minute 0)
    let sweep_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let pool = sweep_pool.clone();
            Box::pin(async move {
                info!("Running trial expiry sweep");
                match mark_expired_trials(&pool).await {
                    Ok(count) => info!(expired = count, "Trial expiry sweep complete"),
                    Err(e) => error!(error = %e, "Trial expiry sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Trial expiry sweep (hourly)");

    // Job 2: Webhook ledger retention (daily at 3:00 AM UTC)
    let cleanup_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let pool = cleanup_pool.clone();
            Box::pin(async move {
                info!("Running webhook ledger cleanup");
                cleanup_webhook_events(&pool).await;
            })
        })?)
        .await?;
    info!("Scheduled: Webhook ledger cleanup (daily at 3:00 AM UTC)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Crewdesk Worker started with 2 scheduled jobs");

    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
