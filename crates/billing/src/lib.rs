// Billing crate clippy configuration
#![allow(clippy::too_many_arguments)] // Some Stripe operations require many parameters
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Crewdesk Billing Module
//!
//! The subscription core of the platform: trial window math, paid-entitlement
//! resolution, plan catalog lookups, trial extension requests, and Stripe
//! webhook reconciliation.
//!
//! ## Features
//!
//! - **Trial Calculator**: pure date math over an org's trial window
//! - **Entitlement**: resolve whether an org actually has a paid subscription
//! - **Plans**: read the seeded plan catalog
//! - **Extensions**: trial extension requests with analytics bracketing
//! - **Audit**: append-only subscription audit log
//! - **Notifications**: best-effort admin notification fan-out
//! - **Webhooks**: idempotent Stripe event reconciliation

pub mod analytics;
pub mod audit;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod extension;
pub mod notifications;
pub mod plans;
pub mod trial;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Analytics
pub use analytics::AnalyticsEmitter;

// Audit
pub use audit::{AuditAction, AuditEntryBuilder, SubscriptionAuditLogger};

// Client
pub use client::{StripeClient, StripeConfig};

// Entitlement
pub use entitlement::{
    has_paid_subscription, mark_expired_trials, EntitlementService, EntitlementSnapshot,
};

// Error
pub use error::{BillingError, BillingResult};

// Extension
pub use extension::{TrialExtensionRequest, TrialExtensionService};

// Notifications
pub use notifications::{NotificationKind, NotificationService};

// Plans
pub use plans::PlanCatalog;

// Trial
pub use trial::{TrialMilestone, TrialReport, TrialWindow};

// Webhooks
pub use webhooks::WebhookHandler;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub entitlement: EntitlementService,
    pub extensions: TrialExtensionService,
    pub plans: PlanCatalog,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_client(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::with_client(StripeClient::new(config), pool)
    }

    fn with_client(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            entitlement: EntitlementService::new(pool.clone()),
            extensions: TrialExtensionService::new(pool.clone()),
            plans: PlanCatalog::new(pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}
