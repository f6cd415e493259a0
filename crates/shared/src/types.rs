//! Common types used across Crewdesk

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Organization subscription lifecycle state
///
/// `Trial` is the default for new organizations; `Expired` covers both a
/// lapsed trial and a cancelled paid subscription. Whether an org is *paid*
/// is never derived from this enum alone (see the billing crate's
/// entitlement resolver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Trial
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// User role within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Employee,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Employee
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuperAdmin => write!(f, "super_admin"),
            Self::Admin => write!(f, "admin"),
            Self::Employee => write!(f, "employee"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Organization (tenant) model
///
/// Invariant: `trial_expired` is never true while `subscription_status` is
/// `active`; every writer that activates a subscription clears the flag.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub trial_start_date: Option<OffsetDateTime>,
    pub trial_end_date: Option<OffsetDateTime>,
    pub trial_expired: bool,
    pub subscription_status: SubscriptionStatus,
    pub subscription_plan_id: Option<Uuid>,
    pub subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub subscription_period_end: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Subscription plan catalog row (read-only at runtime)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i32,
    pub max_members: i32,
    pub features: serde_json::Value,
    pub stripe_price_id: Option<String>,
    pub is_default: bool,
}

impl SubscriptionPlan {
    /// A plan only counts as paid when it actually costs something
    pub fn is_paid(&self) -> bool {
        self.price_cents > 0
    }
}

/// User profile model (id matches the hosted auth provider's user id)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub email: String,
    pub role: UserRole,
    pub has_seen_welcome: bool,
    pub email_verified: bool,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tests
// =============================================================================
