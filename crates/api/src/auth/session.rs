//! Session context with two-phase enrichment
//!
//! `set_session` is synchronous: it publishes the bare session immediately and
//! bumps a generation counter. Profile and organization enrichment runs in a
//! spawned task that re-checks the generation before applying, so a slow fetch
//! kicked off by an old session can never clobber a newer one. Consumers
//! re-evaluate the route guard on every watch notification.

use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use super::verify::VerifiedSession;
use crate::guard::ProfileLookup;
use crewdesk_shared::Organization;

/// Published session state; `profile` is `None` while enrichment is in flight
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub session: Option<VerifiedSession>,
    pub profile: Option<ProfileLookup>,
    pub organization: Option<Organization>,
}

/// Session state holder shared across the server
#[derive(Clone)]
pub struct SessionContext {
    pool: PgPool,
    generation: Arc<AtomicU64>,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionContext {
    pub fn new(pool: PgPool) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            pool,
            generation: Arc::new(AtomicU64::new(0)),
            tx,
        }
    }

    /// Subscribe to session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot
    pub fn current(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Replace the session and kick off enrichment; returns the new generation
    pub fn set_session(&self, session: Option<VerifiedSession>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.tx.send_replace(SessionSnapshot {
            generation,
            session: session.clone(),
            profile: None,
            organization: None,
        });

        if let Some(session) = session {
            let context = self.clone();
            tokio::spawn(async move {
                let profile = lookup_profile(&context.pool, session.user_id).await;
                let organization = match &profile {
                    ProfileLookup::Found(p) => match p.org_id {
                        Some(org_id) => lookup_organization(&context.pool, org_id).await,
                        None => None,
                    },
                    _ => None,
                };
                if !context.apply_enrichment(generation, profile, organization) {
                    tracing::debug!(generation, "Discarding stale session enrichment");
                }
            });
        }

        generation
    }

    /// Drop the session entirely
    pub fn clear(&self) -> u64 {
        self.set_session(None)
    }

    /// Apply enrichment results iff the snapshot still belongs to `generation`
    pub(crate) fn apply_enrichment(
        &self,
        generation: u64,
        profile: ProfileLookup,
        organization: Option<Organization>,
    ) -> bool {
        let mut applied = false;
        self.tx.send_modify(|snapshot| {
            if snapshot.generation == generation {
                snapshot.profile = Some(profile.clone());
                snapshot.organization = organization.clone();
                applied = true;
            }
        });
        applied
    }
}

/// Per-user session contexts, shared via `AppState`.
///
/// The first request for a user publishes the session and kicks off
/// enrichment; later requests reuse the same context (and its watch channel),
/// so guard evaluations read enriched state instead of re-querying.
#[derive(Clone)]
pub struct SessionRegistry {
    pool: PgPool,
    contexts: Arc<RwLock<HashMap<Uuid, SessionContext>>>,
}

impl SessionRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            contexts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create the context for a verified session
    pub async fn attach(&self, session: &VerifiedSession) -> SessionContext {
        {
            let contexts = self.contexts.read().await;
            if let Some(context) = contexts.get(&session.user_id) {
                return context.clone();
            }
        }

        let mut contexts = self.contexts.write().await;
        contexts
            .entry(session.user_id)
            .or_insert_with(|| {
                let context = SessionContext::new(self.pool.clone());
                context.set_session(Some(session.clone()));
                context
            })
            .clone()
    }

    /// Drop a user's context on sign-out
    pub async fn detach(&self, user_id: Uuid) {
        if let Some(context) = self.contexts.write().await.remove(&user_id) {
            context.clear();
        }
    }
}

/// Load a user profile, degrading lookup errors to `ProfileLookup::Failed`
pub async fn lookup_profile(pool: &PgPool, user_id: Uuid) -> ProfileLookup {
    let result = sqlx::query_as::<_, crewdesk_shared::UserProfile>(
        r#"
        SELECT id, org_id, email, role, has_seen_welcome, email_verified, created_at
        FROM user_profiles
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(Some(profile)) => ProfileLookup::Found(profile),
        Ok(None) => ProfileLookup::NotFound,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Profile lookup failed");
            ProfileLookup::Failed
        }
    }
}

/// Load an organization row; errors degrade to `None` with a warning
pub async fn lookup_organization(pool: &PgPool, org_id: Uuid) -> Option<Organization> {
    let result = sqlx::query_as::<_, Organization>(
        r#"
        SELECT id, name, trial_start_date, trial_end_date, trial_expired,
               subscription_status, subscription_plan_id, subscription_id,
               stripe_customer_id, subscription_period_end, created_at, updated_at
        FROM organizations
        WHERE id = $1
        "#,
    )
    .bind(org_id)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(org) => org,
        Err(e) => {
            tracing::warn!(org_id = %org_id, error = %e, "Organization lookup failed");
            None
        }
    }
}
