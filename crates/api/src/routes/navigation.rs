//! Navigation guard evaluation endpoint
//!
//! Works signed-in or signed-out (the guard itself decides what an anonymous
//! navigation may see), so it sits behind `optional_auth`.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::auth::{lookup_organization, lookup_profile, AuthUser, VerifiedSession};
use crate::error::ApiResult;
use crate::guard::{evaluate, GuardContext, GuardOutcome, GuardSession, ProfileLookup};
use crate::state::AppState;
use crewdesk_shared::SubscriptionStatus;

#[derive(Debug, Deserialize)]
pub struct GuardQuery {
    pub path: String,
}

/// GET /api/v1/navigation/guard?path=…
pub async fn evaluate_guard(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Query(query): Query<GuardQuery>,
) -> ApiResult<Json<GuardOutcome>> {
    let (session, profile) = match user {
        Some(Extension(user)) => {
            let verified = VerifiedSession {
                user_id: user.user_id,
                email: user.email.clone(),
                email_verified: user.email_verified,
            };
            let session_context = state.sessions.attach(&verified).await;

            // Use the enriched snapshot when it has landed; fall back to a
            // direct lookup while enrichment is still in flight
            let profile = match session_context.current().profile {
                Some(profile) => profile,
                None => lookup_profile(&state.pool, user.user_id).await,
            };
            let session = GuardSession {
                user_id: user.user_id,
                email_verified: user.email_verified,
            };
            (Some(session), profile)
        }
        None => (None, ProfileLookup::NotFound),
    };

    let subscription_expired = resolve_expiry(&state, &profile).await;

    let context = GuardContext {
        path: query.path,
        session,
        profile,
        subscription_expired,
    };

    Ok(Json(evaluate(&context, &state.route_policy)))
}

/// Whether the caller's org is locked out of subscription-gated routes.
/// Lookup failures degrade to "not expired"; the guard's other steps still
/// steer a broken profile into setup.
async fn resolve_expiry(state: &AppState, profile: &ProfileLookup) -> bool {
    let org_id = match profile {
        ProfileLookup::Found(p) => match p.org_id {
            Some(org_id) => org_id,
            None => return false,
        },
        _ => return false,
    };

    let Some(org) = lookup_organization(&state.pool, org_id).await else {
        return false;
    };

    match &state.billing {
        Some(billing) => {
            billing
                .entitlement
                .resolve(&org, OffsetDateTime::now_utc())
                .await
                .subscription_expired
        }
        None => {
            org.trial_expired || org.subscription_status == SubscriptionStatus::Expired
        }
    }
}
