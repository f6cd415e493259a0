//! Token verification against the hosted auth provider
//!
//! Access tokens are validated locally first (HS256 via the shared JWT secret).
//! If local validation fails (key rotation, asymmetric signing) we fall back
//! to the provider's `/auth/v1/user` endpoint. Verification results are cached
//! with a short TTL to avoid provider rate limits when a dashboard fires
//! parallel requests.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::middleware::{AuthError, AuthState};

/// How long a provider verification result stays valid
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(60);

/// Cache size bound; unique-token floods evict rather than grow unbounded
const MAX_CACHE_ENTRIES: usize = 10_000;

/// A verified session extracted from an access token
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub email_verified: bool,
}

#[derive(Clone)]
pub(crate) struct CachedVerification {
    session: VerifiedSession,
    cached_at: Instant,
}

/// Thread-safe token verification cache
pub(crate) type TokenCache = Arc<RwLock<HashMap<String, CachedVerification>>>;

/// Claims in a hosted-auth access token
#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

/// Response from the provider's `/auth/v1/user` endpoint
#[derive(Debug, Deserialize)]
struct ProviderUserResponse {
    id: String,
    email: Option<String>,
    email_confirmed_at: Option<String>,
}

/// Verify an access token, using the cache, local validation, then the provider API
pub async fn verify_token(state: &AuthState, token: &str) -> Result<VerifiedSession, AuthError> {
    {
        let cache = state.token_cache.read().await;
        if let Some(entry) = cache.get(token) {
            if entry.cached_at.elapsed() < TOKEN_CACHE_TTL {
                return Ok(entry.session.clone());
            }
        }
    }

    let session = match verify_locally(state, token) {
        Ok(session) => session,
        Err(local_err) => {
            tracing::debug!(error = %local_err, "Local token validation failed, trying provider API");
            verify_via_provider(state, token).await?
        }
    };

    insert_cached(state, token, session.clone()).await;
    Ok(session)
}

/// Validate the token signature locally with the shared HS256 secret
fn verify_locally(state: &AuthState, token: &str) -> Result<VerifiedSession, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);

    let data = decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(state.auth_jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AuthError::InvalidToken)?;

    let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken)?;

    // Tokens issued before a verification flow may not carry the flag;
    // treat absence as verified and let the profile row be the final word.
    let email_verified = data
        .claims
        .user_metadata
        .get("email_verified")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    Ok(VerifiedSession {
        user_id,
        email: data.claims.email,
        email_verified,
    })
}

/// Ask the provider directly whether the token is valid
async fn verify_via_provider(state: &AuthState, token: &str) -> Result<VerifiedSession, AuthError> {
    let url = format!("{}/auth/v1/user", state.auth_url.trim_end_matches('/'));

    let response = state
        .http_client
        .get(&url)
        .header("apikey", &state.auth_anon_key)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Provider verification request failed");
            AuthError::ProviderUnavailable
        })?;

    if !response.status().is_success() {
        return Err(AuthError::InvalidToken);
    }

    let user: ProviderUserResponse = response.json().await.map_err(|e| {
        tracing::warn!(error = %e, "Provider verification response malformed");
        AuthError::ProviderUnavailable
    })?;

    let user_id = Uuid::parse_str(&user.id).map_err(|_| AuthError::InvalidToken)?;

    Ok(VerifiedSession {
        user_id,
        email: user.email,
        email_verified: user.email_confirmed_at.is_some(),
    })
}

async fn insert_cached(state: &AuthState, token: &str, session: VerifiedSession) {
    let mut cache = state.token_cache.write().await;
    if cache.len() >= MAX_CACHE_ENTRIES {
        cache.retain(|_, entry| entry.cached_at.elapsed() < TOKEN_CACHE_TTL);
        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }
    }
    cache.insert(
        token.to_string(),
        CachedVerification {
            session,
            cached_at: Instant::now(),
        },
    );
}
