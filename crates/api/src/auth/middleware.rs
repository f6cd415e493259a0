//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::verify::{verify_token, TokenCache};
use crate::config::Config;
use crewdesk_shared::UserRole;

/// Authenticated user attached to the request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub email_verified: bool,
    pub org_id: Option<Uuid>,
    pub role: Option<UserRole>,
}

impl AuthUser {
    /// Get org_id, returning an error if the user has no organization yet
    pub fn require_org_id(&self) -> Result<Uuid, AuthError> {
        self.org_id.ok_or(AuthError::NoOrganization)
    }
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub pool: PgPool,
    pub auth_url: String,
    pub auth_anon_key: String,
    pub auth_jwt_secret: String,
    pub http_client: Client,
    pub(crate) token_cache: TokenCache,
}

impl AuthState {
    pub fn new(pool: PgPool, config: &Config, http_client: Client) -> Self {
        Self {
            pool,
            auth_url: config.auth_url.clone(),
            auth_anon_key: config.auth_anon_key.clone(),
            auth_jwt_secret: config.auth_jwt_secret.clone(),
            http_client,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Auth provider unavailable")]
    ProviderUnavailable,

    #[error("User has no organization")]
    NoOrganization,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::MissingAuth => (StatusCode::UNAUTHORIZED, "MISSING_AUTH"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            Self::ProviderUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "AUTH_UNAVAILABLE"),
            Self::NoOrganization => (StatusCode::FORBIDDEN, "NO_ORGANIZATION"),
        };
        let body = Json(json!({
            "error": { "code": code, "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}

/// Extract bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!(path = %path, "require_auth: no bearer token");
        return AuthError::MissingAuth.into_response();
    };

    match authenticate(&auth_state, &token).await {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                org_id = ?auth_user.org_id,
                "require_auth: authenticated"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Middleware that optionally authenticates, for endpoints serving both states
pub async fn optional_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(&request) {
        if let Ok(auth_user) = authenticate(&auth_state, &token).await {
            request.extensions_mut().insert(auth_user);
        }
    }
    next.run(request).await
}

/// Verify the token and attach the profile's org membership
async fn authenticate(auth_state: &AuthState, token: &str) -> Result<AuthUser, AuthError> {
    let session = verify_token(auth_state, token).await?;

    // Profile enrichment is best-effort: a lookup failure leaves org fields
    // empty and the route guard steers the user into setup.
    let profile: Option<(Option<Uuid>, UserRole, bool)> = sqlx::query_as(
        "SELECT org_id, role, email_verified FROM user_profiles WHERE id = $1",
    )
    .bind(session.user_id)
    .fetch_optional(&auth_state.pool)
    .await
    .unwrap_or_else(|e| {
        tracing::warn!(user_id = %session.user_id, error = %e, "Profile lookup failed during auth");
        None
    });

    let (org_id, role, email_verified) = match profile {
        Some((org_id, role, verified)) => (org_id, Some(role), verified),
        None => (None, None, session.email_verified),
    };

    Ok(AuthUser {
        user_id: session.user_id,
        email: session.email,
        email_verified,
        org_id,
        role,
    })
}
