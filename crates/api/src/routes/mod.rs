//! HTTP route definitions

pub mod health;
pub mod navigation;
pub mod trial;
pub mod webhook;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::{optional_auth, require_auth};
use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let protected = Router::new()
        .route("/api/v1/trial/status", get(trial::trial_status))
        .route(
            "/api/v1/trial/extension-request",
            post(trial::submit_extension_request),
        )
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    let guard_routes = Router::new()
        .route("/api/v1/navigation/guard", get(navigation::evaluate_guard))
        .layer(middleware::from_fn_with_state(auth_state, optional_auth));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        // Signature-authenticated, never behind session auth
        .route("/api/v1/billing/webhook", post(webhook::stripe_webhook))
        .merge(protected)
        .merge(guard_routes)
        .with_state(state)
}
