//! Stripe webhook endpoint
//!
//! Unauthenticated: the signature in the `stripe-signature` header is the
//! auth. The raw body must reach verification untouched, so the handler takes
//! `String` rather than a JSON extractor.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(billing) = &state.billing else {
        tracing::error!("Webhook received but billing is not configured");
        return (StatusCode::SERVICE_UNAVAILABLE, "Billing not configured").into_response();
    };

    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "Missing stripe-signature header").into_response();
    };

    // Reject before any event logic runs
    let event = match billing.webhooks.verify_event(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook signature verification failed");
            return (StatusCode::BAD_REQUEST, "Invalid signature").into_response();
        }
    };

    match billing.webhooks.handle_event(event).await {
        Ok(()) => Json(json!({ "received": true })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Webhook processing failed").into_response()
        }
    }
}
