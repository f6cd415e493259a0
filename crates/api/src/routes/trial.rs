//! Trial status and extension request endpoints

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/v1/trial/status
pub async fn trial_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let billing = state.billing.as_ref().ok_or(ApiError::BillingUnavailable)?;
    let org_id = user.require_org_id()?;

    let org = billing
        .entitlement
        .get_organization(org_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    let snapshot = billing
        .entitlement
        .resolve(&org, OffsetDateTime::now_utc())
        .await;

    Ok(Json(json!({
        "org_id": snapshot.org_id,
        "subscription_status": snapshot.status,
        "has_paid_subscription": snapshot.has_paid_subscription,
        "subscription_expired": snapshot.subscription_expired,
        "trial": snapshot.trial,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExtensionRequestBody {
    pub reason: String,
    pub contact_email: String,
}

/// POST /api/v1/trial/extension-request
pub async fn submit_extension_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ExtensionRequestBody>,
) -> ApiResult<Json<Value>> {
    let billing = state.billing.as_ref().ok_or(ApiError::BillingUnavailable)?;
    let org_id = user.require_org_id()?;

    let request = billing
        .extensions
        .submit(org_id, &body.reason, &body.contact_email)
        .await?;

    Ok(Json(json!({
        "id": request.id,
        "status": request.status,
        "created_at": request.created_at,
    })))
}
