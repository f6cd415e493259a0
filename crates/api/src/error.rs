//! API error types and HTTP response mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crewdesk_billing::BillingError;
use serde_json::json;

use crate::auth::AuthError;

/// API error type covering all HTTP failure modes
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Billing unavailable")]
    BillingUnavailable,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Billing error: {0}")]
    Billing(BillingError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(msg) => Self::Validation(msg),
            BillingError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Billing(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NoOrganization => Self::Forbidden(err.to_string()),
            AuthError::ProviderUnavailable => Self::Internal(err.to_string()),
            AuthError::MissingAuth | AuthError::InvalidToken => Self::Unauthorized,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                self.to_string(),
            ),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self.to_string()),
            Self::BillingUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "BILLING_UNAVAILABLE",
                "Billing is not configured".to_string(),
            ),
            Self::Database(e) => {
                if matches!(e, sqlx::Error::RowNotFound) {
                    (
                        StatusCode::NOT_FOUND,
                        "NOT_FOUND",
                        "Resource not found".to_string(),
                    )
                } else {
                    tracing::error!(error = %e, "Database error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "DATABASE_ERROR",
                        "A database error occurred".to_string(),
                    )
                }
            }
            Self::Billing(e) => {
                tracing::error!(error = %e, "Billing error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "BILLING_ERROR",
                    "A billing error occurred".to_string(),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_validation_maps_to_400() {
        let response = ApiError::Validation("reason is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let response = ApiError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_billing_validation_converts_to_api_validation() {
        let err: ApiError = BillingError::Validation("empty".to_string()).into();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_missing_org_converts_to_forbidden() {
        let err: ApiError = AuthError::NoOrganization.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
