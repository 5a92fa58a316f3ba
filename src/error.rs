//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::AmountError;
use crate::gateway::GatewayError;
use crate::sync::SyncError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    // Store errors
    #[error(transparent)]
    Gateway(GatewayError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(id) => AppError::EntryNotFound(id.to_string()),
            other => AppError::Gateway(other),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::InvalidAmount(e) => {
                (StatusCode::BAD_REQUEST, "invalid_amount", Some(e.to_string()))
            }

            // 404 Not Found
            AppError::EntryNotFound(id) => {
                (StatusCode::NOT_FOUND, "entry_not_found", Some(id.clone()))
            }

            // 422 for records that cannot be projected
            AppError::Sync(SyncError::Mapping(e)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "mapping_error",
                Some(e.to_string()),
            ),

            // 503 when the store is temporarily out of reach
            AppError::Gateway(e) | AppError::Sync(SyncError::Gateway(e)) if e.is_transient() => {
                tracing::warn!("Store unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }
            AppError::Sync(SyncError::Subscription { .. }) => {
                tracing::warn!("Subscription error: {}", self);
                (StatusCode::SERVICE_UNAVAILABLE, "subscription_error", None)
            }

            // 500 Internal Server Error
            AppError::Gateway(e) | AppError::Sync(SyncError::Gateway(e)) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_not_found_maps_to_404() {
        let err: AppError = GatewayError::NotFound(Uuid::nil()).into();
        assert!(matches!(err, AppError::EntryNotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_transient_gateway_error_maps_to_503() {
        let err: AppError = GatewayError::Unavailable("pool timed out".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_amount_maps_to_400() {
        let err: AppError = AmountError::NotPositive(rust_decimal::Decimal::ZERO).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
