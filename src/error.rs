// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No credential was presented on a protected route.
    #[error("Authentication required")]
    Unauthenticated,

    /// Credential signature or structure is invalid.
    #[error("Invalid token")]
    InvalidCredential,

    #[error("Token expired")]
    ExpiredCredential,

    /// Credential verified but its subject no longer exists.
    #[error("Caller not found")]
    CallerNotFound,

    /// Local login failed (unknown account or wrong password).
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Not enough permissions")]
    Forbidden,

    #[error("Cannot modify your own account: {0}")]
    SelfModificationForbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unique constraint violated in the store.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Identity provider could not be reached or returned garbage.
    #[error("Upstream identity provider error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidCredential => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::ExpiredCredential => (StatusCode::UNAUTHORIZED, "expired_token", None),
            AppError::CallerNotFound => (StatusCode::UNAUTHORIZED, "caller_not_found", None),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AppError::AccountInactive => (StatusCode::FORBIDDEN, "account_inactive", None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::SelfModificationForbidden(msg) => (
                StatusCode::BAD_REQUEST,
                "self_modification_forbidden",
                Some(msg.clone()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                Some(msg.clone()),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Identity provider failure");
                (StatusCode::BAD_GATEWAY, "upstream_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_errors_are_unauthorized() {
        for err in [
            AppError::Unauthenticated,
            AppError::InvalidCredential,
            AppError::ExpiredCredential,
            AppError::CallerNotFound,
            AppError::InvalidCredentials,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_denials_map_to_distinct_statuses() {
        assert_eq!(
            AppError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::AccountInactive.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::SelfModificationForbidden("deactivate".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Upstream("timeout".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
