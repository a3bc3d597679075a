// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.
//!
//! Operational errors (bad input, missing resources, auth failures) carry
//! their message through to the client. Database and internal errors are
//! logged and masked with a generic body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid input data: {0}")]
    Validation(String),

    #[error("Duplicate field value: {0}")]
    Duplicate(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Payment provider error: {0}")]
    PaymentApi(String),

    #[error("Email provider error: {0}")]
    EmailApi(String),

    #[error("OTP provider error: {0}")]
    OtpApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the error is safe to show to clients as-is.
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Database(_) | AppError::Internal(_))
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
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", Some(msg.clone()))
            }
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            }
            AppError::Duplicate(msg) => {
                (StatusCode::BAD_REQUEST, "duplicate_field", Some(msg.clone()))
            }
            AppError::SessionExpired => (StatusCode::REQUEST_TIMEOUT, "session_expired", None),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_requests",
                Some("Too many requests from this IP, please try again later".to_string()),
            ),
            AppError::PaymentApi(msg) => {
                (StatusCode::BAD_GATEWAY, "payment_error", Some(msg.clone()))
            }
            AppError::EmailApi(msg) => (StatusCode::BAD_GATEWAY, "email_error", Some(msg.clone())),
            AppError::OtpApi(msg) => (StatusCode::BAD_GATEWAY, "otp_error", Some(msg.clone())),
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
    fn operational_errors_keep_their_details() {
        assert!(AppError::BadRequest("nope".into()).is_operational());
        assert!(AppError::NotFound("tour".into()).is_operational());
        assert!(!AppError::Database("connection reset".into()).is_operational());
        assert!(!AppError::Internal(anyhow::anyhow!("bug")).is_operational());
    }

    #[test]
    fn status_codes_match_error_classes() {
        let cases = [
            (
                AppError::Unauthorized("login first".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
            (
                AppError::Forbidden("admins only".into()),
                StatusCode::FORBIDDEN,
            ),
            (AppError::NotFound("booking".into()), StatusCode::NOT_FOUND),
            (
                AppError::Validation("rating out of range".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::Duplicate("email".into()), StatusCode::BAD_REQUEST),
            (AppError::SessionExpired, StatusCode::REQUEST_TIMEOUT),
            (AppError::TooManyRequests, StatusCode::TOO_MANY_REQUESTS),
            (
                AppError::PaymentApi("provider down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Database("oops".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
