// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.
//!
//! Every business-rule rejection gets its own variant and a stable
//! machine code in the JSON body; callers never have to parse prose
//! to find out why a check-in was refused.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Activity not eligible: {0}")]
    ActivityNotEligible(String),

    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Invalid or expired check-in token")]
    InvalidToken,

    #[error("Check-in limit reached for this location")]
    LimitExceeded,

    #[error("Activity allows check-ins at a single location only")]
    SingleLocationViolation,

    #[error("No accepted contact method supplied")]
    MissingContactMethod,

    #[error("Invalid {0} format")]
    InvalidFormat(&'static str),

    #[error("Verification code does not match or has expired")]
    InvalidCode,

    #[error("Resend requested too soon; retry in {retry_after_secs}s")]
    ResendTooSoon { retry_after_secs: i64 },

    #[error("Reward service error: {0}")]
    ExternalServiceUnavailable(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ActivityNotEligible(_) => "activity_not_eligible",
            AppError::LocationNotFound(_) => "location_not_found",
            AppError::InvalidToken => "invalid_token",
            AppError::LimitExceeded => "limit_exceeded",
            AppError::SingleLocationViolation => "single_location_violation",
            AppError::MissingContactMethod => "missing_contact_method",
            AppError::InvalidFormat(_) => "invalid_format",
            AppError::InvalidCode => "invalid_code",
            AppError::ResendTooSoon { .. } => "resend_too_soon",
            AppError::ExternalServiceUnavailable(_) => "external_service_unavailable",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller can retry the same operation after fixing input
    /// or waiting (as opposed to a terminal rejection).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::InvalidToken
                | AppError::MissingContactMethod
                | AppError::InvalidFormat(_)
                | AppError::InvalidCode
                | AppError::ResendTooSoon { .. }
                | AppError::ExternalServiceUnavailable(_)
        )
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
        let (status, details) = match &self {
            AppError::ActivityNotEligible(msg) => (StatusCode::CONFLICT, Some(msg.clone())),
            AppError::LocationNotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, None),
            AppError::LimitExceeded => (StatusCode::CONFLICT, None),
            AppError::SingleLocationViolation => (StatusCode::CONFLICT, None),
            AppError::MissingContactMethod => (StatusCode::UNPROCESSABLE_ENTITY, None),
            AppError::InvalidFormat(field) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Some(format!("invalid {} format", field)),
            ),
            AppError::InvalidCode => (StatusCode::UNPROCESSABLE_ENTITY, None),
            AppError::ResendTooSoon { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                Some(format!("retry in {} seconds", retry_after_secs)),
            ),
            AppError::ExternalServiceUnavailable(msg) => {
                tracing::warn!(error = %msg, "Reward service unavailable");
                (StatusCode::BAD_GATEWAY, None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Some(msg.clone())),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();

        // Cooldown violations also advertise the wait via Retry-After.
        if let AppError::ResendTooSoon { retry_after_secs } = &self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            AppError::ActivityNotEligible("x".into()),
            AppError::LocationNotFound("x".into()),
            AppError::InvalidToken,
            AppError::LimitExceeded,
            AppError::SingleLocationViolation,
            AppError::MissingContactMethod,
            AppError::InvalidFormat("phone"),
            AppError::InvalidCode,
            AppError::ResendTooSoon {
                retry_after_secs: 30,
            },
            AppError::ExternalServiceUnavailable("x".into()),
        ];

        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::InvalidToken.is_retryable());
        assert!(AppError::InvalidCode.is_retryable());
        assert!(!AppError::LimitExceeded.is_retryable());
        assert!(!AppError::SingleLocationViolation.is_retryable());
        assert!(!AppError::ActivityNotEligible("closed".into()).is_retryable());
    }
}
