//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::AuthError;
use crate::container::OrchestrationError;
use crate::models::ErrorResponse;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions: {0}")]
    Forbidden(String),

    #[error("Account locked until {until}")]
    Locked { until: DateTime<Utc> },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Container runtime error: {0}")]
    BadGateway(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Locked { .. } => (StatusCode::LOCKED, "LOCKED_OUT"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "RESOURCE_UNAVAILABLE"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "RUNTIME_ERROR"),
            ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "HEALTH_CHECK_TIMEOUT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let mut body = ErrorResponse::new(error_code, self.to_string());
        if let ApiError::Locked { until } = &self {
            body = body.with_details(serde_json::json!({ "locked_until": until }));
        }

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::Unauthorized,
            AuthError::LockedOut { until } => ApiError::Locked { until },
            AuthError::WeakPassword(msg) | AuthError::InvalidUsername(msg) => {
                ApiError::BadRequest(msg)
            }
            AuthError::UserExists => ApiError::Conflict("user already exists".to_string()),
            AuthError::SignupPending => {
                ApiError::Forbidden("account is awaiting approval".to_string())
            }
            AuthError::UnknownUser(identity) => ApiError::NotFound(identity),
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal auth error");
                ApiError::Internal(msg)
            }
        }
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(err: OrchestrationError) -> Self {
        let message = err.to_string();
        match err {
            OrchestrationError::ResourceUnavailable(_) => ApiError::Unavailable(message),
            OrchestrationError::NetworkAttachFailed(_) | OrchestrationError::StopFailed(_) => {
                ApiError::BadGateway(message)
            }
            OrchestrationError::HealthCheckTimeout { .. } => ApiError::Timeout(message),
            OrchestrationError::NotFound(_) => ApiError::NotFound(message),
            OrchestrationError::ImageNotAllowed(_) => ApiError::BadRequest(message),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "Internal error");
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (AuthError::InvalidCredentials.into(), StatusCode::UNAUTHORIZED),
            (
                AuthError::LockedOut { until: Utc::now() }.into(),
                StatusCode::LOCKED,
            ),
            (
                AuthError::WeakPassword("short".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (AuthError::UserExists.into(), StatusCode::CONFLICT),
            (AuthError::SignupPending.into(), StatusCode::FORBIDDEN),
            (
                OrchestrationError::ResourceUnavailable("gpu".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                OrchestrationError::NetworkAttachFailed("net".into()).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                OrchestrationError::HealthCheckTimeout { seconds: 60 }.into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                OrchestrationError::NotFound("bob".into()).into(),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
