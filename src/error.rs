//! Error types for the reportgate service.

use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::gate::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};

/// Main error type for reportgate operations.
#[derive(Error, Debug)]
pub enum PortalError {
    /// The client exhausted its submission quota
    #[error("rate limit exceeded for client {client}")]
    RateLimitExceeded {
        client: String,
        limit: u32,
        reset_at: u64,
        retry_after_secs: u64,
    },

    /// No dashboard URL is configured
    #[error("{0} not configured")]
    ConfigurationMissing(&'static str),

    /// Case submission attempted without a configured dashboard
    #[error("{0} not configured")]
    SubmissionUnconfigured(&'static str),

    /// The request body could not be understood
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Field-level validation failed
    #[error("validation failed: {0}")]
    Validation(String),

    /// The dashboard does not know the company
    #[error("company not found")]
    CompanyNotFound,

    /// The dashboard rejected or failed the submission
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// The dashboard could not be reached or answered garbage
    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for PortalError {
    fn from(err: ::config::ConfigError) -> Self {
        PortalError::Config(err.to_string())
    }
}

impl PortalError {
    /// Re-shape an error raised while handling a case submission, whose
    /// replies always carry `success: false`.
    pub fn in_case_submission(self) -> Self {
        match self {
            PortalError::ConfigurationMissing(what) => PortalError::SubmissionUnconfigured(what),
            other => other,
        }
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        match self {
            PortalError::RateLimitExceeded {
                limit,
                reset_at,
                retry_after_secs,
                ..
            } => {
                let body = Json(json!({
                    "success": false,
                    "error": "Rate limit exceeded. Please wait before submitting another case.",
                }));
                let headers = [
                    (RETRY_AFTER, HeaderValue::from(retry_after_secs)),
                    (HeaderName::from_static(X_RATELIMIT_LIMIT), HeaderValue::from(limit)),
                    (HeaderName::from_static(X_RATELIMIT_REMAINING), HeaderValue::from(0u32)),
                    (HeaderName::from_static(X_RATELIMIT_RESET), HeaderValue::from(reset_at)),
                ];
                (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
            }
            PortalError::ConfigurationMissing(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": format!("{} not configured", what) })),
            )
                .into_response(),
            PortalError::SubmissionUnconfigured(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "error": format!("{} not configured", what) })),
            )
                .into_response(),
            PortalError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": msg })),
            )
                .into_response(),
            PortalError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": "Validation failed",
                    "details": details,
                })),
            )
                .into_response(),
            PortalError::CompanyNotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "error": "Company not found" })),
            )
                .into_response(),
            PortalError::SubmissionFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Failed to submit case. Please try again later.",
                })),
            )
                .into_response(),
            PortalError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Failed to connect to dashboard API" })),
            )
                .into_response(),
            PortalError::Config(_) | PortalError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response(),
        }
    }
}

/// Result type alias for reportgate operations.
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_response_headers() {
        let response = PortalError::RateLimitExceeded {
            client: "1.2.3.4".to_string(),
            limit: 5,
            reset_at: 1_700_000_300_000,
            retry_after_secs: 30,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["retry-after"], "30");
        assert_eq!(headers["x-ratelimit-limit"], "5");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "1700000300000");
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (PortalError::ConfigurationMissing("Dashboard API URL"), StatusCode::SERVICE_UNAVAILABLE),
            (PortalError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (PortalError::Validation("title: too short".into()), StatusCode::BAD_REQUEST),
            (PortalError::CompanyNotFound, StatusCode::NOT_FOUND),
            (PortalError::SubmissionFailed("500".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (PortalError::SubmissionUnconfigured("Dashboard API URL"), StatusCode::SERVICE_UNAVAILABLE),
            (PortalError::Upstream(request_error()), StatusCode::BAD_GATEWAY),
            (PortalError::Config("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    fn request_error() -> reqwest::Error {
        reqwest::Client::new().get("not a url").build().unwrap_err()
    }

    async fn body(err: PortalError) -> serde_json::Value {
        let bytes = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_body_shapes() {
        assert_eq!(
            body(PortalError::ConfigurationMissing("Dashboard API URL")).await,
            json!({ "error": "Dashboard API URL not configured" })
        );
        assert_eq!(
            body(PortalError::ConfigurationMissing("Dashboard API URL").in_case_submission()).await,
            json!({ "success": false, "error": "Dashboard API URL not configured" })
        );
        assert!(matches!(
            PortalError::CompanyNotFound.in_case_submission(),
            PortalError::CompanyNotFound
        ));
    }

    #[tokio::test]
    async fn test_upstream_body() {
        assert_eq!(
            body(PortalError::Upstream(request_error())).await,
            json!({ "error": "Failed to connect to dashboard API" })
        );
    }

    #[test]
    fn test_configuration_missing_message() {
        let err = PortalError::ConfigurationMissing("Dashboard API URL");
        assert_eq!(err.to_string(), "Dashboard API URL not configured");
    }
}
