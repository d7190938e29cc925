//! Route table.

use std::time::Duration;

use axum::handler::Handler;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;
use crate::config::{CorsConfig, PortalConfig};
use crate::error::{PortalError, Result};
use crate::gate::{admission_middleware, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};

/// The rate-limited public case submission endpoint.
pub const SUBMIT_CASE_PATH: &str = "/api/public/cases/submit";

/// Preflight cache lifetime.
const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Build the portal router.
///
/// | Method | Path | Notes |
/// |--------|------|-------|
/// | `POST` | `/api/public/cases/submit` | Rate limited, CORS enabled |
/// | `OPTIONS` | `/api/public/cases/submit` | CORS preflight |
/// | `POST` | `/api/submit` | Raw report relay, bounded by `dashboard.body_limit_bytes` |
/// | `GET` | `/api/track/{tracking_id}` | Report status relay |
/// | `GET` | `/api/config/{subdomain}` | Form config relay |
/// | `GET` | `/api/health` | Dashboard connectivity |
pub fn build_router(state: AppState, config: &PortalConfig) -> Result<Router> {
    let gate = middleware::from_fn_with_state(state.gate.clone(), admission_middleware);

    let submission = Router::new()
        .route(
            SUBMIT_CASE_PATH,
            post(handlers::submit_case.layer(gate)).options(handlers::preflight),
        )
        .layer(cors_layer(&config.cors)?);
    let upload_limit = DefaultBodyLimit::max(config.dashboard.body_limit_bytes);

    Ok(Router::new()
        .route("/api/submit", post(handlers::submit_report).layer(upload_limit))
        .route("/api/track/{tracking_id}", get(handlers::track_report))
        .route("/api/config/{subdomain}", get(handlers::form_config))
        .route("/api/health", get(handlers::health))
        .merge(submission)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let origin = if config.allowed_origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(&config.allowed_origin).map_err(|_| {
            PortalError::Config(format!("invalid CORS origin '{}'", config.allowed_origin))
        })?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            RETRY_AFTER,
            HeaderName::from_static(X_RATELIMIT_LIMIT),
            HeaderName::from_static(X_RATELIMIT_REMAINING),
            HeaderName::from_static(X_RATELIMIT_RESET),
        ])
        .max_age(CORS_MAX_AGE))
}
