//! Request handlers.
//!
//! Everything except `submit_case` is a thin relay: the dashboard's status
//! and JSON body are passed back unchanged.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::error::{PortalError, Result};
use crate::gate::Admission;
use crate::submission::{self, CaseSubmission};

const FORM_CONFIG_CACHE: &str = "public, max-age=300, s-maxage=300";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// `OPTIONS /api/public/cases/submit`; the CORS layer supplies the headers.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// `POST /api/public/cases/submit`
///
/// Runs behind the admission gate. Validates the case and forwards it to the
/// dashboard, mapping dashboard failures onto the portal's error contract.
pub async fn submit_case(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let request_id = Uuid::new_v4();

    let case: CaseSubmission = serde_json::from_slice(&body)
        .map_err(|_| PortalError::InvalidRequest("Invalid JSON in request body".to_string()))?;

    let case = case.validate().map_err(|errors| {
        let details = submission::describe(&errors);
        debug!(%request_id, client = %admission.client, details = %details, "Case validation failed");
        PortalError::Validation(details)
    })?;

    let dashboard = state.dashboard().map_err(PortalError::in_case_submission)?;
    let reply = dashboard.submit_case(&case).await.map_err(|e| {
        error!(%request_id, error = %e, "Failed to submit case");
        PortalError::SubmissionFailed(e.to_string())
    })?;

    if reply.status.is_success() {
        info!(
            %request_id,
            client = %admission.client,
            remaining = admission.decision.remaining,
            "Case submitted"
        );
        return Ok((StatusCode::CREATED, Json(reply.body)));
    }

    warn!(%request_id, status = %reply.status, "Dashboard rejected case submission");
    match reply.status {
        StatusCode::NOT_FOUND => Err(PortalError::CompanyNotFound),
        StatusCode::BAD_REQUEST => match reply.error_message() {
            Some(message) => Err(PortalError::InvalidRequest(message.to_string())),
            None => Err(PortalError::SubmissionFailed(reply.status.to_string())),
        },
        status => Err(PortalError::SubmissionFailed(status.to_string())),
    }
}

/// `POST /api/submit`: legacy report submission, relayed as-is.
pub async fn submit_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let dashboard = state.dashboard()?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let reply = dashboard.submit_report(body, content_type).await.map_err(|e| {
        error!(error = %e, "Failed to submit report");
        e
    })?;
    Ok((reply.status, Json(reply.body)))
}

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub password: Option<String>,
}

/// `GET /api/track/{tracking_id}`
pub async fn track_report(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    Query(query): Query<TrackQuery>,
) -> Result<(StatusCode, Json<Value>)> {
    let dashboard = state.dashboard()?;
    let password = query.password.as_deref().filter(|p| !p.is_empty());

    let reply = dashboard
        .track_report(&tracking_id, password)
        .await
        .map_err(|e| {
            error!(tracking_id = %tracking_id, error = %e, "Failed to track report");
            e
        })?;
    Ok((reply.status, Json(reply.body)))
}

/// `GET /api/config/{subdomain}`
pub async fn form_config(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> Result<Response> {
    let dashboard = state.dashboard()?;

    let reply = dashboard.form_config(&subdomain).await.map_err(|e| {
        error!(subdomain = %subdomain, error = %e, "Failed to fetch form config");
        e
    })?;
    Ok((reply.status, [(CACHE_CONTROL, FORM_CONFIG_CACHE)], Json(reply.body)).into_response())
}

/// `GET /api/health`
///
/// `200 healthy` when the dashboard answers its own health check,
/// `503 degraded` otherwise (including when no dashboard is configured).
pub async fn health(State(state): State<AppState>) -> Response {
    let dashboard_healthy = match &state.dashboard {
        Some(dashboard) => dashboard.health_check().await,
        None => false,
    };
    let dashboard_url = state
        .dashboard
        .as_ref()
        .map(|d| d.base_url().to_string())
        .unwrap_or_else(|| "not-configured".to_string());

    let (code, status) = if dashboard_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "dashboard_api": dashboard_healthy,
            "self": true,
        },
        "environment": {
            "dashboard_url": dashboard_url,
        },
        "rate_limiter": {
            "tracked_clients": state.gate.limiter().tracked_keys(),
        },
        "uptime": state.started_at.elapsed().as_secs_f64(),
    });

    (
        code,
        [(CACHE_CONTROL, NO_CACHE), (PRAGMA, "no-cache"), (EXPIRES, "0")],
        Json(body),
    )
        .into_response()
}
