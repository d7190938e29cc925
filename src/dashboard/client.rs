//! `reqwest`-backed dashboard client.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Dashboard, UpstreamReply};
use crate::error::{PortalError, Result};
use crate::submission::CaseSubmission;

const JSON: &str = "application/json";

/// Dashboard client speaking HTTP.
#[derive(Debug, Clone)]
pub struct HttpDashboard {
    client: Client,
    base_url: Url,
    health_timeout: Duration,
}

impl HttpDashboard {
    /// Create a client for the dashboard at `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration, health_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PortalError::Config(format!("invalid dashboard URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PortalError::Config(format!(
                "dashboard URL '{}' cannot be used as a base",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(client_setup_error)?;

        Ok(Self {
            client,
            base_url,
            health_timeout,
        })
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn relay(&self, request: RequestBuilder) -> Result<UpstreamReply> {
        let response = request.header(ACCEPT, JSON).send().await.map_err(|e| {
            warn!(error = %e, "Dashboard request failed");
            PortalError::Upstream(e)
        })?;

        let status = response.status();
        let body = response.json::<Value>().await?;
        debug!(status = %status, "Dashboard replied");

        Ok(UpstreamReply::new(status, body))
    }
}

/// Failing to build the client is a local setup problem, not an upstream one.
fn client_setup_error(err: reqwest::Error) -> PortalError {
    PortalError::Config(format!("failed to build dashboard HTTP client: {}", err))
}

#[async_trait]
impl Dashboard for HttpDashboard {
    fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    async fn submit_case(&self, case: &CaseSubmission) -> Result<UpstreamReply> {
        let url = self.endpoint(&["api", "public", "cases", "submit"]);
        self.relay(self.client.post(url).json(case)).await
    }

    async fn submit_report(&self, body: Bytes, content_type: Option<String>) -> Result<UpstreamReply> {
        let url = self.endpoint(&["api", "public", "reports", "submit"]);
        let content_type = content_type
            .filter(|ct| ct.contains("multipart/form-data"))
            .unwrap_or_else(|| JSON.to_string());

        self.relay(self.client.post(url).header(CONTENT_TYPE, content_type).body(body))
            .await
    }

    async fn track_report(&self, tracking_id: &str, password: Option<&str>) -> Result<UpstreamReply> {
        let mut url = self.endpoint(&["api", "reports", "track", tracking_id]);
        if let Some(password) = password {
            url.query_pairs_mut().append_pair("password", password);
        }

        self.relay(self.client.get(url).header(CONTENT_TYPE, JSON)).await
    }

    async fn form_config(&self, subdomain: &str) -> Result<UpstreamReply> {
        let url = self.endpoint(&["api", "public", "forms", subdomain, "config"]);
        self.relay(self.client.get(url).header(CONTENT_TYPE, JSON)).await
    }

    async fn health_check(&self) -> bool {
        let url = self.endpoint(&["api", "health"]);
        match self.client.get(url).timeout(self.health_timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Dashboard health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboard(base: &str) -> HttpDashboard {
        HttpDashboard::new(base, Duration::from_secs(10), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let dashboard = dashboard("https://dashboard.example.com");
        assert_eq!(
            dashboard.endpoint(&["api", "public", "cases", "submit"]).as_str(),
            "https://dashboard.example.com/api/public/cases/submit"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let dashboard = dashboard("https://example.com/dashboard/");
        assert_eq!(
            dashboard.endpoint(&["api", "health"]).as_str(),
            "https://example.com/dashboard/api/health"
        );
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let dashboard = dashboard("https://example.com");
        assert_eq!(
            dashboard.endpoint(&["api", "reports", "track", "abc/../x y"]).as_str(),
            "https://example.com/api/reports/track/abc%2F..%2Fx%20y"
        );
    }

    #[test]
    fn test_rejects_invalid_base() {
        let err = HttpDashboard::new("not a url", Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(err, Err(PortalError::Config(_))));

        let err = HttpDashboard::new("mailto:ops@example.com", Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(err, Err(PortalError::Config(_))));
    }

    #[test]
    fn test_client_setup_failure_is_a_config_error() {
        let err = Client::new().get("not a url").build().unwrap_err();
        assert!(matches!(
            client_setup_error(err),
            PortalError::Config(msg) if msg.contains("dashboard HTTP client")
        ));
    }

    #[tokio::test]
    async fn test_unreachable_dashboard_is_an_upstream_error() {
        let dashboard = dashboard("http://127.0.0.1:1");

        let result = dashboard.track_report("WB-1", None).await;
        assert!(matches!(result, Err(PortalError::Upstream(_))));
        assert!(!dashboard.health_check().await);
    }
}
