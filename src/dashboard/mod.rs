//! Upstream dashboard API.
//!
//! The dashboard owns reports, tracking ids and company form configuration.
//! This module only relays: replies come back as a status plus opaque JSON.

mod client;

pub use client::HttpDashboard;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::Value;

use crate::error::Result;
use crate::submission::CaseSubmission;

/// A relayed dashboard reply.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Value,
}

impl UpstreamReply {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// The `error` string of the body, if it carries one.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

/// Trait for dashboard clients.
///
/// This abstracts over the HTTP client so handlers can be exercised against
/// an in-process fake.
#[async_trait]
pub trait Dashboard: Send + Sync {
    /// Base URL, for diagnostics.
    fn base_url(&self) -> &str;

    /// Forward a validated case submission.
    async fn submit_case(&self, case: &CaseSubmission) -> Result<UpstreamReply>;

    /// Forward a raw report submission body (JSON or multipart).
    async fn submit_report(&self, body: Bytes, content_type: Option<String>) -> Result<UpstreamReply>;

    /// Look up a report by tracking id.
    async fn track_report(&self, tracking_id: &str, password: Option<&str>) -> Result<UpstreamReply>;

    /// Fetch the public form configuration of a company.
    async fn form_config(&self, subdomain: &str) -> Result<UpstreamReply>;

    /// Whether the dashboard answers its health endpoint successfully.
    async fn health_check(&self) -> bool;
}
