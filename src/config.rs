//! Configuration management for reportgate.
//!
//! Sources, lowest precedence first: built-in defaults, an optional YAML
//! file, `REPORTGATE__SECTION__KEY` environment variables, and finally the
//! portal's legacy `DASHBOARD_API_URL` / `FORMS_DOMAIN` variables.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PortalError, Result};
use crate::gate::{ClientKeyResolver, ForwardedTrust, IpNetwork};
use crate::ratelimit::{LimitConfig, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

const ENV_PREFIX: &str = "REPORTGATE";
const LEGACY_DASHBOARD_URL: &str = "DASHBOARD_API_URL";
const LEGACY_FORMS_DOMAIN: &str = "FORMS_DOMAIN";

/// Main configuration for the reportgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream dashboard configuration
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// CORS configuration for the public submission endpoint
    #[serde(default)]
    pub cors: CorsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Upstream dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Base URL of the dashboard API; proxy routes answer 503 without it
    #[serde(default)]
    pub base_url: Option<String>,

    /// Timeout for relayed requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for the dashboard health check in seconds
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Largest legacy report upload relayed to the dashboard
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout(),
            health_timeout_secs: default_health_timeout(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

fn default_health_timeout() -> u64 {
    5
}

/// Room for several 10 MB attachments plus the form fields.
fn default_body_limit() -> usize {
    50 * 1024 * 1024
}

impl DashboardConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Submissions admitted per client per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// When to believe `X-Forwarded-For` / `X-Real-IP`
    #[serde(default)]
    pub forwarded_trust: ForwardedTrust,

    /// Proxy networks whose forwarded headers are trusted under `proxies`
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            forwarded_trust: ForwardedTrust::default(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

impl RateLimitingConfig {
    /// The limiter policy.
    pub fn limit(&self) -> LimitConfig {
        LimitConfig::new(self.max_requests, Duration::from_secs(self.window_secs))
    }

    /// Build the client key resolver, parsing trusted proxy networks.
    pub fn key_resolver(&self) -> Result<ClientKeyResolver> {
        let proxies = self
            .trusted_proxies
            .iter()
            .map(|s| s.parse::<IpNetwork>())
            .collect::<Result<Vec<_>>>()?;
        Ok(ClientKeyResolver::new(self.forwarded_trust, proxies))
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Value for `Access-Control-Allow-Origin`; `*` allows any origin
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
        }
    }
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PortalConfig {
    /// Load configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path).format(::config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("rate_limiting.trusted_proxies"),
        );

        let mut config: PortalConfig = builder.build()?.try_deserialize()?;
        config.apply_legacy_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PortalConfig = serde_yaml::from_str(yaml)
            .map_err(|e| PortalError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the portal's legacy environment variables on top of everything else.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(LEGACY_DASHBOARD_URL).filter(|v| !v.is_empty()) {
            self.dashboard.base_url = Some(url);
        }
        if let Some(origin) = lookup(LEGACY_FORMS_DOMAIN).filter(|v| !v.is_empty()) {
            self.cors.allowed_origin = origin;
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.max_requests == 0 {
            return Err(PortalError::Config(
                "rate_limiting.max_requests must be greater than zero".to_string(),
            ));
        }
        if self.dashboard.body_limit_bytes == 0 {
            return Err(PortalError::Config(
                "dashboard.body_limit_bytes must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.window_secs == 0 {
            return Err(PortalError::Config(
                "rate_limiting.window_secs must be greater than zero".to_string(),
            ));
        }
        self.rate_limiting.key_resolver()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PortalConfig::default();

        assert_eq!(config.server.listen_addr, "0.0.0.0:3000".parse().unwrap());
        assert!(config.dashboard.base_url.is_none());
        assert_eq!(config.dashboard.body_limit_bytes, 50 * 1024 * 1024);
        assert_eq!(config.rate_limiting.window_secs, 300);
        assert_eq!(config.rate_limiting.max_requests, 5);
        assert_eq!(config.rate_limiting.forwarded_trust, ForwardedTrust::Always);
        assert_eq!(config.cors.allowed_origin, "*");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  listen_addr: 127.0.0.1:8088
dashboard:
  base_url: https://dashboard.example.com
  body_limit_bytes: 1048576
rate_limiting:
  max_requests: 10
  forwarded_trust: proxies
  trusted_proxies:
    - 10.0.0.0/8
    - 127.0.0.1
logging:
  format: json
"#;
        let config = PortalConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.listen_addr.port(), 8088);
        assert_eq!(config.dashboard.base_url.as_deref(), Some("https://dashboard.example.com"));
        assert_eq!(config.dashboard.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.dashboard.body_limit_bytes, 1024 * 1024);
        assert_eq!(config.rate_limiting.limit(), LimitConfig::new(10, Duration::from_secs(300)));
        assert_eq!(config.logging.format, LogFormat::Json);

        let resolver = config.rate_limiting.key_resolver().unwrap();
        assert_eq!(resolver.trust(), ForwardedTrust::TrustedProxies);
    }

    #[test]
    fn test_rejects_zero_limit() {
        let result = PortalConfig::from_yaml("rate_limiting:\n  max_requests: 0\n");
        assert!(matches!(result, Err(PortalError::Config(_))));

        let result = PortalConfig::from_yaml("rate_limiting:\n  window_secs: 0\n");
        assert!(matches!(result, Err(PortalError::Config(_))));

        let result = PortalConfig::from_yaml("dashboard:\n  body_limit_bytes: 0\n");
        assert!(matches!(result, Err(PortalError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_proxy_network() {
        let yaml = "rate_limiting:\n  trusted_proxies: [\"10.0.0.0/40\"]\n";
        assert!(PortalConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_legacy_env_overrides() {
        let mut config = PortalConfig::default();
        config.apply_legacy_env(|name| match name {
            "DASHBOARD_API_URL" => Some("http://dashboard:4000".to_string()),
            "FORMS_DOMAIN" => Some("https://forms.example.com".to_string()),
            _ => None,
        });

        assert_eq!(config.dashboard.base_url.as_deref(), Some("http://dashboard:4000"));
        assert_eq!(config.cors.allowed_origin, "https://forms.example.com");
    }

    #[test]
    fn test_legacy_env_ignores_empty_values() {
        let mut config = PortalConfig::default();
        config.apply_legacy_env(|_| Some(String::new()));

        assert!(config.dashboard.base_url.is_none());
        assert_eq!(config.cors.allowed_origin, "*");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("reportgate-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "rate_limiting:\n  max_requests: 7\n").unwrap();

        let config = PortalConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.unwrap().rate_limiting.max_requests, 7);
    }
}
