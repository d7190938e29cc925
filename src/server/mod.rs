//! HTTP server for the portal API.

mod handlers;
mod routes;

pub use routes::{build_router, SUBMIT_CASE_PATH};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tracing::{error, info, warn};

use crate::config::PortalConfig;
use crate::dashboard::{Dashboard, HttpDashboard};
use crate::error::{PortalError, Result};
use crate::gate::{AdmissionGate, ForwardedTrust};
use crate::ratelimit::{RateLimiter, SharedClock, SystemClock};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Rate-limit gate for the public submission endpoint
    pub gate: Arc<AdmissionGate>,
    /// Upstream dashboard, absent when no URL is configured
    pub dashboard: Option<Arc<dyn Dashboard>>,
    /// Process start, for the health report
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gate: Arc<AdmissionGate>, dashboard: Option<Arc<dyn Dashboard>>) -> Self {
        Self {
            gate,
            dashboard,
            started_at: Instant::now(),
        }
    }

    /// The dashboard, or the error every proxy route reports without one.
    pub fn dashboard(&self) -> Result<&Arc<dyn Dashboard>> {
        self.dashboard
            .as_ref()
            .ok_or(PortalError::ConfigurationMissing("Dashboard API URL"))
    }
}

/// The portal HTTP server.
pub struct PortalServer {
    /// Address to bind to
    addr: SocketAddr,
    router: Router,
}

impl PortalServer {
    /// Wire limiter, gate and dashboard client from configuration.
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let limits = &config.rate_limiting;
        let clock: SharedClock = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimiter::with_clock(limits.limit(), clock));
        let resolver = limits.key_resolver()?;

        info!(
            max_requests = limits.max_requests,
            window_secs = limits.window_secs,
            forwarded_trust = ?resolver.trust(),
            "Rate limiter initialized"
        );
        if resolver.trust() == ForwardedTrust::Always {
            warn!("Forwarded client address headers are trusted from any peer");
        }

        let gate = Arc::new(AdmissionGate::new(limiter, resolver));

        let dashboard: Option<Arc<dyn Dashboard>> = match &config.dashboard.base_url {
            Some(url) => {
                let client = HttpDashboard::new(
                    url,
                    config.dashboard.request_timeout(),
                    config.dashboard.health_timeout(),
                )?;
                info!(dashboard_url = %url, "Dashboard client configured");
                Some(Arc::new(client))
            }
            None => {
                warn!("No dashboard URL configured; proxy routes will answer 503");
                None
            }
        };

        let state = AppState::new(gate, dashboard);
        let router = build_router(state, config)?;

        Ok(Self {
            addr: config.server.listen_addr,
            router,
        })
    }

    /// Create a server around an already built router.
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self { addr, router }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            PortalError::Io(e)
        })
    }
}
