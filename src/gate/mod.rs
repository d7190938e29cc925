//! Admission gate in front of the public submission endpoint.
//!
//! The gate turns request metadata into a client key, asks the
//! [`RateLimiter`] for a decision and shapes the HTTP contract around it:
//! denials become `429` with `Retry-After` and the `X-RateLimit-*` triad,
//! admitted requests carry the same triad on their eventual response.

mod client_key;

pub use client_key::{ClientKeyResolver, ForwardedTrust, IpNetwork, UNKNOWN_CLIENT};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::error::{PortalError, Result};
use crate::ratelimit::{Decision, RateLimiter, SharedClock};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// A request that passed the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// The key the decision was made for
    pub client: String,
    /// Post-increment limiter state
    pub decision: Decision,
}

impl Admission {
    /// Write the `X-RateLimit-*` triad onto a response.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static(X_RATELIMIT_LIMIT),
            HeaderValue::from(self.decision.limit),
        );
        headers.insert(
            HeaderName::from_static(X_RATELIMIT_REMAINING),
            HeaderValue::from(self.decision.remaining),
        );
        headers.insert(
            HeaderName::from_static(X_RATELIMIT_RESET),
            HeaderValue::from(self.decision.reset_at),
        );
    }
}

/// Bridges inbound requests to the rate limiter.
pub struct AdmissionGate {
    limiter: Arc<RateLimiter<SharedClock>>,
    resolver: ClientKeyResolver,
}

impl AdmissionGate {
    pub fn new(limiter: Arc<RateLimiter<SharedClock>>, resolver: ClientKeyResolver) -> Self {
        Self { limiter, resolver }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter<SharedClock>> {
        &self.limiter
    }

    pub fn resolver(&self) -> &ClientKeyResolver {
        &self.resolver
    }

    /// Decide whether a request may proceed.
    ///
    /// Denials are reported as [`PortalError::RateLimitExceeded`] with the
    /// metadata a client needs to schedule a retry.
    pub fn admit(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Result<Admission> {
        let client = self.resolver.resolve(headers, peer);
        let now_ms = self.limiter.now_ms();
        let decision = self.limiter.decide_at(&client, now_ms);

        if decision.allowed {
            debug!(
                client = %client,
                remaining = decision.remaining,
                reset_at = decision.reset_at,
                "Request admitted"
            );
            return Ok(Admission { client, decision });
        }

        let retry_after_secs = decision.retry_after_secs(now_ms);
        warn!(
            client = %client,
            reset_at = decision.reset_at,
            retry_after_secs,
            "Rate limit exceeded"
        );

        Err(PortalError::RateLimitExceeded {
            client,
            limit: decision.limit,
            reset_at: decision.reset_at,
            retry_after_secs,
        })
    }
}

/// Axum middleware running every request through the [`AdmissionGate`].
///
/// The peer address comes from `ConnectInfo<SocketAddr>` when the server was
/// started with connect info; otherwise only headers are available. The
/// [`Admission`] is inserted into request extensions for the handler.
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let admission = match gate.admit(request.headers(), peer) {
        Ok(admission) => admission,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(admission.clone());
    let mut response = next.run(request).await;
    admission.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimitConfig, ManualClock};
    use std::time::Duration;

    fn gate(clock: &ManualClock, max: u32) -> AdmissionGate {
        let shared: SharedClock = Arc::new(clock.clone());
        let limiter = RateLimiter::with_clock(
            LimitConfig::new(max, Duration::from_secs(300)),
            shared,
        );
        AdmissionGate::new(Arc::new(limiter), ClientKeyResolver::default())
    }

    fn forwarded(ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        headers
    }

    #[test]
    fn test_admit_reports_remaining() {
        let clock = ManualClock::new(1_000);
        let gate = gate(&clock, 5);

        let admission = gate.admit(&forwarded("1.2.3.4"), None).unwrap();

        assert_eq!(admission.client, "1.2.3.4");
        assert_eq!(admission.decision.remaining, 4);
        assert_eq!(admission.decision.reset_at, 301_000);
    }

    #[test]
    fn test_deny_carries_retry_metadata() {
        let clock = ManualClock::new(0);
        let gate = gate(&clock, 1);
        gate.admit(&forwarded("1.2.3.4"), None).unwrap();

        clock.set(270_000);
        match gate.admit(&forwarded("1.2.3.4"), None) {
            Err(PortalError::RateLimitExceeded {
                client,
                limit,
                reset_at,
                retry_after_secs,
            }) => {
                assert_eq!(client, "1.2.3.4");
                assert_eq!(limit, 1);
                assert_eq!(reset_at, 300_000);
                assert_eq!(retry_after_secs, 30);
            }
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_clients_share_a_bucket() {
        let clock = ManualClock::new(0);
        let gate = gate(&clock, 2);

        assert!(gate.admit(&HeaderMap::new(), None).is_ok());
        assert!(gate.admit(&HeaderMap::new(), None).is_ok());
        assert!(gate.admit(&HeaderMap::new(), None).is_err());
        assert!(gate.limiter().entry(UNKNOWN_CLIENT).is_some());
    }

    #[test]
    fn test_apply_headers() {
        let admission = Admission {
            client: "1.2.3.4".to_string(),
            decision: Decision {
                allowed: true,
                remaining: 3,
                reset_at: 42,
                limit: 5,
            },
        };
        let mut headers = HeaderMap::new();

        admission.apply_headers(&mut headers);

        assert_eq!(headers[X_RATELIMIT_LIMIT], "5");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "3");
        assert_eq!(headers[X_RATELIMIT_RESET], "42");
    }
}
