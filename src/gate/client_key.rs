//! Client key derivation from request metadata.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::{PortalError, Result};

/// Key used when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// When proxy-supplied address headers are believed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForwardedTrust {
    /// Always use `X-Forwarded-For` / `X-Real-IP` when present
    #[default]
    #[serde(rename = "all")]
    Always,
    /// Use them only when the peer is a configured trusted proxy
    #[serde(rename = "proxies")]
    TrustedProxies,
    /// Ignore them and key on the peer address
    #[serde(rename = "none")]
    Never,
}

/// An IP network in CIDR notation, e.g. `10.0.0.0/8` or `::1/128`.
///
/// A bare address parses as a single-host network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    /// Whether `ip` falls inside this network.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PortalError::Config(format!("invalid trusted proxy network '{}'", s));

        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };
        let addr = IpAddr::from_str(addr).map_err(|_| invalid())?.to_canonical();
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }

        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Derives the rate-limit key for a request.
///
/// Precedence: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// transport peer, then [`UNKNOWN_CLIENT`]. The two headers are skipped
/// entirely when the [`ForwardedTrust`] policy does not cover the peer.
#[derive(Debug, Clone, Default)]
pub struct ClientKeyResolver {
    trust: ForwardedTrust,
    trusted_proxies: Vec<IpNetwork>,
}

impl ClientKeyResolver {
    pub fn new(trust: ForwardedTrust, trusted_proxies: Vec<IpNetwork>) -> Self {
        Self {
            trust,
            trusted_proxies,
        }
    }

    pub fn trust(&self) -> ForwardedTrust {
        self.trust
    }

    /// Resolve the client key from request headers and the peer address.
    ///
    /// Header values that do not parse as an address are ignored.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> String {
        if self.trusts_forwarded(peer) {
            if let Some(ip) = forwarded_for(headers).or_else(|| real_ip(headers)) {
                return ip;
            }
        }

        peer.map(|ip| ip.to_canonical().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }

    fn trusts_forwarded(&self, peer: Option<IpAddr>) -> bool {
        match self.trust {
            ForwardedTrust::Always => true,
            ForwardedTrust::Never => false,
            ForwardedTrust::TrustedProxies => peer
                .map(|ip| self.trusted_proxies.iter().any(|net| net.contains(ip)))
                .unwrap_or(false),
        }
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    parse_client_ip(value.split(',').next()?)
}

fn real_ip(headers: &HeaderMap) -> Option<String> {
    parse_client_ip(headers.get(X_REAL_IP)?.to_str().ok()?)
}

/// Accepts a bare address or `address:port`.
fn parse_client_ip(value: &str) -> Option<String> {
    let value = value.trim();
    let ip = value
        .parse::<IpAddr>()
        .or_else(|_| value.parse::<SocketAddr>().map(|addr| addr.ip()))
        .ok()?;
    Some(ip.to_canonical().to_string())
}
