//! Core fixed-window rate limiter implementation.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::store::{RateLimitEntry, RateLimitStore};

/// Default number of admitted requests per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 5;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Configuration for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests admitted in one window
    pub max_requests: u32,
    /// Length of a window
    pub window: Duration,
}

impl LimitConfig {
    /// Create a new limit.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    fn window_ms(&self) -> u64 {
        self.window.as_millis().min(u64::MAX as u128) as u64
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

/// The outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Epoch-ms instant at which the window ends
    pub reset_at: u64,
    /// Configured maximum per window
    pub limit: u32,
}

impl Decision {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_at.saturating_sub(now_ms).div_ceil(1000)
    }
}

/// Fixed-window limiter keyed by client.
///
/// Counts are kept per key in non-overlapping windows opened by each key's
/// first request. Bursts of up to twice the limit are possible across a
/// window boundary.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter<C: Clock = SystemClock> {
    config: LimitConfig,
    clock: C,
    /// All per-key state; sweep and check-and-increment share this lock
    store: Mutex<RateLimitStore>,
}

impl RateLimiter<SystemClock> {
    /// Create a new rate limiter on the wall clock.
    pub fn new(config: LimitConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a new rate limiter driven by `clock`.
    pub fn with_clock(config: LimitConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            store: Mutex::new(RateLimitStore::new()),
        }
    }

    /// The configured policy.
    pub fn config(&self) -> LimitConfig {
        self.config
    }

    /// Current time according to the limiter's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Check and count a request for `key` at the clock's current time.
    pub fn decide(&self, key: &str) -> Decision {
        self.decide_at(key, self.clock.now_ms())
    }

    /// Check and count a request for `key` at `now_ms`.
    pub fn decide_at(&self, key: &str, now_ms: u64) -> Decision {
        let max = self.config.max_requests;
        let mut store = self.store.lock();

        let swept = store.sweep(now_ms);
        if swept > 0 {
            debug!(swept, remaining_keys = store.len(), "Swept expired rate limit entries");
        }

        let decision = match store.get(key).copied() {
            Some(entry) if !entry.is_expired(now_ms) => {
                if entry.count >= max {
                    Decision {
                        allowed: false,
                        remaining: 0,
                        reset_at: entry.reset_at,
                        limit: max,
                    }
                } else {
                    let count = entry.count + 1;
                    store.set(key, RateLimitEntry { count, ..entry });
                    Decision {
                        allowed: true,
                        remaining: max - count,
                        reset_at: entry.reset_at,
                        limit: max,
                    }
                }
            }
            _ => self.open_window(&mut store, key, now_ms),
        };

        trace!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            reset_at = decision.reset_at,
            "Rate limit decision"
        );

        decision
    }

    fn open_window(&self, store: &mut RateLimitStore, key: &str, now_ms: u64) -> Decision {
        let max = self.config.max_requests;
        if max == 0 {
            // Nothing is ever admitted; keep no state.
            return Decision {
                allowed: false,
                remaining: 0,
                reset_at: now_ms.saturating_add(self.config.window_ms()),
                limit: 0,
            };
        }

        let entry = RateLimitEntry::open(now_ms, self.config.window_ms());
        debug!(key = %key, reset_at = entry.reset_at, "Opening rate limit window");
        store.set(key, entry);

        Decision {
            allowed: true,
            remaining: max - 1,
            reset_at: entry.reset_at,
            limit: max,
        }
    }

    /// Remove expired entries as of the clock's current time.
    pub fn sweep(&self) -> usize {
        let now_ms = self.clock.now_ms();
        self.store.lock().sweep(now_ms)
    }

    /// Snapshot of the entry for `key`, if one is tracked.
    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.store.lock().get(key).copied()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store.lock().len()
    }

    /// Clear all state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.lock().clear();
    }
}
