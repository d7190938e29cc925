//! Per-client counter storage.

use std::collections::HashMap;

/// One client's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests admitted so far in the current window
    pub count: u32,
    /// Epoch-ms instant at which the window ends
    pub reset_at: u64,
}

impl RateLimitEntry {
    /// Open a fresh window at `now_ms` lasting `window_ms`.
    pub fn open(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at: now_ms.saturating_add(window_ms),
        }
    }

    /// Whether the window has elapsed as of `now_ms`.
    ///
    /// The window is still open at exactly `reset_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.reset_at < now_ms
    }
}

/// Mapping from client key to its current window.
///
/// The store does no locking of its own; the owning [`RateLimiter`] keeps it
/// behind a single mutex so check-and-increment stays atomic.
///
/// [`RateLimiter`]: super::RateLimiter
#[derive(Debug, Default)]
pub struct RateLimitStore {
    entries: HashMap<String, RateLimitEntry>,
}

impl RateLimitStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for `key`.
    pub fn get(&self, key: &str) -> Option<&RateLimitEntry> {
        self.entries.get(key)
    }

    /// Insert or overwrite the entry for `key`.
    pub fn set(&mut self, key: &str, entry: RateLimitEntry) {
        match self.entries.get_mut(key) {
            Some(existing) => *existing = entry,
            None => {
                self.entries.insert(key.to_string(), entry);
            }
        }
    }

    /// Remove every entry whose window ended before `now_ms`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now_ms));
        before - self.entries.len()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_absent_key() {
        let store = RateLimitStore::new();
        assert!(store.get("1.2.3.4").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let mut store = RateLimitStore::new();
        store.set("a", RateLimitEntry { count: 1, reset_at: 100 });
        store.set("a", RateLimitEntry { count: 3, reset_at: 100 });

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a"), Some(&RateLimitEntry { count: 3, reset_at: 100 }));
    }

    #[test]
    fn test_entry_open() {
        let entry = RateLimitEntry::open(1_000, 300_000);
        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_at, 301_000);
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = RateLimitEntry { count: 2, reset_at: 500 };
        assert!(!entry.is_expired(499));
        assert!(!entry.is_expired(500));
        assert!(entry.is_expired(501));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut store = RateLimitStore::new();
        store.set("old", RateLimitEntry { count: 5, reset_at: 100 });
        store.set("edge", RateLimitEntry { count: 1, reset_at: 200 });
        store.set("fresh", RateLimitEntry { count: 2, reset_at: 300 });

        let removed = store.sweep(200);

        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert_eq!(store.get("edge"), Some(&RateLimitEntry { count: 1, reset_at: 200 }));
        assert_eq!(store.get("fresh"), Some(&RateLimitEntry { count: 2, reset_at: 300 }));
    }

    #[test]
    fn test_sweep_empty_store() {
        let mut store = RateLimitStore::new();
        assert_eq!(store.sweep(u64::MAX), 0);
    }

    #[test]
    fn test_clear() {
        let mut store = RateLimitStore::new();
        store.set("a", RateLimitEntry::open(0, 10));
        store.set("b", RateLimitEntry::open(0, 10));

        store.clear();
        assert!(store.is_empty());
    }
}
