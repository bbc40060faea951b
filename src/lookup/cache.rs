//! TTL cache of lookup outcomes keyed by hostname.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use crate::observability::metrics;

/// Value stored for a host the lookup service reported as unknown.
pub const NOT_FOUND_SENTINEL: &str = "NOT FOUND";

/// A cached lookup outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Encoded domain record, redirect target, or [`NOT_FOUND_SENTINEL`].
    pub value: String,
    /// The entry is stale once `now >= expires_at`.
    pub expires_at: Instant,
    /// `value` is a redirect URL rather than a domain record.
    pub is_redirect: bool,
}

impl CacheEntry {
    /// Check whether the entry is still usable at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Check whether this entry records a not-found answer.
    pub fn is_not_found(&self) -> bool {
        !self.is_redirect && self.value == NOT_FOUND_SENTINEL
    }
}

/// Snapshot of cache contents for the admin API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub entries: usize,
    pub fresh: usize,
    pub stale: usize,
    pub not_found: usize,
    pub redirects: usize,
}

/// Hostname-keyed cache guarded by a single reader/writer lock.
///
/// Expiry is not evaluated here; callers compare `expires_at` against their
/// own clock and remove stale entries explicitly.
#[derive(Debug, Default)]
pub struct TtlCache {
    inner: RwLock<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for `key`, fresh or not.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert or replace the entry for `key`.
    pub fn set(&self, key: &str, value: impl Into<String>, expires_at: Instant, is_redirect: bool) {
        let len = {
            let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            map.insert(
                key.to_string(),
                CacheEntry {
                    value: value.into(),
                    expires_at,
                    is_redirect,
                },
            );
            map.len()
        };
        metrics::record_cache_size(len);
    }

    /// Remove the entry for `key`. Returns whether one was present.
    pub fn remove(&self, key: &str) -> bool {
        let (removed, len) = {
            let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            (map.remove(key).is_some(), map.len())
        };
        metrics::record_cache_size(len);
        removed
    }

    /// Remove the entry for `key` only if it is still stale at `now`.
    ///
    /// A fresh entry stored by a concurrent lookup since the caller's read is
    /// kept.
    pub fn remove_if_stale(&self, key: &str, now: Instant) -> bool {
        let (removed, len) = {
            let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let stale = map.get(key).is_some_and(|entry| !entry.is_fresh(now));
            if stale {
                map.remove(key);
            }
            (stale, map.len())
        };
        metrics::record_cache_size(len);
        removed
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let n = map.len();
            map.clear();
            n
        };
        metrics::record_cache_size(0);
        removed
    }

    /// Count entries, stale ones included.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summarize the cache as seen at `now`.
    pub fn summary(&self, now: Instant) -> CacheSummary {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut summary = CacheSummary {
            entries: map.len(),
            ..CacheSummary::default()
        };
        for entry in map.values() {
            if entry.is_fresh(now) {
                summary.fresh += 1;
            } else {
                summary.stale += 1;
            }
            if entry.is_redirect {
                summary.redirects += 1;
            } else if entry.is_not_found() {
                summary.not_found += 1;
            }
        }
        summary
    }
}
