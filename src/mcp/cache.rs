//! Time-to-live cache for resource reads.
//!
//! Entries expire lazily: [`ResourceCache::get`] treats an expired entry as
//! absent but leaves it in place. Expired entries are physically removed by
//! [`ResourceCache::cleanup`], which owns no timer; scheduling periodic sweeps
//! is up to the embedding application.
//!
//! The cache knows resource keys, never the state behind them. Mutating tools
//! tell the dispatcher to call [`ResourceCache::invalidate_state_dependent`],
//! which drops a fixed set of keys whose contents derive from release state.
//!
//! A single reader/writer lock guards the entry map, the TTL table, and the
//! enabled flag. Lookups share the lock; every mutation takes it exclusively.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

/// Current release state.
pub const STATE_URI: &str = "release://state";
/// Server configuration.
pub const CONFIG_URI: &str = "release://config";
/// Commits included in the current release.
pub const COMMITS_URI: &str = "release://commits";
/// Generated changelog.
pub const CHANGELOG_URI: &str = "release://changelog";
/// Risk report for the current release.
pub const RISK_URI: &str = "release://risk";

/// Keys whose contents derive from mutable release state.
pub const STATE_DEPENDENT_URIS: [&str; 4] = [STATE_URI, COMMITS_URI, CHANGELOG_URI, RISK_URI];

/// TTL applied to keys without a registered TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// The built-in per-key TTL table.
#[must_use]
pub fn default_ttls() -> HashMap<String, Duration> {
    [
        (STATE_URI, Duration::from_secs(5)),
        (CONFIG_URI, Duration::from_secs(300)),
        (COMMITS_URI, Duration::from_secs(60)),
        (CHANGELOG_URI, Duration::from_secs(60)),
        (RISK_URI, Duration::from_secs(30)),
    ]
    .into_iter()
    .map(|(key, ttl)| (key.to_string(), ttl))
    .collect()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    // `None` when the TTL reaches past any representable instant.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at
            .map_or(Duration::MAX, |at| at.saturating_duration_since(now))
    }
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    ttls: HashMap<String, Duration>,
    default_ttl: Duration,
    enabled: bool,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    /// Resource key.
    pub key: String,
    /// Time left before expiry; zero once expired, `Duration::MAX` for an
    /// entry that never expires.
    pub remaining: Duration,
    /// Whether the entry has already expired.
    pub expired: bool,
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Whether the cache is accepting entries.
    pub enabled: bool,
    /// Number of stored entries, expired ones included.
    pub total_entries: usize,
    /// Per-entry details, sorted by key.
    pub entries: Vec<EntryStats>,
}

/// Per-key TTL cache of resource read results.
#[derive(Debug)]
pub struct ResourceCache {
    inner: RwLock<Inner>,
}

impl ResourceCache {
    /// Creates an enabled cache with the built-in TTL table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttls(DEFAULT_TTL, default_ttls())
    }

    /// Creates an enabled cache with an explicit default TTL and TTL table.
    #[must_use]
    pub fn with_ttls(default_ttl: Duration, ttls: HashMap<String, Duration>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                ttls,
                default_ttl,
                enabled: true,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value for `key`.
    ///
    /// Returns `None` if the cache is disabled, the key is absent, or the
    /// entry has expired. Expired entries are not removed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let inner = self.read();
        if !inner.enabled {
            return None;
        }
        let entry = inner.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Stores `value` under `key` with the key's TTL, replacing any prior entry.
    ///
    /// A no-op while disabled, and for `null` values.
    pub fn set(&self, key: &str, value: Value) {
        if value.is_null() {
            return;
        }
        let mut inner = self.write();
        if !inner.enabled {
            return;
        }
        let ttl = inner.ttls.get(key).copied().unwrap_or(inner.default_ttl);
        let entry = CacheEntry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        inner.entries.insert(key.to_string(), entry);
    }

    /// Registers a TTL for `key`. Applies to entries stored afterwards.
    pub fn set_ttl(&self, key: &str, ttl: Duration) {
        self.write().ttls.insert(key.to_string(), ttl);
    }

    /// Returns the TTL that a new entry under `key` would get.
    #[must_use]
    pub fn ttl_for(&self, key: &str) -> Duration {
        let inner = self.read();
        inner.ttls.get(key).copied().unwrap_or(inner.default_ttl)
    }

    /// Removes the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.write().entries.remove(key);
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) {
        self.write().entries.clear();
    }

    /// Removes the entries derived from release state and returns how many
    /// were present. Other keys, such as configuration, are untouched.
    pub fn invalidate_state_dependent(&self) -> usize {
        let mut inner = self.write();
        STATE_DEPENDENT_URIS
            .iter()
            .filter(|key| inner.entries.remove(**key).is_some())
            .count()
    }

    /// Enables or disables the cache. Disabling also drops every entry.
    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.write();
        inner.enabled = enabled;
        if !enabled {
            inner.entries.clear();
        }
    }

    /// Returns whether the cache is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.read().enabled
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut inner = self.write();
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        before - inner.entries.len()
    }

    /// Returns a snapshot of the cache without evicting anything.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.read();
        let now = Instant::now();
        let mut entries: Vec<EntryStats> = inner
            .entries
            .iter()
            .map(|(key, entry)| EntryStats {
                key: key.clone(),
                remaining: entry.remaining(now),
                expired: entry.is_expired(now),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            enabled: inner.enabled,
            total_entries: inner.entries.len(),
            entries,
        }
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}
