//! # Adaptive Cache
//!
//! Keyed cache-with-refresh engine that sits between callers and a slow,
//! rate-limited upstream. Callers supply the fetch function per call; the
//! cache decides whether the upstream needs to be called at all.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         AdaptiveCache<V> (Arc handle)                    │
//! │                                                                          │
//! │  ┌──────────────────┐   ┌────────────────────────────────────────────┐   │
//! │  │ PendingTable     │   │ Store  (one mutex)                         │   │
//! │  │ key ─► waiters   │──►│  segments ─► entries (Raw | Compressed)    │   │
//! │  │ (lock 1st)       │   │  KeyIndex, memory_bytes, logical tick      │   │
//! │  └──────────────────┘   └────────────────────────────────────────────┘   │
//! │                                                                          │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────────┐  │
//! │  │ NegativeCache    │   │ CircuitBreaker   │   │ CacheCounters        │  │
//! │  │ Bloom + expiries │   │ wraps fetch()    │   │ hits/misses/...      │  │
//! │  └──────────────────┘   └──────────────────┘   └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## `get_or_refresh` decision
//!
//! ```text
//!   entry valid, remaining > threshold * ttl ─────────► return value
//!   entry valid, inside refresh window       ─────────► return value + background refresh
//!   entry expired, within soft_ttl           ─────────► return stale + background refresh
//!   key negatively cached                    ─────────► Err(NegativeCached)
//!   fetch already in flight                  ─────────► wait for leader's result
//!   otherwise                                ─────────► fetch through breaker, store, wake waiters
//!                                                        (on failure: stale value if any,
//!                                                         else negative-cache + Err)
//! ```
//!
//! The pending check, the cache check, and leader registration happen under
//! the pending-table lock, so at most one upstream fetch runs per key.
//!
//! ## Lock Order
//!
//! `pending` before `store` before `negative`; no lock is held across an
//! `.await`.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use cacheshield::cache::{AdaptiveCache, RefreshOptions};
//! use cacheshield::config::CacheConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: AdaptiveCache<String> = AdaptiveCache::new(CacheConfig::default()).unwrap();
//!
//! let value = cache
//!     .get_or_refresh(
//!         "user:42",
//!         Some(Duration::from_secs(60)),
//!         || async { Ok("Ada".to_string()) },
//!         RefreshOptions::default(),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(value, "Ada");
//! assert_eq!(cache.get("user:42").as_deref(), Some("Ada"));
//! # }
//! ```

pub mod coalesce;
pub mod compress;
pub mod entry;
pub mod maintenance;
mod negative;
pub mod persist;
pub mod segment;
mod store;
pub mod ttl;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use coalesce::{PendingRequest, PendingTable};
pub use entry::{CacheEntry, StoredValue};
pub use maintenance::MaintenanceHandle;
pub use segment::{segment_for_key, Segment, DEFAULT_SEGMENT};
pub use ttl::AdaptiveTtl;

use crate::breaker::{CircuitBreaker, CircuitState, CircuitStats};
use crate::cache::coalesce::{LeaderGuard, Waiter};
use crate::cache::negative::NegativeCache;
use crate::cache::persist::{Snapshot, SnapshotEntry, SnapshotRecord};
use crate::cache::store::{Limits, Store};
use crate::config::CacheConfig;
use crate::ds::{BloomStats, KeyIndexStats};
use crate::error::{BoxError, CacheError, ConfigError, Result};
use crate::metrics::{snapshot, CacheCounters, MetricsReset, MetricsSnapshot, MetricsSnapshotProvider};

/// Per-call overrides for [`AdaptiveCache::get_or_refresh`].
///
/// `None` fields fall back to the cache configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefreshOptions {
    /// Fraction of the TTL below which a background refresh starts.
    pub refresh_threshold: Option<f64>,
    /// How long past expiry a stale value may still be served.
    pub soft_ttl: Option<Duration>,
}

impl RefreshOptions {
    pub fn refresh_threshold(mut self, threshold: f64) -> Self {
        self.refresh_threshold = Some(threshold);
        self
    }

    pub fn soft_ttl(mut self, soft_ttl: Duration) -> Self {
        self.soft_ttl = Some(soft_ttl);
        self
    }
}

/// Outcome of a store lookup on behalf of `get_or_refresh`.
enum Lookup<V> {
    Fresh(V),
    /// Inside the refresh window, or expired but within the soft TTL.
    Revalidate { value: V, stale: bool },
    /// No usable value; carries an expired value for graceful degradation.
    Missing(Option<V>),
}

enum Decision<V> {
    Serve(V),
    ServeAndRefresh(V),
    Wait(Waiter<V>),
    Lead { fallback: Option<V>, coalesced: bool },
    Reject(CacheError),
}

struct Shared<V> {
    config: CacheConfig,
    limits: Limits,
    adaptive: AdaptiveTtl,
    store: Mutex<Store<V>>,
    negative: Mutex<NegativeCache>,
    pending: PendingTable<V>,
    breaker: CircuitBreaker,
    counters: CacheCounters,
}

/// Adaptive caching and resilience core.
///
/// A cheap `Clone` handle; clones share the same entries, breaker, and
/// metrics.
pub struct AdaptiveCache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for AdaptiveCache<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> fmt::Debug for AdaptiveCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.shared.store.lock();
        f.debug_struct("AdaptiveCache")
            .field("len", &store.len())
            .field("memory_bytes", &store.memory_bytes())
            .field("policy", &self.shared.limits.policy)
            .finish_non_exhaustive()
    }
}

impl<V> AdaptiveCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a cache after validating `config`.
    pub fn new(config: CacheConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let limits = Limits {
            max_entries: config.max_entries,
            max_memory_bytes: config.max_memory_bytes(),
            segment_cap: config
                .segmentation
                .enabled
                .then_some(config.segmentation.max_entries_per_segment),
            policy: config.eviction_policy,
            lru_k: config.lru_k,
        };
        let shared = Shared {
            limits: limits.clone(),
            adaptive: AdaptiveTtl::new(config.adaptive_ttl.clone()),
            store: Mutex::new(Store::new(limits, config.segmentation.enabled)),
            negative: Mutex::new(NegativeCache::new(&config.negative_cache)),
            pending: PendingTable::new(),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            counters: CacheCounters::default(),
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// How long an expired entry is kept around for stale serving.
    fn grace(&self) -> Duration {
        self.shared.config.soft_ttl().unwrap_or_default()
    }

    fn negative_remaining(&self, key: &str, now: Instant) -> Option<Duration> {
        if !self.shared.config.negative_cache.enabled {
            return None;
        }
        self.shared.negative.lock().remaining(key, now)
    }

    // -----------------------------------------------------------------------
    // Point operations
    // -----------------------------------------------------------------------

    /// Returns a clone of the live value for `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let counters = &self.shared.counters;
        if self.negative_remaining(key, now).is_some() {
            counters.misses.incr();
            return None;
        }

        let grace = self.grace();
        let mut store = self.shared.store.lock();
        let expiry = store
            .get(key)
            .map(|entry| (entry.is_expired(now), entry.is_expired_past(now, grace)));
        match expiry {
            None => {
                counters.misses.incr();
                return None;
            },
            Some((true, past_grace)) => {
                if past_grace {
                    store.remove(key);
                }
                counters.misses.incr();
                return None;
            },
            Some((false, _)) => {},
        }

        let decoded = store.touch(key, now).map(|entry| entry.value.materialize());
        match decoded {
            Some(Ok(value)) => {
                counters.hits.incr();
                Some(value)
            },
            Some(Err(err)) => {
                store.remove(key);
                counters.errors.incr();
                counters.misses.incr();
                warn!(key, error = %err, "dropping undecodable entry");
                None
            },
            None => {
                counters.misses.incr();
                None
            },
        }
    }

    /// `true` when `key` holds an unexpired value. Records no access.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.shared
            .store
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Stores `value` under `key` with `ttl` (or the default TTL).
    ///
    /// Returns `false` when the value cannot be encoded or exceeds the whole
    /// memory budget; the failure is counted in `errors`.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let counters = &self.shared.counters;
        let encoded = match entry::encode(value, &self.shared.config.compression) {
            Ok(encoded) => encoded,
            Err(err) => {
                counters.errors.incr();
                warn!(key, error = %err, "failed to encode value");
                return false;
            },
        };
        if encoded.compression_failed {
            counters.errors.incr();
        }
        if encoded.size_bytes > self.shared.limits.max_memory_bytes {
            counters.errors.incr();
            warn!(
                key,
                size_bytes = encoded.size_bytes,
                max_memory_bytes = self.shared.limits.max_memory_bytes,
                "value larger than memory budget"
            );
            return false;
        }

        let base = ttl.unwrap_or_else(|| self.shared.config.default_ttl());
        let now = Instant::now();
        let outcome = self.shared.store.lock().insert(
            key,
            encoded,
            base,
            now,
            &self.shared.adaptive,
        );
        counters.evictions.add(outcome.evicted as u64);
        if outcome.ttl != base {
            debug!(key, base_secs = base.as_secs(), ttl_secs = outcome.ttl.as_secs(), "adapted ttl");
        }
        self.shared.negative.lock().remove(key);
        true
    }

    /// Removes each key; returns how many were present.
    pub fn delete<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut store = self.shared.store.lock();
        keys.into_iter()
            .filter(|key| store.remove(key.as_ref()).is_some())
            .count()
    }

    /// Remaining whole seconds: `-2` when absent, `-1` when expired.
    pub fn ttl_remaining(&self, key: &str) -> i64 {
        let now = Instant::now();
        match self.shared.store.lock().get(key) {
            None => -2,
            Some(entry) if entry.is_expired(now) => -1,
            Some(entry) => i64::try_from(entry.remaining(now).as_secs()).unwrap_or(i64::MAX),
        }
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Returns the cached value or fetches it, applying coalescing,
    /// stale-while-revalidate, negative caching and the circuit breaker.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
        options: RefreshOptions,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
    {
        let counters = &self.shared.counters;
        match self.decide(key, Instant::now(), options) {
            Decision::Serve(value) => {
                counters.hits.incr();
                counters.api_calls_saved.incr();
                Ok(value)
            },
            Decision::ServeAndRefresh(value) => {
                counters.hits.incr();
                counters.api_calls_saved.incr();
                self.spawn_refresh(key, ttl, fetch, value.clone());
                Ok(value)
            },
            Decision::Reject(err) => {
                counters.misses.incr();
                counters.api_calls_saved.incr();
                Err(err)
            },
            Decision::Wait(waiter) => {
                counters.misses.incr();
                counters.api_calls_saved.incr();
                waiter.wait().await
            },
            Decision::Lead {
                fallback,
                coalesced,
            } => {
                counters.misses.incr();
                self.lead(key, ttl, fetch, fallback, coalesced).await
            },
        }
    }

    /// Atomic check-then-act under the pending lock.
    fn decide(&self, key: &str, now: Instant, options: RefreshOptions) -> Decision<V> {
        let threshold = options
            .refresh_threshold
            .unwrap_or(self.shared.config.refresh_threshold);
        let soft_ttl = options.soft_ttl.or_else(|| self.shared.config.soft_ttl());

        let mut pending = self.shared.pending.lock();
        match self.lookup(key, now, threshold, soft_ttl) {
            Lookup::Fresh(value) => Decision::Serve(value),
            Lookup::Revalidate { value, stale } => {
                if pending.contains(key) {
                    return Decision::Serve(value);
                }
                pending.register(key, now);
                debug!(key, stale, "serving cached value, refreshing in background");
                Decision::ServeAndRefresh(value)
            },
            Lookup::Missing(fallback) => {
                if let Some(remaining) = self.negative_remaining(key, now) {
                    return Decision::Reject(CacheError::NegativeCached {
                        key: key.to_owned(),
                        remaining,
                    });
                }
                if !self.shared.config.request_coalescing {
                    return Decision::Lead {
                        fallback,
                        coalesced: false,
                    };
                }
                if let Some(waiter) = pending.join(key) {
                    return Decision::Wait(waiter);
                }
                pending.register(key, now);
                Decision::Lead {
                    fallback,
                    coalesced: true,
                }
            },
        }
    }

    fn lookup(
        &self,
        key: &str,
        now: Instant,
        threshold: f64,
        soft_ttl: Option<Duration>,
    ) -> Lookup<V> {
        let mut store = self.shared.store.lock();
        let Some((expired, within_soft, remaining, ttl)) = store.get(key).map(|entry| {
            (
                entry.is_expired(now),
                soft_ttl.is_some_and(|soft| !entry.is_expired_past(now, soft)),
                entry.remaining(now),
                entry.ttl(),
            )
        }) else {
            return Lookup::Missing(None);
        };

        let (fresh, stale) = if !expired {
            let fresh = remaining.as_secs_f64() > threshold * ttl.as_secs_f64();
            (fresh, false)
        } else if within_soft {
            (false, true)
        } else {
            let fallback = store
                .remove(key)
                .and_then(|expired| expired.value.materialize().ok());
            return Lookup::Missing(fallback);
        };

        let decoded = store.touch(key, now).map(|entry| entry.value.materialize());
        match decoded {
            Some(Ok(value)) if fresh => Lookup::Fresh(value),
            Some(Ok(value)) => Lookup::Revalidate { value, stale },
            Some(Err(err)) => {
                store.remove(key);
                self.shared.counters.errors.incr();
                warn!(key, error = %err, "dropping undecodable entry");
                Lookup::Missing(None)
            },
            None => Lookup::Missing(None),
        }
    }

    /// Runs `fetch` through the breaker, stores the result, and resolves
    /// any coalesced waiters.
    async fn lead<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
        fallback: Option<V>,
        coalesced: bool,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, BoxError>>,
    {
        let guard = coalesced.then(|| LeaderGuard::new(&self.shared.pending, key));

        let fetched = self
            .shared
            .breaker
            .execute(|| async move { fetch().await.map_err(|e| CacheError::fetch(key, e)) })
            .await;

        let outcome = match fetched {
            Ok(value) => {
                self.set(key, value.clone(), ttl);
                Ok(value)
            },
            Err(err) => {
                self.shared.counters.errors.incr();
                match fallback {
                    Some(stale) => {
                        warn!(key, error = %err, "refresh failed, serving stale value");
                        Ok(stale)
                    },
                    None => {
                        if err.is_fetch() && self.shared.config.negative_cache.enabled {
                            self.shared.negative.lock().insert(key, Instant::now());
                            warn!(key, error = %err, "fetch failed, key negatively cached");
                        } else {
                            warn!(key, error = %err, "fetch failed");
                        }
                        Err(err)
                    },
                }
            },
        };

        if let Some(guard) = guard {
            guard.complete(&outcome);
        }
        outcome
    }

    fn spawn_refresh<F, Fut>(&self, key: &str, ttl: Option<Duration>, fetch: F, current: V)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
    {
        let cache = self.clone();
        let key = key.to_owned();
        tokio::spawn(async move {
            let _ = cache.lead(&key, ttl, fetch, Some(current), true).await;
        });
    }

    // -----------------------------------------------------------------------
    // Bulk operations
    // -----------------------------------------------------------------------

    /// Deletes every key matching the glob `pattern`.
    pub fn scan_and_delete(&self, pattern: &str) -> Result<usize> {
        let mut store = self.shared.store.lock();
        let keys = store.keys_matching(pattern)?;
        let removed = keys
            .iter()
            .filter(|key| store.remove(key).is_some())
            .count();
        debug!(pattern, removed, "scan and delete");
        Ok(removed)
    }

    /// Removes expired entries and negative-cache markers.
    ///
    /// Entries inside the configured soft TTL are kept for stale serving.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let removed = self.shared.store.lock().purge_expired(now, self.grace());
        self.shared.negative.lock().purge_expired(now);
        removed
    }

    /// Drops every entry and negative-cache marker.
    pub fn clear(&self) {
        self.shared.store.lock().clear();
        self.shared.negative.lock().clear();
    }

    /// [`clear`](Self::clear) plus a metrics reset.
    pub fn flush(&self) {
        self.clear();
        self.shared.counters.reset();
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn metrics(&self) -> MetricsSnapshot {
        let counters = &self.shared.counters;
        let hits = counters.hits.get();
        let misses = counters.misses.get();
        let (entries, memory_bytes, segments) = {
            let store = self.shared.store.lock();
            (store.len(), store.memory_bytes(), store.segment_count())
        };
        MetricsSnapshot {
            hits,
            misses,
            evictions: counters.evictions.get(),
            errors: counters.errors.get(),
            api_calls_saved: counters.api_calls_saved.get(),
            hit_rate: snapshot::hit_rate(hits, misses),
            entries,
            memory_bytes,
            segments,
            pending_fetches: self.shared.pending.len(),
            negative_entries: self.shared.negative.lock().len(),
            circuit_state: self.shared.breaker.state(),
        }
    }

    pub fn key_index_stats(&self) -> KeyIndexStats {
        self.shared.store.lock().index().stats()
    }

    pub fn bloom_stats(&self) -> BloomStats {
        self.shared.negative.lock().bloom_stats()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.shared.breaker.state()
    }

    pub fn circuit_stats(&self) -> CircuitStats {
        self.shared.breaker.stats()
    }

    /// Access count and entry count of one segment.
    pub fn segment_stats(&self, name: &str) -> Option<(u64, usize)> {
        self.shared
            .store
            .lock()
            .segment(name)
            .map(|segment| (segment.access_count(), segment.len()))
    }

    // -----------------------------------------------------------------------
    // Persistence & maintenance
    // -----------------------------------------------------------------------

    /// Spawns the periodic cleanup and snapshot task.
    pub fn start_maintenance(&self) -> MaintenanceHandle {
        maintenance::spawn(self.clone())
    }

    /// Writes a snapshot to the configured path.
    pub async fn save_snapshot(&self) -> Result<usize> {
        let path = self.shared.config.persistence.path.clone();
        self.save_snapshot_to(&path).await
    }

    /// Writes every unexpired, uncompressed entry up to the per-entry size
    /// limit to `path`. Returns the number of entries written.
    pub async fn save_snapshot_to(&self, path: &Path) -> Result<usize> {
        let snapshot = self.collect_snapshot();
        let count = snapshot.entries.len();
        match persist::save(path, &snapshot).await {
            Ok(()) => {
                info!(path = %path.display(), entries = count, "saved cache snapshot");
                Ok(count)
            },
            Err(err) => {
                self.shared.counters.errors.incr();
                warn!(path = %path.display(), error = %err, "failed to save cache snapshot");
                Err(err)
            },
        }
    }

    fn collect_snapshot(&self) -> Snapshot<V> {
        let now = Instant::now();
        let now_ms = persist::unix_millis(SystemTime::now());
        let max_bytes = self.shared.config.persistence.max_entry_bytes;
        let store = self.shared.store.lock();
        let entries = store
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now) && entry.size_bytes() <= max_bytes)
            .filter_map(|(key, entry)| {
                let StoredValue::Raw(value) = &entry.value else {
                    return None;
                };
                let age = now.saturating_duration_since(entry.created_at);
                Some(SnapshotRecord {
                    key: key.clone(),
                    entry: SnapshotEntry {
                        value: value.clone(),
                        created_at_ms: now_ms.saturating_sub(duration_millis(age)),
                        ttl_ms: duration_millis(entry.ttl()),
                        hit_count: entry.hit_count(),
                        update_count: entry.update_count(),
                        size_bytes: entry.size_bytes(),
                    },
                })
            })
            .collect();
        Snapshot::new(entries)
    }

    /// Loads the snapshot at the configured path.
    pub async fn restore(&self) -> Result<usize> {
        let path = self.shared.config.persistence.path.clone();
        self.restore_from(&path).await
    }

    /// Loads entries from `path` with their remaining TTL; expired entries
    /// and keys already live in the cache are skipped.
    pub async fn restore_from(&self, path: &Path) -> Result<usize> {
        let snapshot = match persist::load::<V>(path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(0),
            Err(err) => {
                self.shared.counters.errors.incr();
                warn!(path = %path.display(), error = %err, "failed to load cache snapshot");
                return Err(err);
            },
        };

        let now_ms = persist::unix_millis(SystemTime::now());
        let total = snapshot.entries.len();
        let mut restored = 0;
        for record in snapshot.entries {
            let Some(remaining) = record.entry.remaining(now_ms) else {
                continue;
            };
            if self.contains(&record.key) {
                continue;
            }
            if self.set(&record.key, record.entry.value, Some(remaining)) {
                restored += 1;
            }
        }
        info!(path = %path.display(), restored, skipped = total - restored, "restored cache snapshot");
        Ok(restored)
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl<V> MetricsSnapshotProvider<MetricsSnapshot> for AdaptiveCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn snapshot(&self) -> MetricsSnapshot {
        self.metrics()
    }
}

impl<V> MetricsReset for AdaptiveCache<V> {
    fn reset_metrics(&self) {
        self.shared.counters.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::EvictionPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(config: CacheConfig) -> AdaptiveCache<String> {
        AdaptiveCache::new(config).unwrap()
    }

    fn upstream_error() -> BoxError {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, "503"))
    }

    #[tokio::test(start_paused = true)]
    async fn lru_scenario() {
        let cache: AdaptiveCache<u32> = AdaptiveCache::new(CacheConfig {
            max_entries: 2,
            eviction_policy: EvictionPolicy::Lru,
            ..CacheConfig::default()
        })
        .unwrap();
        assert!(cache.set("a", 1, None));
        assert!(cache.set("b", 2, None));
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.set("c", 3, None));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn maximal_ttl_never_expires() {
        let cache = cache(CacheConfig::default());
        assert!(cache.set("k", "v".into(), Some(Duration::from_secs(u64::MAX))));
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.ttl_remaining("k") > 0);
        assert_eq!(cache.purge_expired(), 0);

        let value = cache
            .get_or_refresh(
                "k",
                Some(Duration::from_secs(u64::MAX)),
                || async { Ok::<_, BoxError>("fetched".to_string()) },
                RefreshOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, "v");
    }

    #[tokio::test(start_paused = true)]
    async fn maximal_soft_ttl_keeps_stale_values() {
        let cache = cache(CacheConfig {
            soft_ttl_secs: Some(u64::MAX),
            ..CacheConfig::default()
        });
        cache.set("k", "old".into(), Some(Duration::from_secs(1)));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.ttl_remaining("k"), -1);

        let value = cache
            .get_or_refresh(
                "k",
                Some(Duration::from_secs(1)),
                || async { Ok::<_, BoxError>("new".to_string()) },
                RefreshOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, "old");
    }

    #[tokio::test(start_paused = true)]
    async fn get_counts_exactly_one_of_hit_or_miss() {
        let cache = cache(CacheConfig::default());
        cache.set("k", "v".into(), None);
        cache.get("k");
        cache.get("absent");
        let metrics = cache.metrics();
        assert_eq!((metrics.hits, metrics.misses), (1, 1));
        assert_eq!(metrics.hit_rate, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_and_ttl_remaining() {
        let cache = cache(CacheConfig::default());
        cache.set("k", "v".into(), Some(Duration::from_secs(10)));
        assert_eq!(cache.ttl_remaining("k"), 10);
        assert_eq!(cache.ttl_remaining("absent"), -2);
        tokio::time::advance(Duration::from_millis(10_500)).await;
        assert_eq!(cache.ttl_remaining("k"), -1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.ttl_remaining("k"), -2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_value_is_rejected() {
        let cache = cache(CacheConfig {
            max_memory_mb: 1,
            compression: crate::config::CompressionConfig {
                enabled: false,
                ..Default::default()
            },
            ..CacheConfig::default()
        });
        assert!(!cache.set("big", "x".repeat(2 * 1024 * 1024), None));
        assert_eq!(cache.metrics().errors, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_is_idempotent() {
        let cache = cache(CacheConfig::default());
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        assert_eq!(cache.delete(["a", "b", "c"]), 2);
        assert_eq!(cache.delete(["a"]), 0);
        assert_eq!(cache.key_index_stats().total_keys, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_and_delete_by_pattern() {
        let cache = cache(CacheConfig::default());
        for key in ["user:1", "user:2", "post:1"] {
            cache.set(key, key.into(), None);
        }
        assert_eq!(cache.scan_and_delete("user:*").unwrap(), 2);
        assert!(cache.contains("post:1"));
        assert!(matches!(
            cache.scan_and_delete("["),
            Ok(0) | Err(CacheError::InvalidPattern { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_negatively_cached() {
        let cache = cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let err = cache
            .get_or_refresh(
                "k",
                Some(Duration::from_secs(10)),
                move || async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(upstream_error())
                },
                RefreshOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_fetch());

        let c = Arc::clone(&calls);
        let err = cache
            .get_or_refresh(
                "k",
                Some(Duration::from_secs(10)),
                move || async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok("late".to_string())
                },
                RefreshOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::NegativeCached { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k"), None);

        // a successful set clears the marker
        cache.set("k", "now".into(), None);
        assert_eq!(cache.get("k").as_deref(), Some("now"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expires_negative_markers() {
        let cache = cache(CacheConfig::default());
        let _ = cache
            .get_or_refresh("k", None, || async { Err(upstream_error()) }, RefreshOptions::default())
            .await;
        assert_eq!(cache.metrics().negative_entries, 1);
        tokio::time::advance(Duration::from_secs(31)).await;
        cache.purge_expired();
        assert_eq!(cache.metrics().negative_entries, 0);
        assert_eq!(cache.bloom_stats().element_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_resets_metrics() {
        let cache = cache(CacheConfig::default());
        cache.set("k", "v".into(), None);
        cache.get("k");
        cache.flush();
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn adaptive_ttl_shrinks_on_rapid_updates() {
        let cache = cache(CacheConfig::default());
        cache.set("hot", "1".into(), None);
        assert_eq!(cache.ttl_remaining("hot"), 300);
        tokio::time::advance(Duration::from_secs(40)).await;
        cache.set("hot", "2".into(), None);
        assert_eq!(cache.ttl_remaining("hot"), 80);
    }
}
