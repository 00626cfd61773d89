//! Negative cache: keys whose last upstream fetch failed.
//!
//! The Bloom filter answers "definitely not negative" without touching the
//! map; the map is authoritative and carries the time each key was marked.
//! Bloom bits cannot be removed, so the filter is rebuilt from the surviving
//! keys whenever expired markers are swept. Lookups drop the marker they find
//! expired, and `insert` sweeps once the filter has taken in more keys than
//! it was sized for, so the map stays bounded without the maintenance task.

use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::config::NegativeCacheConfig;
use crate::ds::{BloomFilter, BloomStats};

#[derive(Debug)]
pub(crate) struct NegativeCache {
    bloom: BloomFilter,
    /// key -> time the key was marked negative
    entries: FxHashMap<String, Instant>,
    ttl: Duration,
    expected_elements: usize,
    false_positive_rate: f64,
    /// Filter element count that triggers the next sweep in `insert`.
    sweep_at: usize,
}

impl NegativeCache {
    pub fn new(config: &NegativeCacheConfig) -> Self {
        Self {
            bloom: BloomFilter::new(config.expected_elements, config.false_positive_rate),
            entries: FxHashMap::default(),
            ttl: config.ttl(),
            expected_elements: config.expected_elements,
            false_positive_rate: config.false_positive_rate,
            sweep_at: config.expected_elements,
        }
    }

    pub fn insert(&mut self, key: &str, now: Instant) {
        if self.bloom.stats().element_count as usize >= self.sweep_at {
            self.sweep(now);
        }
        if self.entries.insert(key.to_owned(), now).is_none() || !self.bloom.has(key) {
            self.bloom.add(key);
        }
    }

    /// Time left in the negative window, `None` if the key is not negative.
    /// An expired marker is dropped on the way out.
    pub fn remaining(&mut self, key: &str, now: Instant) -> Option<Duration> {
        if !self.bloom.has(key) {
            return None;
        }
        let marked = *self.entries.get(key)?;
        let left = self.window_left(marked, now);
        if left.is_none() {
            self.entries.remove(key);
        }
        left
    }

    fn window_left(&self, marked: Instant, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(marked);
        (elapsed < self.ttl).then(|| self.ttl - elapsed)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops expired keys and rebuilds the filter when any were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, marked| now.saturating_duration_since(*marked) < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    /// Purges expired markers and always rebuilds, clearing bits left behind
    /// by removed keys.
    fn sweep(&mut self, now: Instant) {
        let removed = self.purge_expired(now);
        if removed == 0 {
            self.rebuild();
        }
        self.sweep_at = self
            .expected_elements
            .max(self.entries.len().saturating_mul(2));
        tracing::debug!(
            removed,
            live = self.entries.len(),
            next_sweep = self.sweep_at,
            "swept negative cache"
        );
    }

    fn rebuild(&mut self) {
        let mut bloom = BloomFilter::new(self.expected_elements, self.false_positive_rate);
        for key in self.entries.keys() {
            bloom.add(key);
        }
        self.bloom = bloom;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bloom.clear();
        self.sweep_at = self.expected_elements;
    }

    pub fn bloom_stats(&self) -> BloomStats {
        self.bloom.stats()
    }
}
