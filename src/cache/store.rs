//! Entry store: segments, key index, and the eviction loop.
//!
//! The store is a plain single-threaded structure; [`AdaptiveCache`] keeps it
//! behind one mutex so the entries, the key index, and the memory counter
//! never disagree.
//!
//! ```text
//!   Store
//!   ├── segments: name ──► Segment { key ──► CacheEntry }
//!   ├── index:    KeyIndex (prefix-interned copy of every live key)
//!   ├── victims:  RankIndex (every key at its eviction-policy rank)
//!   ├── memory_bytes = Σ entry.size_bytes
//!   ├── len          = Σ segment.len()
//!   ├── tick         logical clock for recency
//!   └── next_seq     FIFO insertion counter
//! ```
//!
//! Each segment also keeps a recency [`RankIndex`] when a per-segment cap is
//! configured. Every write, read, and removal moves the key in those indexes,
//! so choosing a victim never scans the entries.
//!
//! [`AdaptiveCache`]: crate::cache::AdaptiveCache

use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::entry::{CacheEntry, Encoded};
use crate::cache::segment::{segment_for_key, Segment};
use crate::cache::ttl::AdaptiveTtl;
use crate::ds::{KeyIndex, RankIndex};
use crate::policy::EvictionPolicy;

/// Capacity limits applied on insert.
#[derive(Debug, Clone)]
pub(crate) struct Limits {
    pub max_entries: usize,
    pub max_memory_bytes: usize,
    pub segment_cap: Option<usize>,
    pub policy: EvictionPolicy,
    pub lru_k: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InsertOutcome {
    pub evicted: usize,
    pub ttl: Duration,
}

#[derive(Debug)]
pub(crate) struct Store<V> {
    segments: FxHashMap<String, Segment<V>>,
    index: KeyIndex,
    victims: RankIndex,
    limits: Limits,
    memory_bytes: usize,
    len: usize,
    tick: u64,
    next_seq: u64,
    segmented: bool,
}

impl<V> Store<V> {
    pub fn new(limits: Limits, segmented: bool) -> Self {
        Self {
            segments: FxHashMap::default(),
            index: KeyIndex::new(),
            victims: RankIndex::new(),
            limits,
            memory_bytes: 0,
            len: 0,
            tick: 0,
            next_seq: 0,
            segmented,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    pub fn segment(&self, name: &str) -> Option<&Segment<V>> {
        self.segments.get(name)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.segments
            .get(segment_for_key(key, self.segmented))?
            .entries
            .get(key)
    }

    /// Records a read on `key` and returns the entry.
    pub fn touch(&mut self, key: &str, now: Instant) -> Option<&CacheEntry<V>> {
        let tick = self.next_tick();
        let segment = self
            .segments
            .get_mut(segment_for_key(key, self.segmented))?;
        let entry = segment.entries.get_mut(key)?;
        entry.touch(now, tick);
        segment.record_access(now);
        self.reindex(key);
        self.get(key)
    }

    /// Moves `key` to its current rank in the victim and recency indexes.
    fn reindex(&mut self, key: &str) {
        let Some(segment) = self.segments.get_mut(segment_for_key(key, self.segmented)) else {
            return;
        };
        let Some(entry) = segment.entries.get(key) else {
            return;
        };
        let seq = entry.insertion_seq;
        let rank = self.limits.policy.rank(entry, self.limits.lru_k);
        self.victims.update(key, rank, seq);
        if self.limits.segment_cap.is_some() {
            let recency = EvictionPolicy::Lru.rank(entry, 0);
            segment.recency.update(key, recency, seq);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let name = segment_for_key(key, self.segmented);
        let segment = self.segments.get_mut(name)?;
        let entry = segment.entries.remove(key)?;
        segment.recency.remove(key);
        self.victims.remove(key);
        if segment.is_empty() {
            self.segments.remove(name);
        }
        self.index.delete(key);
        self.len -= 1;
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Inserts or overwrites `key`, evicting until the limits hold.
    pub fn insert(
        &mut self,
        key: &str,
        encoded: Encoded<V>,
        base_ttl: Duration,
        now: Instant,
        adaptive: &AdaptiveTtl,
    ) -> InsertOutcome {
        let max_entries = self.limits.max_entries;
        let max_memory_bytes = self.limits.max_memory_bytes;
        let tick = self.next_tick();
        let new_size = encoded.size_bytes;
        let mut evicted = 0;

        let previous = self
            .get(key)
            .map(|entry| (entry.size_bytes, now.saturating_duration_since(entry.created_at)));

        if let Some((old_size, interval)) = previous {
            let ttl = adaptive.compute(base_ttl, Some(interval));
            self.memory_bytes = self.memory_bytes.saturating_sub(old_size);
            while self.memory_bytes + new_size > max_memory_bytes {
                if self.evict_one(Some(key)).is_none() {
                    break;
                }
                evicted += 1;
            }
            let name = segment_for_key(key, self.segmented);
            if let Some(entry) = self
                .segments
                .get_mut(name)
                .and_then(|segment| segment.entries.get_mut(key))
            {
                entry.overwrite(encoded.value, new_size, ttl, now, tick);
            }
            self.reindex(key);
            self.memory_bytes += new_size;
            return InsertOutcome { evicted, ttl };
        }

        let ttl = adaptive.compute(base_ttl, None);
        let name = segment_for_key(key, self.segmented).to_owned();

        if let Some(cap) = self.limits.segment_cap {
            while self.segments.get(&name).is_some_and(|s| s.len() >= cap) {
                if self.evict_in_segment(&name).is_none() {
                    break;
                }
                evicted += 1;
            }
        }
        while self.len >= max_entries {
            if self.evict_one(None).is_none() {
                break;
            }
            evicted += 1;
        }
        while self.memory_bytes + new_size > max_memory_bytes {
            if self.evict_one(None).is_none() {
                break;
            }
            evicted += 1;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let history = (self.limits.policy == EvictionPolicy::LruK).then_some(self.limits.lru_k);
        let entry = CacheEntry::new(encoded.value, new_size, ttl, now, tick, seq, history);
        self.segments
            .entry(name)
            .or_default()
            .entries
            .insert(key.to_owned(), entry);
        self.index.add(key);
        self.reindex(key);
        self.len += 1;
        self.memory_bytes += new_size;
        InsertOutcome { evicted, ttl }
    }

    /// Evicts the configured policy's victim across all segments.
    fn evict_one(&mut self, exclude: Option<&str>) -> Option<String> {
        let victim = self.victims.first(exclude)?.to_owned();
        self.remove(&victim);
        debug!(key = %victim, policy = self.limits.policy.name(), "evicted entry");
        Some(victim)
    }

    /// Evicts the least recently used entry of one segment.
    fn evict_in_segment(&mut self, name: &str) -> Option<String> {
        let victim = self.segments.get(name)?.recency.first(None)?.to_owned();
        self.remove(&victim);
        debug!(key = %victim, segment = name, "evicted entry at segment cap");
        Some(victim)
    }

    /// Removes entries expired for longer than `grace`.
    pub fn purge_expired(&mut self, now: Instant, grace: Duration) -> usize {
        let expired: Vec<String> = self
            .segments
            .values()
            .flat_map(|segment| segment.entries.iter())
            .filter(|(_, entry)| entry.is_expired_past(now, grace))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Keys matching a glob pattern.
    pub fn keys_matching(&self, pattern: &str) -> crate::error::Result<Vec<String>> {
        self.index.get_by_pattern(pattern)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry<V>)> {
        self.segments
            .values()
            .flat_map(|segment| segment.entries.iter())
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.index.clear();
        self.victims.clear();
        self.memory_bytes = 0;
        self.len = 0;
    }

    #[cfg(test)]
    pub fn debug_validate_invariants(&self) {
        let count: usize = self.segments.values().map(Segment::len).sum();
        assert_eq!(count, self.len);
        assert_eq!(self.index.len(), self.len);
        assert_eq!(self.victims.len(), self.len);
        self.victims.debug_validate_invariants();
        let bytes: usize = self.iter().map(|(_, e)| e.size_bytes).sum();
        assert_eq!(bytes, self.memory_bytes);
        assert!(self.segments.values().all(|s| !s.is_empty()));
        for segment in self.segments.values() {
            let tracked = if self.limits.segment_cap.is_some() { segment.len() } else { 0 };
            assert_eq!(segment.recency.len(), tracked);
            for (key, entry) in &segment.entries {
                assert!(self.index.has(key));
                assert_eq!(
                    self.victims.rank_of(key),
                    Some(self.limits.policy.rank(entry, self.limits.lru_k))
                );
            }
        }
    }
}
