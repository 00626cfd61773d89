//! Cache entry and its stored representation.
//!
//! ```text
//!   CacheEntry<V>
//!   ├── value: StoredValue<V>     Raw(V) | Compressed(gzip(json(V)))
//!   ├── size_bytes                size of the stored representation
//!   ├── created_at, ttl           expired once age > ttl
//!   ├── hit_count, last_access    LFU / LRU bookkeeping
//!   ├── insertion_seq             FIFO position (kept across overwrites)
//!   ├── update_count,
//!   │   last_update_interval      adaptive TTL inputs
//!   └── access_history            last K access ticks (LRU-K only)
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::compress;
use crate::ds::AccessHistory;
use crate::error::{CacheError, Result};
use crate::policy::EvictionCandidate;

/// A value as held in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue<V> {
    Raw(V),
    /// gzip of the value's JSON encoding.
    Compressed(Vec<u8>),
}

impl<V> StoredValue<V>
where
    V: Clone + DeserializeOwned,
{
    /// Clones the raw value or decodes the compressed one.
    pub fn materialize(&self) -> Result<V> {
        match self {
            StoredValue::Raw(value) => Ok(value.clone()),
            StoredValue::Compressed(bytes) => {
                let json = compress::decompress(bytes)?;
                serde_json::from_slice(&json).map_err(CacheError::from)
            },
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, StoredValue::Compressed(_))
    }
}

/// Result of encoding a value for storage.
#[derive(Debug)]
pub(crate) struct Encoded<V> {
    pub value: StoredValue<V>,
    pub size_bytes: usize,
    /// Compression was attempted but failed; the value is stored raw.
    pub compression_failed: bool,
}

/// Estimates the value's size and compresses it when that saves enough.
pub(crate) fn encode<V: Serialize>(
    value: V,
    compression: &crate::config::CompressionConfig,
) -> Result<Encoded<V>> {
    let json = serde_json::to_vec(&value)?;
    let raw_size = json.len();

    if !compression.enabled || raw_size <= compression.threshold_bytes {
        return Ok(Encoded {
            value: StoredValue::Raw(value),
            size_bytes: raw_size,
            compression_failed: false,
        });
    }

    match compress::compress(&json, compression.level) {
        Ok(packed) if compress::worth_keeping(raw_size, packed.len(), compression.min_savings) => {
            Ok(Encoded {
                size_bytes: packed.len(),
                value: StoredValue::Compressed(packed),
                compression_failed: false,
            })
        },
        Ok(_) => Ok(Encoded {
            value: StoredValue::Raw(value),
            size_bytes: raw_size,
            compression_failed: false,
        }),
        Err(err) => {
            tracing::warn!(error = %err, "compression failed, storing raw");
            Ok(Encoded {
                value: StoredValue::Raw(value),
                size_bytes: raw_size,
                compression_failed: true,
            })
        },
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub(crate) value: StoredValue<V>,
    pub(crate) created_at: Instant,
    pub(crate) ttl: Duration,
    pub(crate) hit_count: u64,
    pub(crate) last_accessed: Instant,
    pub(crate) last_access_tick: u64,
    pub(crate) created_tick: u64,
    pub(crate) insertion_seq: u64,
    pub(crate) size_bytes: usize,
    pub(crate) update_count: u64,
    pub(crate) last_update_interval: Option<Duration>,
    pub(crate) access_history: Option<AccessHistory>,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(
        value: StoredValue<V>,
        size_bytes: usize,
        ttl: Duration,
        now: Instant,
        tick: u64,
        insertion_seq: u64,
        history_depth: Option<usize>,
    ) -> Self {
        Self {
            value,
            created_at: now,
            ttl,
            hit_count: 0,
            last_accessed: now,
            last_access_tick: tick,
            created_tick: tick,
            insertion_seq,
            size_bytes,
            update_count: 0,
            last_update_interval: None,
            access_history: history_depth.map(AccessHistory::new),
        }
    }

    /// Time since the last write.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }

    /// `true` once the entry has been expired for longer than `grace`.
    pub fn is_expired_past(&self, now: Instant, grace: Duration) -> bool {
        self.age(now) > self.ttl.saturating_add(grace)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.ttl.saturating_sub(self.age(now))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.value, StoredValue::Compressed(_))
    }

    /// Records a read at `tick`.
    pub(crate) fn touch(&mut self, now: Instant, tick: u64) {
        self.hit_count += 1;
        self.last_accessed = now;
        self.last_access_tick = tick;
        if let Some(history) = self.access_history.as_mut() {
            history.record(tick);
        }
    }

    /// Replaces the value in place, carrying over access and FIFO bookkeeping.
    pub(crate) fn overwrite(
        &mut self,
        value: StoredValue<V>,
        size_bytes: usize,
        ttl: Duration,
        now: Instant,
        tick: u64,
    ) {
        self.last_update_interval = Some(now.saturating_duration_since(self.created_at));
        self.update_count += 1;
        self.value = value;
        self.size_bytes = size_bytes;
        self.ttl = ttl;
        self.created_at = now;
        self.created_tick = tick;
        self.last_access_tick = tick;
        self.last_accessed = now;
    }
}

impl<V> EvictionCandidate for CacheEntry<V> {
    fn last_access_tick(&self) -> u64 {
        self.last_access_tick
    }

    fn hit_count(&self) -> u64 {
        self.hit_count
    }

    fn insertion_seq(&self) -> u64 {
        self.insertion_seq
    }

    fn created_tick(&self) -> u64 {
        self.created_tick
    }

    fn kth_access_tick(&self, k: usize) -> Option<u64> {
        self.access_history.as_ref()?.kth_most_recent(k)
    }
}
