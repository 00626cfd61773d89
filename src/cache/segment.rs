//! Key-space segments.
//!
//! With segmentation enabled, each key lives in the segment named by its
//! first path component, and each segment enforces its own entry cap with
//! LRU eviction. Without segmentation every key lands in [`DEFAULT_SEGMENT`].
//!
//! ```text
//!   "user:42:profile"  ──► segment "user"
//!   "img/thumb/7.png"  ──► segment "img"
//!   "standalone"       ──► segment "standalone"
//! ```

use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::cache::entry::CacheEntry;
use crate::ds::RankIndex;

pub const DEFAULT_SEGMENT: &str = "default";

/// Segment name for `key`: the text before the first `:` or `/`.
///
/// Returns [`DEFAULT_SEGMENT`] when segmentation is off or the first
/// component is empty.
pub fn segment_for_key(key: &str, segmented: bool) -> &str {
    if !segmented {
        return DEFAULT_SEGMENT;
    }
    let head = match key.find(|c: char| c == ':' || c == '/') {
        Some(idx) => &key[..idx],
        None => key,
    };
    if head.is_empty() {
        DEFAULT_SEGMENT
    } else {
        head
    }
}

#[derive(Debug)]
pub struct Segment<V> {
    pub(crate) entries: FxHashMap<String, CacheEntry<V>>,
    /// LRU order of `entries`, kept only under a per-segment cap.
    pub(crate) recency: RankIndex,
    pub(crate) access_count: u64,
    pub(crate) last_accessed: Option<Instant>,
}

impl<V> Segment<V> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            recency: RankIndex::new(),
            access_count: 0,
            last_accessed: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn last_accessed(&self) -> Option<Instant> {
        self.last_accessed
    }

    pub(crate) fn record_access(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = Some(now);
    }
}

impl<V> Default for Segment<V> {
    fn default() -> Self {
        Self::new()
    }
}
