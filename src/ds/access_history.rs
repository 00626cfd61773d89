//! Bounded access history ring buffer.
//!
//! Stores the last `K` access ticks of a cache entry, providing O(1) record
//! and O(1) access to the k-th most recent tick. The LRU-K eviction policy
//! ranks entries by their K-th most recent access.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                      AccessHistory (k = 4) Layout                           │
//! │                                                                             │
//! │   data: Box<[u64]> (len = k)   cursor: next write position                  │
//! │   len: valid entries           (wraps around when full)                     │
//! │                                                                             │
//! │   After recording: 10, 20, 30, 40, 50                                       │
//! │                                                                             │
//! │   Index:     0     1     2     3                                            │
//! │            ┌─────┬─────┬─────┬─────┐                                        │
//! │   data:    │ 50  │ 20  │ 30  │ 40  │                                        │
//! │            └─────┴─────┴─────┴─────┘                                        │
//! │              ▲                                                              │
//! │           cursor = 1 (next write goes here)                                 │
//! │                                                                             │
//! │   kth_most_recent(k) = data[(cursor + K - k) % K]                           │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike a const-generic ring, the depth is chosen at runtime because `K` is
//! a configuration value of the cache.
//!
//! ## Example Usage
//!
//! ```
//! use cacheshield::ds::AccessHistory;
//!
//! let mut history = AccessHistory::new(2);
//! history.record(100);
//! assert_eq!(history.kth_most_recent(2), None); // fewer than K accesses
//!
//! history.record(200);
//! history.record(300);
//! assert_eq!(history.kth_most_recent(2), Some(200));
//! assert_eq!(history.to_vec_mru(), vec![300, 200]);
//! ```
//!
//! ## Thread Safety
//!
//! `AccessHistory` is not thread-safe. It is embedded within cache entries and
//! protected by the cache's lock.

/// Ring buffer of the last `k` access ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessHistory {
    data: Box<[u64]>,
    len: usize,
    cursor: usize,
}

impl AccessHistory {
    /// Creates an empty history retaining at most `k` ticks.
    pub fn new(k: usize) -> Self {
        Self {
            data: vec![0; k].into_boxed_slice(),
            len: 0,
            cursor: 0,
        }
    }

    /// Maximum number of ticks retained.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of ticks currently stored (<= capacity).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Records a tick, overwriting the oldest one when full.
    pub fn record(&mut self, tick: u64) {
        let cap = self.data.len();
        if cap == 0 {
            return;
        }
        self.data[self.cursor] = tick;
        self.cursor = (self.cursor + 1) % cap;
        if self.len < cap {
            self.len += 1;
        }
    }

    pub fn most_recent(&self) -> Option<u64> {
        self.kth_most_recent(1)
    }

    /// Returns the k-th most recent tick (`k = 1` is most recent).
    ///
    /// `None` when `k` is 0 or exceeds the number of recorded ticks.
    pub fn kth_most_recent(&self, k: usize) -> Option<u64> {
        let cap = self.data.len();
        if cap == 0 || k == 0 || k > self.len {
            return None;
        }
        let idx = (self.cursor + cap - k) % cap;
        Some(self.data[idx])
    }

    /// Ticks from most recent to least recent.
    pub fn to_vec_mru(&self) -> Vec<u64> {
        (1..=self.len)
            .filter_map(|k| self.kth_most_recent(k))
            .collect()
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.cursor = 0;
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert!(self.len <= self.data.len());
        if self.data.is_empty() {
            assert_eq!(self.cursor, 0);
        } else {
            assert!(self.cursor < self.data.len());
        }
    }
}
