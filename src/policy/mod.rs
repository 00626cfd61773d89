//! # Eviction Policies
//!
//! Victim selection for [`AdaptiveCache`](crate::cache::AdaptiveCache). The
//! cache keeps every key in a [`RankIndex`](crate::ds::RankIndex) ordered by
//! the configured [`EvictionPolicy`]; when it must make room it drops the
//! first key of that index.
//!
//! ## Ranking
//!
//! Every policy reduces an entry to a `(primary, tiebreak)` rank. The entry
//! with the lowest rank is evicted.
//!
//! ```text
//!   Policy   primary                              tiebreak
//!   ───────  ───────────────────────────────────  ─────────────────
//!   Lru      last access tick                     -
//!   Lfu      hit count                            last access tick
//!   Fifo     insertion sequence                   -
//!   LruK     K-th most recent access tick,        last access tick
//!            or creation tick if < K accesses
//! ```
//!
//! Ticks come from a monotonic logical clock owned by the cache, so two
//! operations in the same instant are still ordered.
//!
//! ## Policy Comparison
//!
//! | Policy | Eviction Basis     | Best For                              |
//! |--------|--------------------|---------------------------------------|
//! | LRU    | Last access        | Temporal locality                     |
//! | LFU    | Access frequency   | Stable hot spots                      |
//! | FIFO   | Insertion order    | Predictable eviction                  |
//! | LRU-K  | K-th access        | Skewed access, resisting one-off scans|
//!
//! ## Performance
//!
//! Ranks are recomputed only for the entry a read or write touches, and the
//! index moves it in O(log n). Finding the victim is O(log n) as well.
//!
//! ## Example Usage
//!
//! ```
//! use cacheshield::policy::{EvictionCandidate, EvictionPolicy};
//!
//! struct Meta { tick: u64, hits: u64, seq: u64 }
//!
//! impl EvictionCandidate for Meta {
//!     fn last_access_tick(&self) -> u64 { self.tick }
//!     fn hit_count(&self) -> u64 { self.hits }
//!     fn insertion_seq(&self) -> u64 { self.seq }
//!     fn created_tick(&self) -> u64 { self.seq }
//!     fn kth_access_tick(&self, _k: usize) -> Option<u64> { None }
//! }
//!
//! let a = Meta { tick: 10, hits: 5, seq: 0 };
//! let b = Meta { tick: 3, hits: 9, seq: 1 };
//!
//! // lower rank is evicted first
//! assert!(EvictionPolicy::Lru.rank(&b, 2) < EvictionPolicy::Lru.rank(&a, 2));
//! assert!(EvictionPolicy::Lfu.rank(&a, 2) < EvictionPolicy::Lfu.rank(&b, 2));
//! assert!(EvictionPolicy::Fifo.rank(&a, 2) < EvictionPolicy::Fifo.rank(&b, 2));
//! ```

use serde::{Deserialize, Serialize};

/// Which entry to evict when the cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently accessed.
    #[default]
    Lru,
    /// Lowest hit count, ties broken by recency.
    Lfu,
    /// Oldest insertion. Overwriting a key keeps its position.
    Fifo,
    /// Oldest K-th most recent access; the K value lives in
    /// [`CacheConfig::lru_k`](crate::config::CacheConfig::lru_k).
    LruK,
}

/// Bookkeeping an entry exposes to the eviction policies.
pub trait EvictionCandidate {
    fn last_access_tick(&self) -> u64;
    fn hit_count(&self) -> u64;
    /// Sequence number assigned on first insertion.
    fn insertion_seq(&self) -> u64;
    /// Tick of the most recent write.
    fn created_tick(&self) -> u64;
    /// K-th most recent access tick, `None` with fewer than `k` accesses.
    fn kth_access_tick(&self, k: usize) -> Option<u64>;
}

impl EvictionPolicy {
    /// Eviction rank of `entry`; lower ranks are evicted first.
    pub fn rank<E: EvictionCandidate + ?Sized>(&self, entry: &E, k: usize) -> (u64, u64) {
        match self {
            EvictionPolicy::Lru => (entry.last_access_tick(), 0),
            EvictionPolicy::Lfu => (entry.hit_count(), entry.last_access_tick()),
            EvictionPolicy::Fifo => (entry.insertion_seq(), 0),
            EvictionPolicy::LruK => (
                entry
                    .kth_access_tick(k)
                    .unwrap_or_else(|| entry.created_tick()),
                entry.last_access_tick(),
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::LruK => "lru_k",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Meta {
        last: u64,
        hits: u64,
        seq: u64,
        created: u64,
        history: Vec<u64>, // MRU first
    }

    impl EvictionCandidate for Meta {
        fn last_access_tick(&self) -> u64 {
            self.last
        }
        fn hit_count(&self) -> u64 {
            self.hits
        }
        fn insertion_seq(&self) -> u64 {
            self.seq
        }
        fn created_tick(&self) -> u64 {
            self.created
        }
        fn kth_access_tick(&self, k: usize) -> Option<u64> {
            self.history.get(k.checked_sub(1)?).copied()
        }
    }

    fn victim<'a>(policy: EvictionPolicy, entries: &[(&'a str, &Meta)]) -> Option<&'a str> {
        entries
            .iter()
            .min_by_key(|(_, meta)| policy.rank(*meta, 2))
            .map(|(key, _)| *key)
    }

    fn meta(last: u64, hits: u64, seq: u64, created: u64, history: &[u64]) -> Meta {
        Meta {
            last,
            hits,
            seq,
            created,
            history: history.to_vec(),
        }
    }

    #[test]
    fn lru_picks_oldest_access() {
        let a = meta(5, 0, 0, 0, &[]);
        let b = meta(2, 0, 1, 1, &[]);
        let c = meta(9, 0, 2, 2, &[]);
        let chosen = victim(EvictionPolicy::Lru, &[("a", &a), ("b", &b), ("c", &c)]);
        assert_eq!(chosen, Some("b"));
    }

    #[test]
    fn lfu_breaks_ties_by_recency() {
        let a = meta(8, 1, 0, 0, &[]);
        let b = meta(3, 1, 1, 1, &[]);
        let c = meta(1, 4, 2, 2, &[]);
        let chosen = victim(EvictionPolicy::Lfu, &[("a", &a), ("b", &b), ("c", &c)]);
        assert_eq!(chosen, Some("b"));
    }

    #[test]
    fn fifo_ignores_access() {
        let a = meta(100, 50, 0, 0, &[]);
        let b = meta(1, 0, 1, 1, &[]);
        let chosen = victim(EvictionPolicy::Fifo, &[("a", &a), ("b", &b)]);
        assert_eq!(chosen, Some("a"));
    }

    #[test]
    fn lru_k_uses_creation_below_k() {
        // "hot" was touched twice long ago and then again recently;
        // "scan" was created after hot's second access but accessed once.
        let hot = meta(20, 3, 0, 1, &[20, 4, 2]);
        let scan = meta(15, 1, 1, 5, &[15]);
        let chosen = victim(EvictionPolicy::LruK, &[("hot", &hot), ("scan", &scan)]);
        assert_eq!(chosen, Some("hot"));

        let cold = meta(30, 1, 2, 3, &[30]);
        let chosen = victim(
            EvictionPolicy::LruK,
            &[("hot", &hot), ("scan", &scan), ("cold", &cold)],
        );
        assert_eq!(chosen, Some("cold"));
    }

    #[test]
    fn serde_names() {
        let policy: EvictionPolicy = serde_json::from_str("\"lru_k\"").unwrap();
        assert_eq!(policy, EvictionPolicy::LruK);
        assert_eq!(policy.name(), "lru_k");
        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Lru);
    }
}
