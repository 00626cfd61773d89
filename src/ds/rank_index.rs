//! Ordered victim index.
//!
//! Keeps every key at its current eviction rank so the next victim is the
//! first slot of a `BTreeMap`. Rank changes move the key's slot.
//!
//! ## Architecture
//!
//! ```text
//!   order: BTreeMap<(primary, tiebreak, seq), key>    ascending: evict first
//!   slots: FxHashMap<key, (primary, tiebreak, seq)>   where each key sits now
//!
//!   update("b", (4, 0), 1):
//!     slots["b"] = (2, 0, 1)  ──► order.remove((2, 0, 1))
//!                              ──► order.insert((4, 0, 1), "b")
//! ```
//!
//! `seq` must be stable per key. It makes every slot unique, so keys with
//! equal ranks are ordered by it.
//!
//! ## Operations
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `update`  | O(log n)   |
//! | `remove`  | O(log n)   |
//! | `first`   | O(log n)   |
//! | `rank_of` | O(1)       |
//!
//! ## Example Usage
//!
//! ```
//! use cacheshield::ds::RankIndex;
//!
//! let mut index = RankIndex::new();
//! index.update("a", (5, 0), 0);
//! index.update("b", (2, 0), 1);
//! assert_eq!(index.first(None), Some("b"));
//!
//! index.update("b", (9, 0), 1);
//! assert_eq!(index.first(None), Some("a"));
//! assert_eq!(index.first(Some("a")), Some("b"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// `(primary, tiebreak)`; lower ranks are evicted first.
pub type Rank = (u64, u64);

type Slot = (u64, u64, u64);

#[derive(Debug, Clone, Default)]
pub struct RankIndex {
    order: BTreeMap<Slot, Arc<str>>,
    slots: FxHashMap<Arc<str>, Slot>,
}

impl RankIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn rank_of(&self, key: &str) -> Option<Rank> {
        self.slots.get(key).map(|&(primary, tiebreak, _)| (primary, tiebreak))
    }

    /// Inserts `key` at `rank`, or moves it there.
    pub fn update(&mut self, key: &str, rank: Rank, seq: u64) {
        let slot = (rank.0, rank.1, seq);
        if let Some(current) = self.slots.get_mut(key) {
            if *current != slot {
                let old = std::mem::replace(current, slot);
                if let Some(name) = self.order.remove(&old) {
                    self.order.insert(slot, name);
                }
            }
            return;
        }
        let name: Arc<str> = Arc::from(key);
        self.slots.insert(Arc::clone(&name), slot);
        self.order.insert(slot, name);
    }

    pub fn remove(&mut self, key: &str) -> Option<Rank> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot);
        Some((slot.0, slot.1))
    }

    /// Lowest-ranked key other than `exclude`.
    pub fn first(&self, exclude: Option<&str>) -> Option<&str> {
        self.order
            .values()
            .map(|name| &**name)
            .find(|name| Some(*name) != exclude)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.slots.clear();
    }

    #[cfg(test)]
    pub(crate) fn debug_validate_invariants(&self) {
        assert_eq!(self.order.len(), self.slots.len());
        for (slot, name) in &self.order {
            assert_eq!(self.slots.get(name), Some(slot));
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// `first` always returns a key holding the minimum slot.
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_first_is_minimum(
            ops in prop::collection::vec((0u8..16, 0u64..8, 0u64..8, any::<bool>()), 0..200)
        ) {
            let mut index = RankIndex::new();
            let mut shadow: std::collections::HashMap<String, Slot> = Default::default();
            for (k, primary, tiebreak, remove) in ops {
                let key = format!("k{k}");
                let seq = u64::from(k);
                if remove {
                    index.remove(&key);
                    shadow.remove(&key);
                } else {
                    index.update(&key, (primary, tiebreak), seq);
                    shadow.insert(key, (primary, tiebreak, seq));
                }
                index.debug_validate_invariants();
                let expected = shadow.iter().min_by_key(|(_, slot)| **slot).map(|(k, _)| k.as_str());
                prop_assert_eq!(index.first(None), expected);
                prop_assert_eq!(index.len(), shadow.len());
            }
        }
    }
}
