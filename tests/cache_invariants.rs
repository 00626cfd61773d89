// ==============================================
// CACHE INVARIANT TESTS (integration)
// ==============================================
//
// Property tests driving random operation sequences through the public
// cache API and checking the bookkeeping after every step.

use cacheshield::builder::AdaptiveCacheBuilder;
use cacheshield::cache::AdaptiveCache;
use cacheshield::policy::EvictionPolicy;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u16),
    Get(u8),
    Delete(u8),
    Scan(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..32, any::<u16>()).prop_map(|(k, v)| Op::Set(k, v)),
        3 => (0u8..32).prop_map(Op::Get),
        1 => (0u8..32).prop_map(Op::Delete),
        1 => (0u8..4).prop_map(Op::Scan),
    ]
}

fn policy() -> impl Strategy<Value = EvictionPolicy> {
    prop_oneof![
        Just(EvictionPolicy::Lru),
        Just(EvictionPolicy::Lfu),
        Just(EvictionPolicy::Fifo),
        Just(EvictionPolicy::LruK),
    ]
}

/// Keys spread over four prefixes so segmentation has something to split.
fn key(k: u8) -> String {
    format!("ns{}:{}", k % 4, k)
}

fn apply(cache: &AdaptiveCache<u16>, op: &Op) {
    match *op {
        Op::Set(k, v) => {
            cache.set(&key(k), v, None);
        },
        Op::Get(k) => {
            cache.get(&key(k));
        },
        Op::Delete(k) => {
            cache.delete([key(k)]);
        },
        Op::Scan(ns) => {
            let _ = cache.scan_and_delete(&format!("ns{ns}:*"));
        },
    }
}

fn check(cache: &AdaptiveCache<u16>, max_entries: usize) -> Result<(), TestCaseError> {
    let metrics = cache.metrics();
    prop_assert!(cache.len() <= max_entries);
    prop_assert_eq!(metrics.entries, cache.len());
    prop_assert_eq!(cache.key_index_stats().total_keys, cache.len());
    prop_assert!(metrics.segments <= cache.len().max(1));
    if cache.is_empty() {
        prop_assert_eq!(metrics.memory_bytes, 0);
    }
    Ok(())
}

proptest! {
    /// Entry count, index and memory stay consistent under any sequence.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_bookkeeping_consistent(
        max_entries in 1usize..16,
        policy in policy(),
        ops in prop::collection::vec(op(), 0..200)
    ) {
        let cache = AdaptiveCacheBuilder::new(max_entries)
            .policy(policy)
            .build::<u16>()
            .unwrap();
        for op in &ops {
            apply(&cache, op);
            check(&cache, max_entries)?;
        }
    }

    /// Segment caps bound every segment on top of the global limit.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_segment_caps_hold(
        cap in 1usize..6,
        ops in prop::collection::vec(op(), 0..200)
    ) {
        let cache = AdaptiveCacheBuilder::new(64)
            .segmented(cap)
            .build::<u16>()
            .unwrap();
        for op in &ops {
            apply(&cache, op);
            check(&cache, 64)?;
            for ns in 0..4 {
                let entries = cache.segment_stats(&format!("ns{ns}")).map_or(0, |(_, n)| n);
                prop_assert!(entries <= cap, "segment ns{} holds {} > {}", ns, entries, cap);
            }
        }
    }

    /// The most recent set of a key is readable until evicted or deleted.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_get_returns_last_set(
        ops in prop::collection::vec((0u8..8, any::<u16>()), 1..100)
    ) {
        let cache = AdaptiveCacheBuilder::new(16).build::<u16>().unwrap();
        let mut last = std::collections::HashMap::new();
        for (k, v) in ops {
            cache.set(&key(k), v, None);
            last.insert(k, v);
        }
        for (k, v) in last {
            prop_assert_eq!(cache.get(&key(k)), Some(v));
        }
    }

    /// Every get counts exactly one hit or miss.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_hits_plus_misses_equal_gets(
        ops in prop::collection::vec(op(), 0..150)
    ) {
        let cache = AdaptiveCacheBuilder::new(8).build::<u16>().unwrap();
        let mut gets = 0u64;
        for op in &ops {
            if matches!(op, Op::Get(_)) {
                gets += 1;
            }
            apply(&cache, op);
        }
        let metrics = cache.metrics();
        prop_assert_eq!(metrics.hits + metrics.misses, gets);
    }
}
