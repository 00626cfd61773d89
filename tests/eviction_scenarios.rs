// ==============================================
// EVICTION SCENARIO TESTS (integration)
// ==============================================
//
// Capacity, memory, and segment pressure under each eviction policy,
// observed through the public cache API.

use cacheshield::builder::AdaptiveCacheBuilder;
use cacheshield::cache::AdaptiveCache;
use cacheshield::policy::EvictionPolicy;

fn cache_with(policy: EvictionPolicy, max_entries: usize) -> AdaptiveCache<u32> {
    AdaptiveCacheBuilder::new(max_entries)
        .policy(policy)
        .build()
        .unwrap()
}

// ==============================================
// Entry Count Limit
// ==============================================

mod count_limit {
    use super::*;

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let cache = cache_with(EvictionPolicy::Lru, 3);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        cache.get("a");
        cache.get("b");

        cache.set("d", 4, None);

        assert!(!cache.contains("c"), "c was the least recently used");
        for key in ["a", "b", "d"] {
            assert!(cache.contains(key), "{key} should survive");
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn fifo_ignores_reads_and_overwrites() {
        let cache = cache_with(EvictionPolicy::Fifo, 3);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        for _ in 0..5 {
            cache.get("a");
        }
        cache.set("a", 10, None);

        cache.set("d", 4, None);

        assert!(!cache.contains("a"), "a was inserted first");
        assert!(cache.contains("b"));
    }

    #[test]
    fn lfu_evicts_least_frequently_used() {
        let cache = cache_with(EvictionPolicy::Lfu, 3);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        for _ in 0..3 {
            cache.get("a");
        }
        cache.get("b");
        cache.get("c");
        cache.get("c");

        cache.set("d", 4, None);

        assert!(!cache.contains("b"), "b had the fewest hits");
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn lfu_breaks_ties_by_recency() {
        let cache = cache_with(EvictionPolicy::Lfu, 2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.get("b");
        cache.get("a");

        cache.set("c", 3, None);

        assert!(!cache.contains("b"));
        assert!(cache.contains("a"));
    }

    #[test]
    fn lru_k_prefers_evicting_keys_with_short_history() {
        let cache = AdaptiveCacheBuilder::new(3)
            .policy(EvictionPolicy::LruK)
            .lru_k(2)
            .build::<u32>()
            .unwrap();
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.get("b");
        // a single, most recent access does not protect c
        cache.get("c");

        cache.set("d", 4, None);

        assert!(!cache.contains("c"));
        assert!(cache.contains("a"));
        assert!(cache.contains("b"));
    }

    #[test]
    fn lru_k_evicts_oldest_kth_access() {
        let cache = AdaptiveCacheBuilder::new(2)
            .policy(EvictionPolicy::LruK)
            .lru_k(2)
            .build::<u32>()
            .unwrap();
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.get("b");
        cache.get("b");
        cache.get("a");
        cache.get("a");

        cache.set("c", 3, None);

        assert!(!cache.contains("b"), "b's second most recent access is older than a's");
        assert!(cache.contains("a"));
    }
}

// ==============================================
// Memory Limit
// ==============================================

mod memory_limit {
    use super::*;

    #[test]
    fn large_values_evict_until_they_fit() {
        let cache = AdaptiveCacheBuilder::new(100)
            .max_memory_mb(1)
            .compression(false)
            .build::<String>()
            .unwrap();
        let payload = "x".repeat(300_000);

        for key in ["a", "b", "c"] {
            assert!(cache.set(key, payload.clone(), None));
        }
        assert_eq!(cache.len(), 3);

        assert!(cache.set("d", payload.clone(), None));
        assert!(!cache.contains("a"));
        assert_eq!(cache.len(), 3);

        let metrics = cache.metrics();
        assert_eq!(metrics.evictions, 1);
        assert!(metrics.memory_bytes <= 1024 * 1024);
        assert_eq!(metrics.memory_bytes, 3 * (payload.len() + 2));
    }

    #[test]
    fn compressed_values_round_trip() {
        let cache = AdaptiveCacheBuilder::new(10).build::<String>().unwrap();
        let payload = "abcd".repeat(10_000);

        assert!(cache.set("blob", payload.clone(), None));
        assert_eq!(cache.get("blob"), Some(payload.clone()));
        assert!(
            cache.metrics().memory_bytes < payload.len() / 10,
            "repetitive payload should be stored compressed"
        );
    }

    #[test]
    fn small_values_stay_uncompressed() {
        let cache = AdaptiveCacheBuilder::new(10).build::<String>().unwrap();
        cache.set("small", "tiny".to_string(), None);
        assert_eq!(cache.metrics().memory_bytes, "\"tiny\"".len());
    }
}

// ==============================================
// Segmentation
// ==============================================

mod segmentation {
    use super::*;

    #[test]
    fn segment_cap_evicts_within_segment_only() {
        let cache = AdaptiveCacheBuilder::new(100)
            .segmented(2)
            .build::<u32>()
            .unwrap();
        cache.set("post:1", 10, None);
        cache.set("user:1", 1, None);
        cache.set("user:2", 2, None);
        cache.get("user:1");

        cache.set("user:3", 3, None);

        assert!(!cache.contains("user:2"));
        assert!(cache.contains("user:1"));
        assert!(cache.contains("user:3"));
        assert!(cache.contains("post:1"), "other segments are untouched");

        let (accesses, entries) = cache.segment_stats("user").unwrap();
        assert_eq!(entries, 2);
        assert_eq!(accesses, 1);
        assert_eq!(cache.segment_stats("post").map(|(_, n)| n), Some(1));
        assert_eq!(cache.metrics().segments, 2);
    }

    #[test]
    fn empty_prefix_uses_default_segment() {
        let cache = AdaptiveCacheBuilder::new(100)
            .segmented(5)
            .build::<u32>()
            .unwrap();
        cache.set(":leading", 1, None);
        cache.set("/rooted", 2, None);
        cache.set("plain", 3, None);
        assert_eq!(cache.segment_stats("default").map(|(_, n)| n), Some(2));
        assert_eq!(cache.segment_stats("plain").map(|(_, n)| n), Some(1));
    }

    #[test]
    fn emptied_segments_are_dropped() {
        let cache = AdaptiveCacheBuilder::new(100)
            .segmented(5)
            .build::<u32>()
            .unwrap();
        cache.set("user:1", 1, None);
        cache.delete(["user:1"]);
        assert_eq!(cache.segment_stats("user"), None);
        assert_eq!(cache.metrics().segments, 0);
    }
}

// ==============================================
// Pattern Deletion
// ==============================================

mod pattern_deletion {
    use super::*;

    #[test]
    fn scan_and_delete_keeps_index_consistent() {
        let cache = cache_with(EvictionPolicy::Lru, 100);
        for (i, key) in ["user:1", "user:2", "user:3", "post:1", "session/abc"]
            .into_iter()
            .enumerate()
        {
            cache.set(key, i as u32, None);
        }

        assert_eq!(cache.scan_and_delete("user:*").unwrap(), 3);
        assert_eq!(cache.scan_and_delete("user:*").unwrap(), 0);
        assert_eq!(cache.scan_and_delete("session/*").unwrap(), 1);

        let stats = cache.key_index_stats();
        assert_eq!(stats.total_keys, 1);
        assert!(cache.contains("post:1"));
    }
}
