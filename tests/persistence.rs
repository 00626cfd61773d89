// ==============================================
// PERSISTENCE & MAINTENANCE TESTS (integration)
// ==============================================
//
// Snapshot save/restore against a real filesystem, plus the background
// maintenance task.

use std::time::{Duration, SystemTime};

use cacheshield::builder::AdaptiveCacheBuilder;
use cacheshield::cache::persist::{self, Snapshot, SnapshotEntry, SnapshotRecord};
use cacheshield::cache::AdaptiveCache;
use cacheshield::error::CacheError;
use tempfile::TempDir;

fn cache() -> AdaptiveCache<String> {
    AdaptiveCacheBuilder::new(100).build().unwrap()
}

fn record(key: &str, value: &str, created_at_ms: u64, ttl_ms: u64) -> SnapshotRecord<String> {
    SnapshotRecord {
        key: key.to_owned(),
        entry: SnapshotEntry {
            value: value.to_owned(),
            created_at_ms,
            ttl_ms,
            hit_count: 0,
            update_count: 0,
            size_bytes: value.len() + 2,
        },
    }
}

// ==============================================
// Save / Restore
// ==============================================

mod save_restore {
    use super::*;

    #[tokio::test]
    async fn warm_start_restores_live_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");

        let source = cache();
        source.set("user:1", "Ada".into(), Some(Duration::from_secs(60)));
        source.set("user:2", "Grace".into(), Some(Duration::from_secs(600)));
        assert_eq!(source.save_snapshot_to(&path).await.unwrap(), 2);
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let target = cache();
        assert_eq!(target.restore_from(&path).await.unwrap(), 2);
        assert_eq!(target.get("user:1").as_deref(), Some("Ada"));
        assert_eq!(target.get("user:2").as_deref(), Some("Grace"));

        let remaining = target.ttl_remaining("user:1");
        assert!((58..=60).contains(&remaining), "remaining ttl was {remaining}");
    }

    #[tokio::test]
    async fn compressed_and_oversized_entries_are_not_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        let compressed = cache();
        compressed.set("blob", "abcd".repeat(10_000), None);
        compressed.set("small", "v".into(), None);
        assert_eq!(compressed.save_snapshot_to(&path).await.unwrap(), 1);

        let raw = AdaptiveCacheBuilder::new(100)
            .compression(false)
            .build::<String>()
            .unwrap();
        raw.set("huge", "x".repeat(200 * 1024), None);
        raw.set("small", "v".into(), None);
        assert_eq!(raw.save_snapshot_to(&path).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_records_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let now_ms = persist::unix_millis(SystemTime::now());

        let snapshot = Snapshot::new(vec![
            record("stale", "old", now_ms - 120_000, 60_000),
            record("live", "new", now_ms - 1_000, 60_000),
        ]);
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let cache = cache();
        assert_eq!(cache.restore_from(&path).await.unwrap(), 1);
        assert!(!cache.contains("stale"));
        assert_eq!(cache.get("live").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn live_keys_win_over_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let now_ms = persist::unix_millis(SystemTime::now());
        let snapshot = Snapshot::new(vec![record("k", "from-disk", now_ms, 60_000)]);
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let cache = cache();
        cache.set("k", "in-memory".into(), None);
        assert_eq!(cache.restore_from(&path).await.unwrap(), 0);
        assert_eq!(cache.get("k").as_deref(), Some("in-memory"));
    }

    #[tokio::test]
    async fn missing_file_restores_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = cache();
        assert_eq!(cache.restore_from(&dir.path().join("absent.json")).await.unwrap(), 0);
        assert_eq!(cache.metrics().errors, 0);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let cache = cache();
        let err = cache.restore_from(&path).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert_eq!(cache.metrics().errors, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unknown_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot: Snapshot<String> = Snapshot::new(Vec::new());
        snapshot.version = 99;
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let err = cache().restore_from(&path).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(ref msg) if msg.contains("99")));
    }

    #[tokio::test]
    async fn configured_path_is_used() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("configured.json");
        let cache = AdaptiveCacheBuilder::new(10)
            .persistence(&path)
            .build::<String>()
            .unwrap();
        cache.set("k", "v".into(), None);
        assert_eq!(cache.save_snapshot().await.unwrap(), 1);

        let restored = AdaptiveCacheBuilder::new(10)
            .persistence(&path)
            .build::<String>()
            .unwrap();
        assert_eq!(restored.restore().await.unwrap(), 1);
    }
}

// ==============================================
// Maintenance Task
// ==============================================

mod maintenance {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn periodic_cleanup_purges_expired_entries() {
        let cache = AdaptiveCacheBuilder::new(10)
            .cleanup_interval(Duration::from_secs(1))
            .build::<String>()
            .unwrap();
        cache.set("short", "v".into(), Some(Duration::from_secs(1)));
        cache.set("long", "v".into(), Some(Duration::from_secs(60)));

        let handle = cache.start_maintenance();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.contains("long"));
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_writes_final_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let cache = AdaptiveCacheBuilder::new(10)
            .persistence(&path)
            .build::<String>()
            .unwrap();
        cache.set("k", "v".into(), None);

        let handle = cache.start_maintenance();
        handle.shutdown().await;

        assert!(path.exists());
        let loaded = persist::load::<String>(&path).await.unwrap().unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].key, "k");
    }
}
