// ==============================================
// METRICS EXPORT TESTS (integration)
// ==============================================
//
// Counters recorded by the cache flow through the snapshot traits into the
// Prometheus text exporter.

use std::time::Duration;

use cacheshield::cache::{AdaptiveCache, RefreshOptions};
use cacheshield::config::CacheConfig;
use cacheshield::error::BoxError;
use cacheshield::metrics::{
    MetricsExporter, MetricsReset, MetricsSnapshot, MetricsSnapshotProvider,
    PrometheusTextExporter,
};

fn cache() -> AdaptiveCache<String> {
    AdaptiveCache::new(CacheConfig {
        max_entries: 2,
        ..CacheConfig::default()
    })
    .unwrap()
}

mod snapshot_provider {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_cache_activity() {
        let cache = cache();
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        cache.set("c", "3".into(), None);
        cache.get("c");
        cache.get("a");
        let _ = cache
            .get_or_refresh(
                "c",
                Some(Duration::from_secs(60)),
                || async { Ok::<_, BoxError>("unused".to_string()) },
                RefreshOptions::default(),
            )
            .await;

        let snapshot: MetricsSnapshot = cache.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.api_calls_saved, 1);
        assert_eq!(snapshot.entries, 2);
        assert!((snapshot.hit_rate - 2.0 / 3.0).abs() < 1e-9);

        cache.reset_metrics();
        let snapshot = cache.snapshot();
        assert_eq!((snapshot.hits, snapshot.misses, snapshot.evictions), (0, 0, 0));
        assert_eq!(snapshot.entries, 2, "reset leaves entries alone");
    }
}

mod prometheus {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn exports_cache_and_breaker_metrics() {
        let cache = cache();
        cache.set("a", "1".into(), None);
        cache.get("a");

        let exporter = PrometheusTextExporter::new("edge", Vec::new());
        exporter.export(&cache.metrics());
        exporter.export(&cache.circuit_stats());
        let text = String::from_utf8(exporter.into_inner()).unwrap();

        for line in [
            "# TYPE edge_hits_total counter",
            "edge_hits_total 1",
            "edge_misses_total 0",
            "edge_entries 1",
            "edge_circuit_state 0",
            "edge_circuit_trips_total 0",
        ] {
            assert!(text.contains(line), "missing `{line}` in:\n{text}");
        }
    }
}
