pub mod cell;
pub mod exporter;
pub mod snapshot;
pub mod traits;

pub use cell::MetricsCell;
pub use exporter::PrometheusTextExporter;
pub use snapshot::MetricsSnapshot;
pub use traits::{MetricsExporter, MetricsReset, MetricsSnapshotProvider};

/// Process-lifetime counters of one cache.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub hits: MetricsCell,
    pub misses: MetricsCell,
    pub evictions: MetricsCell,
    pub errors: MetricsCell,
    pub api_calls_saved: MetricsCell,
}

impl CacheCounters {
    pub fn reset(&self) {
        self.hits.reset();
        self.misses.reset();
        self.evictions.reset();
        self.errors.reset();
        self.api_calls_saved.reset();
    }
}
