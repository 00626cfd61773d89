//! # Metrics Traits
//!
//! Recording, snapshotting, and export are kept apart:
//!
//! ```text
//!   AdaptiveCache ──records──► CacheCounters (atomic cells)
//!        │
//!        └──MetricsSnapshotProvider::snapshot()──► MetricsSnapshot
//!                                                      │
//!                                 MetricsExporter::export(&snapshot)
//!                                                      ▼
//!                                      PrometheusTextExporter, logs, ...
//! ```
//!
//! - Production: take a snapshot on a schedule and hand it to an exporter.
//! - Bench/Test: snapshot directly and reset between runs.

/// Read a point-in-time snapshot.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Reset counters between tests or benchmark iterations.
pub trait MetricsReset {
    fn reset_metrics(&self);
}

/// Publish metrics to a monitoring backend.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
