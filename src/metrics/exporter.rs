use std::fmt::Display;
use std::io::Write;

use parking_lot::Mutex;

use crate::breaker::CircuitStats;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for cache metrics snapshots.
///
/// This exporter writes in the Prometheus text exposition format so it can be
/// scraped by Prometheus or forwarded to an OpenTelemetry collector.
///
/// ```
/// use cacheshield::metrics::{MetricsExporter, PrometheusTextExporter};
/// use cacheshield::breaker::CircuitStats;
/// use cacheshield::breaker::CircuitState;
///
/// let exporter = PrometheusTextExporter::new("api_cache", Vec::new());
/// exporter.export(&CircuitStats {
///     state: CircuitState::Closed,
///     failures_in_window: 0,
///     successes_in_window: 4,
///     trips: 1,
///     rejections: 0,
///     reset_count: 0,
///     retry_after: None,
/// });
/// let text = String::from_utf8(exporter.into_inner()).unwrap();
/// assert!(text.contains("api_cache_circuit_trips_total 1"));
/// ```
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_metric(&self, kind: &str, name: &str, value: impl Display) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_counter(&self, name: &str, value: u64) {
        self.write_metric("counter", name, value);
    }

    fn write_gauge(&self, name: &str, value: impl Display) {
        self.write_metric("gauge", name, value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send> MetricsExporter<MetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &MetricsSnapshot) {
        self.write_counter(&self.metric_name("hits_total"), snapshot.hits);
        self.write_counter(&self.metric_name("misses_total"), snapshot.misses);
        self.write_counter(&self.metric_name("evictions_total"), snapshot.evictions);
        self.write_counter(&self.metric_name("errors_total"), snapshot.errors);
        self.write_counter(
            &self.metric_name("api_calls_saved_total"),
            snapshot.api_calls_saved,
        );
        self.write_gauge(&self.metric_name("hit_rate"), snapshot.hit_rate);
        self.write_gauge(&self.metric_name("entries"), snapshot.entries);
        self.write_gauge(&self.metric_name("memory_bytes"), snapshot.memory_bytes);
        self.write_gauge(&self.metric_name("segments"), snapshot.segments);
        self.write_gauge(
            &self.metric_name("pending_fetches"),
            snapshot.pending_fetches,
        );
        self.write_gauge(
            &self.metric_name("negative_entries"),
            snapshot.negative_entries,
        );
        self.write_gauge(
            &self.metric_name("circuit_state"),
            snapshot.circuit_state.as_gauge(),
        );
    }
}

impl<W: Write + Send> MetricsExporter<CircuitStats> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &CircuitStats) {
        self.write_counter(&self.metric_name("circuit_trips_total"), snapshot.trips);
        self.write_counter(
            &self.metric_name("circuit_rejections_total"),
            snapshot.rejections,
        );
        self.write_gauge(
            &self.metric_name("circuit_state"),
            snapshot.state.as_gauge(),
        );
        self.write_gauge(
            &self.metric_name("circuit_failures_in_window"),
            snapshot.failures_in_window,
        );
        self.write_gauge(
            &self.metric_name("circuit_successes_in_window"),
            snapshot.successes_in_window,
        );
        self.write_gauge(
            &self.metric_name("circuit_reset_count"),
            snapshot.reset_count,
        );
    }
}
