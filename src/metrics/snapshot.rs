use serde::{Deserialize, Serialize};

use crate::breaker::CircuitState;

/// Point-in-time view of an [`AdaptiveCache`](crate::cache::AdaptiveCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub errors: u64,
    /// Requests answered without an upstream call: fresh and stale hits,
    /// coalesced waiters, and negative-cache rejections.
    pub api_calls_saved: u64,
    /// `hits / (hits + misses)`, 0 with no traffic.
    pub hit_rate: f64,

    // gauges captured at snapshot time
    pub entries: usize,
    pub memory_bytes: usize,
    pub segments: usize,
    pub pending_fetches: usize,
    pub negative_entries: usize,
    pub circuit_state: CircuitState,
}

pub(crate) fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
