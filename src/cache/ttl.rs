//! Adaptive TTL: shrink for keys that change often, extend for stable ones.
//!
//! ```text
//!   interval = time since the previous set of the same key
//!
//!   interval < base / fast_factor   ──► max(min(min_ttl, base), fast_factor * interval)
//!   interval > base * slow_factor   ──► max(base, min(max_ttl, base * extension_factor))
//!   otherwise / first set           ──► base
//! ```

use std::time::Duration;

use crate::config::AdaptiveTtlConfig;

#[derive(Debug, Clone)]
pub struct AdaptiveTtl {
    config: AdaptiveTtlConfig,
}

impl AdaptiveTtl {
    pub fn new(config: AdaptiveTtlConfig) -> Self {
        Self { config }
    }

    /// TTL for a write with the given base and inter-update interval.
    pub fn compute(&self, base: Duration, interval: Option<Duration>) -> Duration {
        let Some(interval) = interval else {
            return base;
        };
        if !self.config.enabled {
            return base;
        }

        let min_ttl = Duration::from_secs(self.config.min_ttl_secs);
        let max_ttl = Duration::from_secs(self.config.max_ttl_secs);
        let base_secs = base.as_secs_f64();
        let interval_secs = interval.as_secs_f64();

        if interval_secs < base_secs / self.config.fast_update_factor {
            let floor = min_ttl.min(base);
            let shrunk = Duration::try_from_secs_f64(interval_secs * self.config.fast_update_factor)
                .unwrap_or(base);
            return shrunk.max(floor);
        }

        if interval_secs > base_secs * self.config.slow_update_factor {
            let extended = Duration::try_from_secs_f64(base_secs * self.config.extension_factor)
                .unwrap_or(max_ttl);
            return extended.min(max_ttl).max(base);
        }

        base
    }
}
