//! Fluent builder for [`AdaptiveCache`].
//!
//! Wraps a [`CacheConfig`] so callers can start from the defaults and
//! override only what they need, without spelling out nested config structs.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use cacheshield::builder::AdaptiveCacheBuilder;
//! use cacheshield::policy::EvictionPolicy;
//!
//! let cache = AdaptiveCacheBuilder::new(500)
//!     .policy(EvictionPolicy::LruK)
//!     .lru_k(3)
//!     .default_ttl(Duration::from_secs(120))
//!     .segmented(50)
//!     .build::<String>()
//!     .unwrap();
//!
//! assert!(cache.set("user:1", "Ada".to_string(), None));
//! assert_eq!(cache.config().max_entries, 500);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::AdaptiveCache;
use crate::config::{CacheConfig, CircuitBreakerConfig};
use crate::error::ConfigError;
use crate::policy::EvictionPolicy;

/// Builder for creating caches with a consistent API.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveCacheBuilder {
    config: CacheConfig,
}

impl AdaptiveCacheBuilder {
    /// Starts from the default configuration with `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            config: CacheConfig {
                max_entries,
                ..CacheConfig::default()
            },
        }
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    pub fn lru_k(mut self, k: usize) -> Self {
        self.config.lru_k = k;
        self
    }

    pub fn max_memory_mb(mut self, mb: usize) -> Self {
        self.config.max_memory_mb = mb;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl_secs = ttl.as_secs().max(1);
        self
    }

    pub fn refresh_threshold(mut self, threshold: f64) -> Self {
        self.config.refresh_threshold = threshold;
        self
    }

    pub fn soft_ttl(mut self, soft_ttl: Duration) -> Self {
        self.config.soft_ttl_secs = Some(soft_ttl.as_secs());
        self
    }

    pub fn request_coalescing(mut self, enabled: bool) -> Self {
        self.config.request_coalescing = enabled;
        self
    }

    /// Enables segmentation with a per-segment entry cap.
    pub fn segmented(mut self, max_entries_per_segment: usize) -> Self {
        self.config.segmentation.enabled = true;
        self.config.segmentation.max_entries_per_segment = max_entries_per_segment;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression.enabled = enabled;
        self
    }

    pub fn adaptive_ttl(mut self, enabled: bool) -> Self {
        self.config.adaptive_ttl.enabled = enabled;
        self
    }

    pub fn negative_ttl(mut self, ttl: Duration) -> Self {
        self.config.negative_cache.enabled = true;
        self.config.negative_cache.ttl_secs = ttl.as_secs();
        self
    }

    pub fn without_negative_cache(mut self) -> Self {
        self.config.negative_cache.enabled = false;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Enables snapshots at `path`.
    pub fn persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persistence.enabled = true;
        self.config.persistence.path = path.into();
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validates the configuration and builds the cache.
    pub fn build<V>(self) -> Result<AdaptiveCache<V>, ConfigError>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        AdaptiveCache::new(self.config)
    }
}
