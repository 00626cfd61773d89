//! Configuration for [`AdaptiveCache`](crate::cache::AdaptiveCache) and its
//! [`CircuitBreaker`](crate::breaker::CircuitBreaker).
//!
//! Every field is optional when deserializing: missing fields take the
//! documented defaults, so a host can embed a partial table in its own config
//! file and let the rest fall back.
//!
//! ## CacheConfig
//!
//! | Field                | Type                    | Default       |
//! |----------------------|-------------------------|---------------|
//! | `max_entries`        | `usize`                 | 1000          |
//! | `max_memory_mb`      | `usize`                 | 100           |
//! | `default_ttl_secs`   | `u64`                   | 300           |
//! | `eviction_policy`    | [`EvictionPolicy`]      | `lru`         |
//! | `lru_k`              | `usize`                 | 2             |
//! | `refresh_threshold`  | `f64`                   | 0.2           |
//! | `soft_ttl_secs`      | `Option<u64>`           | `None`        |
//! | `request_coalescing` | `bool`                  | `true`        |
//! | `cleanup_interval_secs` | `u64`                | 60            |
//! | `compression`        | [`CompressionConfig`]   | enabled, 1 KiB|
//! | `adaptive_ttl`       | [`AdaptiveTtlConfig`]   | enabled       |
//! | `circuit_breaker`    | [`CircuitBreakerConfig`]| enabled       |
//! | `segmentation`       | [`SegmentationConfig`]  | disabled      |
//! | `negative_cache`     | [`NegativeCacheConfig`] | enabled, 30 s |
//! | `persistence`        | [`PersistenceConfig`]   | disabled      |
//!
//! ## Example Usage
//!
//! ```
//! use cacheshield::config::CacheConfig;
//! use cacheshield::policy::EvictionPolicy;
//!
//! let config = CacheConfig::from_toml_str(
//!     r#"
//!     max_entries = 500
//!     eviction_policy = "lru_k"
//!     lru_k = 3
//!
//!     [circuit_breaker]
//!     failure_threshold = 10
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.max_entries, 500);
//! assert_eq!(config.eviction_policy, EvictionPolicy::LruK);
//! assert_eq!(config.circuit_breaker.failure_threshold, 10);
//! // untouched fields keep their defaults
//! assert_eq!(config.default_ttl_secs, 300);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::EvictionPolicy;

/// Upper bound for the maintenance periods (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// Top-level cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry-count ceiling across all segments.
    pub max_entries: usize,
    /// Memory ceiling for stored values, in MiB.
    pub max_memory_mb: usize,
    /// TTL used when a caller does not pass one.
    pub default_ttl_secs: u64,
    /// Which entry to evict under pressure.
    pub eviction_policy: EvictionPolicy,
    /// History depth for [`EvictionPolicy::LruK`].
    pub lru_k: usize,
    /// Fraction of the TTL below which `get_or_refresh` triggers a background
    /// refresh while still serving the cached value.
    pub refresh_threshold: f64,
    /// Grace period after expiry during which a stale value is served while
    /// a refresh runs.
    pub soft_ttl_secs: Option<u64>,
    /// Merge concurrent fetches for the same key into one upstream call.
    pub request_coalescing: bool,
    /// Period of the maintenance task's expiry sweep.
    pub cleanup_interval_secs: u64,
    pub compression: CompressionConfig,
    pub adaptive_ttl: AdaptiveTtlConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub segmentation: SegmentationConfig,
    pub negative_cache: NegativeCacheConfig,
    pub persistence: PersistenceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_memory_mb: 100,
            default_ttl_secs: 300,
            eviction_policy: EvictionPolicy::Lru,
            lru_k: 2,
            refresh_threshold: 0.2,
            soft_ttl_secs: None,
            request_coalescing: true,
            cleanup_interval_secs: 60,
            compression: CompressionConfig::default(),
            adaptive_ttl: AdaptiveTtlConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            segmentation: SegmentationConfig::default(),
            negative_cache: NegativeCacheConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Parses a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig =
            toml::from_str(input).map_err(|e| ConfigError::new(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Memory ceiling in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn soft_ttl(&self) -> Option<Duration> {
        self.soft_ttl_secs.map(Duration::from_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    /// Checks every parameter, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::new("max_entries must be > 0"));
        }
        if self.max_memory_mb == 0 {
            return Err(ConfigError::new("max_memory_mb must be > 0"));
        }
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::new("default_ttl_secs must be > 0"));
        }
        if self.lru_k == 0 {
            return Err(ConfigError::new("lru_k must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.refresh_threshold) {
            return Err(ConfigError::new("refresh_threshold must be within [0, 1]"));
        }
        self.compression.validate()?;
        self.adaptive_ttl.validate()?;
        self.circuit_breaker.validate()?;
        self.segmentation.validate()?;
        self.negative_cache.validate()?;
        self.persistence.validate()?;
        if self.cleanup_interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::new(format!(
                "cleanup_interval_secs must be <= {MAX_INTERVAL_SECS}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Value compression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Serialized size above which compression is attempted.
    pub threshold_bytes: usize,
    /// Minimum fraction of space compression must save to be kept.
    pub min_savings: f64,
    /// gzip level, 0 to 9.
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 1024,
            min_savings: 0.2,
            level: 6,
        }
    }
}

impl CompressionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.min_savings) {
            return Err(ConfigError::new("compression.min_savings must be within [0, 1)"));
        }
        if self.level > 9 {
            return Err(ConfigError::new("compression.level must be <= 9"));
        }
        Ok(())
    }
}

/// Adaptive TTL bounds and the update-rate factors that drive them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveTtlConfig {
    pub enabled: bool,
    /// Floor for shrunk TTLs (never above the base TTL).
    pub min_ttl_secs: u64,
    /// Ceiling for extended TTLs.
    pub max_ttl_secs: u64,
    /// Updates arriving more often than `fast_update_factor` times per base
    /// TTL shrink the TTL to `fast_update_factor * interval`.
    pub fast_update_factor: f64,
    /// Updates rarer than once per `slow_update_factor * base` extend the TTL.
    pub slow_update_factor: f64,
    /// Multiplier applied to the base TTL when extending.
    pub extension_factor: f64,
}

impl Default for AdaptiveTtlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_ttl_secs: 60,
            max_ttl_secs: 3600,
            fast_update_factor: 2.0,
            slow_update_factor: 2.0,
            extension_factor: 2.0,
        }
    }
}

impl AdaptiveTtlConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ttl_secs > self.max_ttl_secs {
            return Err(ConfigError::new(
                "adaptive_ttl.min_ttl_secs must be <= adaptive_ttl.max_ttl_secs",
            ));
        }
        if self.fast_update_factor < 1.0
            || self.slow_update_factor < 1.0
            || self.extension_factor < 1.0
        {
            return Err(ConfigError::new("adaptive_ttl factors must be >= 1.0"));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When disabled, every call goes straight to the operation.
    pub enabled: bool,
    /// Failures within the window required to open.
    pub failure_threshold: u32,
    /// Minimum requests within the window before the breaker may open.
    pub volume_threshold: u32,
    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,
    /// Probe calls admitted concurrently while half-open.
    pub half_open_max_calls: u32,
    /// Rolling window for failure and success timestamps.
    pub window_ms: u64,
    /// Open duration before the first half-open probe.
    pub base_timeout_ms: u64,
    /// Upper bound for the exponential open duration.
    pub max_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            volume_threshold: 10,
            success_threshold: 3,
            half_open_max_calls: 3,
            window_ms: 60_000,
            base_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.base_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::new("circuit_breaker.failure_threshold must be > 0"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::new("circuit_breaker.success_threshold must be > 0"));
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::new("circuit_breaker.half_open_max_calls must be > 0"));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::new("circuit_breaker.window_ms must be > 0"));
        }
        if self.base_timeout_ms > self.max_timeout_ms {
            return Err(ConfigError::new(
                "circuit_breaker.base_timeout_ms must be <= circuit_breaker.max_timeout_ms",
            ));
        }
        Ok(())
    }
}

/// Key-space partitioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub enabled: bool,
    /// Entry cap for each segment.
    pub max_entries_per_segment: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries_per_segment: 100,
        }
    }
}

impl SegmentationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.max_entries_per_segment == 0 {
            return Err(ConfigError::new(
                "segmentation.max_entries_per_segment must be > 0",
            ));
        }
        Ok(())
    }
}

/// Negative cache window and its Bloom filter sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegativeCacheConfig {
    pub enabled: bool,
    /// How long a failed key short-circuits further fetches.
    pub ttl_secs: u64,
    pub expected_elements: usize,
    pub false_positive_rate: f64,
}

impl Default for NegativeCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 30,
            expected_elements: 10_000,
            false_positive_rate: 0.01,
        }
    }
}

impl NegativeCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.expected_elements == 0 {
            return Err(ConfigError::new("negative_cache.expected_elements must be > 0"));
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(ConfigError::new(
                "negative_cache.false_positive_rate must be within (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Warm-start snapshot settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// Period of the maintenance task's snapshot write.
    pub interval_secs: u64,
    /// Entries larger than this are left out of the snapshot.
    pub max_entry_bytes: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(".cache/cacheshield-snapshot.json"),
            interval_secs: 300,
            max_entry_bytes: 100 * 1024,
        }
    }
}

impl PersistenceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::new(format!(
                "persistence.interval_secs must be <= {MAX_INTERVAL_SECS}"
            )));
        }
        Ok(())
    }
}
