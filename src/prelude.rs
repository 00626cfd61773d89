pub use crate::breaker::{CircuitBreaker, CircuitState, CircuitStats};
pub use crate::builder::AdaptiveCacheBuilder;
pub use crate::cache::{AdaptiveCache, MaintenanceHandle, RefreshOptions};
pub use crate::config::{
    AdaptiveTtlConfig, CacheConfig, CircuitBreakerConfig, CompressionConfig, NegativeCacheConfig,
    PersistenceConfig, SegmentationConfig,
};
pub use crate::ds::{AccessHistory, BloomFilter, BloomStats, KeyIndex, KeyIndexStats};
pub use crate::error::{BoxError, CacheError, ConfigError};
pub use crate::metrics::{MetricsExporter, MetricsSnapshot, PrometheusTextExporter};
pub use crate::policy::EvictionPolicy;
