//! Error types for the cacheshield library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Every failure the cache can surface. Fetch and circuit
//!   errors reach callers; compression and persistence errors are contained
//!   inside the cache and only counted in metrics.
//! - [`ConfigError`]: Returned when configuration parameters are invalid
//!   (e.g. zero capacity, out-of-range ratios).
//!
//! ## Propagation
//!
//! ```text
//!   fetch() ──Err──► CacheError::Fetch ──► caller + every coalesced waiter
//!                                        (unless a stale value can be served)
//!   breaker Open ──► CacheError::CircuitOpen   (fail fast, fetch not invoked)
//!   negative hit ──► CacheError::NegativeCached (fail fast, fetch not invoked)
//!   compression  ──► CacheError::Compression   (logged, entry stored raw)
//!   snapshot I/O ──► CacheError::Io / Serialization (logged, cache keeps running)
//! ```
//!
//! `CacheError` is `Clone`: a single upstream failure is handed to every
//! waiter of a coalesced fetch, so the source error is shared behind an `Arc`.
//!
//! ## Example Usage
//!
//! ```
//! use cacheshield::error::ConfigError;
//! use cacheshield::config::CacheConfig;
//!
//! let mut config = CacheConfig::default();
//! config.max_entries = 0;
//! let err: ConfigError = config.validate().unwrap_err();
//! assert!(err.to_string().contains("max_entries"));
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by caller-supplied fetch functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Errors produced by the cache, its circuit breaker and its data structures.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The caller-supplied fetch function failed.
    #[error("fetch failed for `{key}`: {source}")]
    Fetch {
        key: String,
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The circuit breaker is open; the upstream was not called.
    #[error("circuit open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// The key failed upstream recently and is still in the negative cache.
    #[error("`{key}` is negatively cached for another {remaining:?}")]
    NegativeCached { key: String, remaining: Duration },

    /// Compressing or decompressing a value failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Encoding or decoding a value or snapshot failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Snapshot file access failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation rejected because of incompatible or invalid parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A key pattern could not be compiled.
    #[error("invalid key pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The in-flight fetch this caller was waiting on was dropped.
    #[error("in-flight fetch for `{key}` was cancelled")]
    Cancelled { key: String },
}

impl CacheError {
    /// Wraps a fetch failure for `key`.
    pub fn fetch(key: impl Into<String>, source: BoxError) -> Self {
        CacheError::Fetch {
            key: key.into(),
            source: Arc::from(source),
        }
    }

    /// Returns `true` when the error came from the upstream fetch itself.
    pub fn is_fetch(&self) -> bool {
        matches!(self, CacheError::Fetch { .. })
    }

    /// Returns `true` when the call was rejected without reaching upstream.
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            CacheError::CircuitOpen { .. } | CacheError::NegativeCached { .. }
        )
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for CacheError {
    fn from(err: ConfigError) -> Self {
        CacheError::InvalidConfiguration(err.message().to_string())
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
///
/// Produced by [`CacheConfig::validate`](crate::config::CacheConfig::validate)
/// and the builder's `try_build()`. Carries a human-readable description of
/// which parameter failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
