//! cacheshield: adaptive caching and failure isolation in front of a slow,
//! rate-limited upstream.
//!
//! The entry point is [`cache::AdaptiveCache`]. Supporting pieces:
//! [`breaker::CircuitBreaker`] wraps every upstream call,
//! [`ds::BloomFilter`] backs the negative cache, and [`ds::KeyIndex`] stores
//! keys for pattern invalidation.

pub mod breaker;
pub mod builder;
pub mod cache;
pub mod config;
pub mod ds;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod prelude;
