//! Circuit breaker guarding calls to the upstream fetch function.
//!
//! When the upstream keeps failing, the breaker trips and subsequent calls
//! fail fast with [`CacheError::CircuitOpen`] instead of piling more load on a
//! struggling dependency. After a backoff it admits a bounded number of probe
//! calls to test recovery.
//!
//! # State Machine
//!
//! ```text
//!   Closed ──(volume_threshold requests AND failure_threshold failures in window)──> Open
//!   Open ──(open for the current backoff)──> HalfOpen
//!   HalfOpen ──(success_threshold consecutive successes)──> Closed
//!   HalfOpen ──(any failure)──> Open   (reset_count += 1)
//! ```
//!
//! # Backoff
//!
//! ```text
//!   open duration = min(base_timeout * 2^reset_count, max_timeout)
//!
//!   reset_count:   0      1      2      3      4      ...
//!   (defaults)    30s    60s   120s   240s   300s    300s
//! ```
//!
//! `reset_count` returns to 0 once the breaker fully closes.
//!
//! # Windows
//!
//! Failure and success timestamps live in two rolling windows of
//! `window_ms`. Both are pruned on every record, so their lengths are the
//! request counts within the window.
//!
//! # Example
//!
//! ```
//! use cacheshield::breaker::{CircuitBreaker, CircuitState};
//! use cacheshield::config::CircuitBreakerConfig;
//! use cacheshield::error::CacheError;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig {
//!     failure_threshold: 2,
//!     volume_threshold: 2,
//!     ..CircuitBreakerConfig::default()
//! });
//!
//! for _ in 0..2 {
//!     let _ = breaker
//!         .execute(|| async { Err::<(), _>(CacheError::Io("upstream down".into())) })
//!         .await;
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//!
//! let rejected = breaker.execute(|| async { Ok::<_, CacheError>(1) }).await;
//! assert!(matches!(rejected, Err(CacheError::CircuitOpen { .. })));
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::CacheError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal: every call reaches the operation.
    Closed,
    /// Tripped: calls fail fast until the reset time.
    Open,
    /// Probing: a bounded number of calls test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding used by gauge exporters.
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failures_in_window: usize,
    pub successes_in_window: usize,
    /// Closed -> Open transitions.
    pub trips: u64,
    /// Calls rejected without running the operation.
    pub rejections: u64,
    pub reset_count: u32,
    /// Time until the next half-open probe, when open.
    pub retry_after: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Circuit Breaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    successes: VecDeque<Instant>,
    /// Set while Open; with `open_for` it gives the half-open time.
    opened_at: Option<Instant>,
    open_for: Duration,
    reset_count: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    /// Bumped on every transition into HalfOpen; stale probe guards compare
    /// against it before releasing their slot.
    half_open_epoch: u64,
    trips: u64,
    rejections: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            successes: VecDeque::new(),
            opened_at: None,
            open_for: Duration::ZERO,
            reset_count: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            half_open_epoch: 0,
            trips: 0,
            rejections: 0,
        }
    }

    /// Time left before the half-open transition, `None` unless opened.
    fn retry_after(&self, now: Instant) -> Option<Duration> {
        let opened_at = self.opened_at?;
        Some(self.open_for.saturating_sub(now.saturating_duration_since(opened_at)))
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&front) = self.failures.front() {
            if now.saturating_duration_since(front) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        while let Some(&front) = self.successes.front() {
            if now.saturating_duration_since(front) > window {
                self.successes.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Admission slot for a call; releases a half-open probe slot when dropped.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    epoch: Option<u64>,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if let Some(epoch) = self.epoch {
            let mut inner = self.breaker.inner.lock();
            if inner.state == CircuitState::HalfOpen && inner.half_open_epoch == epoch {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
        }
    }
}

/// Three-state failure gate.
///
/// Thread-safe: state lives behind a `parking_lot` mutex that is never held
/// across the guarded operation's `.await`.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, moving Open to HalfOpen if the reset time has passed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.poll_reset(&mut inner, Instant::now());
        inner.state
    }

    pub fn stats(&self) -> CircuitStats {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.poll_reset(&mut inner, now);
        inner.prune(now, self.config.window());
        CircuitStats {
            state: inner.state,
            failures_in_window: inner.failures.len(),
            successes_in_window: inner.successes.len(),
            trips: inner.trips,
            rejections: inner.rejections,
            reset_count: inner.reset_count,
            retry_after: match inner.state {
                CircuitState::Open => inner.retry_after(now),
                _ => None,
            },
        }
    }

    /// Forces the breaker closed and forgets all history.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        let trips = inner.trips;
        let rejections = inner.rejections;
        *inner = BreakerState::new();
        inner.trips = trips;
        inner.rejections = rejections;
        if previous != CircuitState::Closed {
            info!(from = %previous, "circuit breaker manually reset to closed");
        }
    }

    /// Runs `operation` unless the breaker rejects the call.
    ///
    /// Any `Err` from the operation counts as a failure and is returned as-is.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        if !self.config.enabled {
            return operation().await;
        }

        let guard = self.admit()?;
        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        drop(guard);
        result
    }

    fn admit(&self) -> Result<ProbeGuard<'_>, CacheError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.poll_reset(&mut inner, now);
        match inner.state {
            CircuitState::Closed => Ok(ProbeGuard {
                breaker: self,
                epoch: None,
            }),
            CircuitState::Open => {
                inner.rejections += 1;
                let retry_after = inner.retry_after(now).unwrap_or_default();
                Err(CacheError::CircuitOpen { retry_after })
            },
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.half_open_max_calls {
                    inner.rejections += 1;
                    return Err(CacheError::CircuitOpen {
                        retry_after: Duration::ZERO,
                    });
                }
                inner.half_open_in_flight += 1;
                Ok(ProbeGuard {
                    breaker: self,
                    epoch: Some(inner.half_open_epoch),
                })
            },
        }
    }

    fn record_success(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.successes.push_back(now);
        inner.prune(now, self.config.window());
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                self.close(&mut inner);
            }
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.failures.push_back(now);
        inner.prune(now, self.config.window());
        match inner.state {
            CircuitState::Closed => {
                let volume = inner.failures.len() + inner.successes.len();
                if volume >= self.config.volume_threshold as usize
                    && inner.failures.len() >= self.config.failure_threshold as usize
                {
                    inner.trips += 1;
                    warn!(
                        failures = inner.failures.len(),
                        volume,
                        "circuit breaker opened"
                    );
                    self.open(&mut inner, now);
                }
            },
            CircuitState::HalfOpen => {
                inner.reset_count = inner.reset_count.saturating_add(1);
                warn!(
                    reset_count = inner.reset_count,
                    "circuit breaker probe failed, reopening"
                );
                self.open(&mut inner, now);
            },
            CircuitState::Open => {},
        }
    }

    fn open(&self, inner: &mut BreakerState, now: Instant) {
        let timeout = self.backoff(inner.reset_count);
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.open_for = timeout;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
    }

    fn close(&self, inner: &mut BreakerState) {
        info!(reset_count = inner.reset_count, "circuit breaker closed");
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.reset_count = 0;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        inner.failures.clear();
        inner.successes.clear();
    }

    fn poll_reset(&self, inner: &mut BreakerState, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        if inner.retry_after(now).is_some_and(|left| left.is_zero()) {
            info!("circuit breaker half-open, admitting probes");
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            inner.half_open_in_flight = 0;
            inner.half_open_epoch += 1;
        }
    }

    fn backoff(&self, reset_count: u32) -> Duration {
        let base = self.config.base_timeout();
        let max = self.config.max_timeout();
        let factor = 2u32.checked_pow(reset_count).unwrap_or(u32::MAX);
        base.checked_mul(factor).unwrap_or(max).min(max)
    }
}
