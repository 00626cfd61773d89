//! In-flight fetch table for request coalescing.
//!
//! The first caller to miss on a key becomes the *leader* and runs the fetch.
//! Callers that miss while the fetch is outstanding register as *waiters* and
//! receive a clone of the leader's result, in registration order.
//!
//! ```text
//!   caller A ──miss──► register(k) ──► Leader ──fetch──► complete(k, r)
//!   caller B ──miss──► join(k) ────► Waiter ◄────────────── r (1st)
//!   caller C ──miss──► join(k) ────► Waiter ◄────────────── r (2nd)
//! ```
//!
//! If the leader is dropped before completing, its [`LeaderGuard`] removes
//! the entry; the waiters' senders drop with it and every waiter observes
//! [`CacheError::Cancelled`].
//!
//! Background refreshes register here too, so an entry doubles as the
//! "refresh in progress" marker for its key.

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{CacheError, Result};

/// One outstanding fetch and the callers waiting on it.
#[derive(Debug)]
pub struct PendingRequest<V> {
    waiters: Vec<oneshot::Sender<Result<V>>>,
    started_at: Instant,
}

impl<V> PendingRequest<V> {
    fn new(now: Instant) -> Self {
        Self {
            waiters: Vec::new(),
            started_at: now,
        }
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

#[derive(Debug)]
pub struct PendingTable<V> {
    inner: Mutex<FxHashMap<String, PendingRequest<V>>>,
}

impl<V> Default for PendingTable<V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<V: Clone> PendingTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the table for an atomic check-then-register sequence.
    pub(crate) fn lock(&self) -> PendingGuard<'_, V> {
        PendingGuard {
            map: self.inner.lock(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Removes the entry for `key` and hands `result` to each waiter in order.
    pub fn complete(&self, key: &str, result: &Result<V>) -> usize {
        let Some(pending) = self.inner.lock().remove(key) else {
            return 0;
        };
        let count = pending.waiters.len();
        for waiter in pending.waiters {
            // a waiter that gave up has dropped its receiver
            let _ = waiter.send(result.clone());
        }
        trace!(key, waiters = count, "resolved in-flight fetch");
        count
    }

    /// Drops the entry for `key` without a result.
    pub fn abandon(&self, key: &str) {
        if self.inner.lock().remove(key).is_some() {
            trace!(key, "abandoned in-flight fetch");
        }
    }
}

/// Locked view of the table.
pub(crate) struct PendingGuard<'a, V> {
    map: MutexGuard<'a, FxHashMap<String, PendingRequest<V>>>,
}

impl<V> PendingGuard<'_, V> {
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Registers a waiter when a fetch for `key` is in flight.
    pub fn join(&mut self, key: &str) -> Option<Waiter<V>> {
        let pending = self.map.get_mut(key)?;
        let (tx, rx) = oneshot::channel();
        pending.waiters.push(tx);
        Some(Waiter {
            key: key.to_owned(),
            rx,
        })
    }

    /// Marks `key` as having a fetch in flight.
    pub fn register(&mut self, key: &str, now: Instant) {
        self.map
            .entry(key.to_owned())
            .or_insert_with(|| PendingRequest::new(now));
    }
}

/// Receiving half for a coalesced caller.
#[derive(Debug)]
pub struct Waiter<V> {
    key: String,
    rx: oneshot::Receiver<Result<V>>,
}

impl<V> Waiter<V> {
    pub async fn wait(self) -> Result<V> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Cancelled { key: self.key }),
        }
    }
}

/// Clears a leader's entry if it never completes.
pub(crate) struct LeaderGuard<'a, V: Clone> {
    table: &'a PendingTable<V>,
    key: &'a str,
    armed: bool,
}

impl<'a, V: Clone> LeaderGuard<'a, V> {
    pub fn new(table: &'a PendingTable<V>, key: &'a str) -> Self {
        Self {
            table,
            key,
            armed: true,
        }
    }

    /// Resolves every waiter with `result`.
    pub fn complete(mut self, result: &Result<V>) {
        self.armed = false;
        self.table.complete(self.key, result);
    }
}

impl<V: Clone> Drop for LeaderGuard<'_, V> {
    fn drop(&mut self) {
        if self.armed {
            self.table.abandon(self.key);
        }
    }
}
