//! Background maintenance task.
//!
//! ```text
//!   every cleanup_interval ──► purge_expired()  (entries + negative cache)
//!   every persistence.interval ──► save_snapshot()   (when enabled)
//!   shutdown signal ──► final save_snapshot() ──► exit
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::AdaptiveCache;

/// Handle to a running maintenance task.
///
/// Dropping the handle signals the task to stop without waiting for it.
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stops the task, waiting for its final snapshot.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "maintenance task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let now = Instant::now();
    let mut ticker = interval_at(now.checked_add(period).unwrap_or(now), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub(crate) fn spawn<V>(cache: AdaptiveCache<V>) -> MaintenanceHandle
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let cleanup_period = cache.config().cleanup_interval();
    let persistence = cache.config().persistence.clone();

    let handle = tokio::spawn(async move {
        info!(
            cleanup_secs = cleanup_period.as_secs(),
            persistence = persistence.enabled,
            "cache maintenance started"
        );
        let mut cleanup = ticker(cleanup_period);
        let mut snapshot = ticker(persistence.interval());

        loop {
            tokio::select! {
                _ = cleanup.tick() => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        debug!(purged, "maintenance purged expired entries");
                    }
                }
                _ = snapshot.tick(), if persistence.enabled => {
                    let _ = cache.save_snapshot().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        if persistence.enabled {
            let _ = cache.save_snapshot().await;
        }
        info!("cache maintenance stopped");
    });

    MaintenanceHandle {
        shutdown_tx,
        handle,
    }
}
