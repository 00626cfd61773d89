//! Warm-start snapshots.
//!
//! A snapshot is a single JSON document:
//!
//! ```text
//!   {
//!     "version": 1,
//!     "timestamp": 1760000000000,          // unix millis at save
//!     "entries": [
//!       { "key": "user:42",
//!         "entry": { "value": ..., "created_at_ms": ..., "ttl_ms": ...,
//!                    "hit_count": ..., "update_count": ..., "size_bytes": ... } }
//!     ]
//!   }
//! ```
//!
//! Entry timestamps are wall-clock so a snapshot survives a process restart;
//! on load, each entry's remaining TTL is recomputed and expired entries are
//! dropped. Writes go to `<path>.tmp` and are renamed over the target.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, Result};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<V> {
    pub version: u32,
    pub timestamp: u64,
    pub entries: Vec<SnapshotRecord<V>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord<V> {
    pub key: String,
    pub entry: SnapshotEntry<V>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry<V> {
    pub value: V,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
    pub hit_count: u64,
    pub update_count: u64,
    pub size_bytes: usize,
}

impl<V> SnapshotEntry<V> {
    /// TTL left at wall-clock `now_ms`, `None` once elapsed.
    pub fn remaining(&self, now_ms: u64) -> Option<Duration> {
        let expires = self.created_at_ms.saturating_add(self.ttl_ms);
        (expires > now_ms).then(|| Duration::from_millis(expires - now_ms))
    }
}

impl<V> Snapshot<V> {
    pub fn new(entries: Vec<SnapshotRecord<V>>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timestamp: unix_millis(SystemTime::now()),
            entries,
        }
    }
}

pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes `snapshot` atomically, creating parent directories.
pub async fn save<V: Serialize>(path: &Path, snapshot: &Snapshot<V>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec(snapshot)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), entries = snapshot.entries.len(), bytes = bytes.len(), "wrote snapshot");
    Ok(())
}

/// Reads a snapshot; a missing file is `Ok(None)`.
pub async fn load<V: DeserializeOwned>(path: &Path) -> Result<Option<Snapshot<V>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let snapshot: Snapshot<V> = serde_json::from_slice(&bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CacheError::Serialization(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, value: &str, created_at_ms: u64, ttl_ms: u64) -> SnapshotRecord<String> {
        SnapshotRecord {
            key: key.to_owned(),
            entry: SnapshotEntry {
                value: value.to_owned(),
                created_at_ms,
                ttl_ms,
                hit_count: 3,
                update_count: 1,
                size_bytes: value.len() + 2,
            },
        }
    }

    #[test]
    fn remaining_ttl() {
        let entry = record("k", "v", 1_000, 5_000).entry;
        assert_eq!(entry.remaining(2_000), Some(Duration::from_millis(4_000)));
        assert_eq!(entry.remaining(6_000), None);
        assert_eq!(entry.remaining(9_000), None);
    }

    #[tokio::test]
    async fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/snapshot.json");
        let snapshot = Snapshot::new(vec![record("a", "alpha", 10, 20)]);
        save(&path, &snapshot).await.unwrap();
        assert!(!temp_path(&path).exists());

        let loaded: Snapshot<String> = load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Snapshot<String>> =
            load(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn rejects_other_versions_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        tokio::fs::write(&path, br#"{"version":99,"timestamp":0,"entries":[]}"#)
            .await
            .unwrap();
        let err = load::<String>(&path).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(ref m) if m.contains("99")));

        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(matches!(
            load::<String>(&path).await,
            Err(CacheError::Serialization(_))
        ));
    }
}
