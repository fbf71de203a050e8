//! # Dedup Ledger
//!
//! Durable set of entry identifiers that reached a terminal state.
//!
//! ## Overview
//!
//! [`LedgerState`] is the in-memory membership set plus the cumulative
//! counters; the engine owns it and is its only writer. [`DedupLedger`] owns
//! the on-disk snapshot:
//!
//! - `load` never fails. A missing file yields an empty ledger; an unreadable
//!   or corrupt file is moved aside to `<name>.corrupt` and also yields an
//!   empty ledger.
//! - `save` overwrites the whole snapshot through a temporary file in the same
//!   directory followed by a rename, so a crash mid-write leaves the previous
//!   snapshot in place.
//!
//! ## File Format
//!
//! ```json
//! {
//!   "processed_tracks": ["4uLU6hMCjMI75M1A2tKUQC"],
//!   "last_updated": "2024-05-01T12:00:00Z",
//!   "stats": {
//!     "total_downloads": 1,
//!     "successful_downloads": 1,
//!     "failed_downloads": 0,
//!     "tracks_removed": 1,
//!     "last_sync": "2024-05-01T12:00:00Z"
//!   }
//! }
//! ```

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Cumulative counters carried in the snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerCounters {
    pub total_downloads: u64,
    pub successful_downloads: u64,
    pub failed_downloads: u64,
    pub tracks_removed: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

/// In-memory ledger: membership plus counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    processed: BTreeSet<String>,
    pub counters: LedgerCounters,
}

impl LedgerState {
    pub fn new(processed: impl IntoIterator<Item = String>, counters: LedgerCounters) -> Self {
        Self {
            processed: processed.into_iter().collect(),
            counters,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    /// Mark an entry done. Returns `false` if it already was.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.processed.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.processed.iter().map(String::as_str)
    }

    /// Drop all membership, keeping counters. Returns how many ids were dropped.
    pub fn clear(&mut self) -> usize {
        let cleared = self.processed.len();
        self.processed.clear();
        cleared
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    processed_tracks: Vec<String>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    stats: LedgerCounters,
}

/// On-disk home of the ledger snapshot
#[derive(Debug, Clone)]
pub struct DedupLedger {
    path: PathBuf,
}

impl DedupLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Restore membership and counters.
    ///
    /// Degrades to an empty ledger rather than failing.
    pub async fn load(&self) -> LedgerState {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No ledger found, starting empty");
                return LedgerState::default();
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Ledger unreadable, starting empty");
                self.quarantine().await;
                return LedgerState::default();
            }
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => {
                let state = LedgerState::new(snapshot.processed_tracks, snapshot.stats);
                info!(
                    path = %self.path.display(),
                    processed = state.len(),
                    "Loaded processed-entry ledger"
                );
                state
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Ledger is corrupt, starting empty"
                );
                self.quarantine().await;
                LedgerState::default()
            }
        }
    }

    /// Move a bad snapshot out of the way so the next save does not erase it.
    async fn quarantine(&self) {
        let target = self.sibling(".corrupt");
        match tokio::fs::rename(&self.path, &target).await {
            Ok(()) => warn!(moved_to = %target.display(), "Corrupt ledger moved aside"),
            Err(e) => warn!(error = %e, "Could not move corrupt ledger aside"),
        }
    }

    /// Atomically overwrite the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the temporary file cannot be
    /// written or renamed into place. The previous snapshot is left intact.
    pub async fn save(&self, state: &LedgerState, now: DateTime<Utc>) -> Result<()> {
        let snapshot = Snapshot {
            processed_tracks: state.processed.iter().cloned().collect(),
            last_updated: Some(now),
            stats: state.counters.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| SyncError::Persistence(format!("serialize ledger: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence("create ledger directory", e))?;
        }

        let tmp = self.sibling(".tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| persistence("create temporary ledger", e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| persistence("write temporary ledger", e))?;
        file.sync_all()
            .await
            .map_err(|e| persistence("sync temporary ledger", e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| persistence("replace ledger", e))?;

        debug!(processed = state.len(), path = %self.path.display(), "Ledger saved");
        Ok(())
    }

    /// Clear membership and persist the empty set.
    ///
    /// Returns the number of identifiers dropped.
    pub async fn reset(&self, state: &mut LedgerState, now: DateTime<Utc>) -> Result<usize> {
        let cleared = state.clear();
        self.save(state, now).await?;
        info!(cleared, "Ledger reset");
        Ok(cleared)
    }
}

fn persistence(action: &str, err: std::io::Error) -> SyncError {
    SyncError::Persistence(format!("{}: {}", action, err))
}
