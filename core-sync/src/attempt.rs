//! # Processing Attempt Records
//!
//! Types for the durable record of every entry the engine tries to acquire.
//!
//! ## Overview
//!
//! One record is created per processed entry with status `processing` and is
//! moved exactly once to a terminal status:
//!
//! ```text
//! Processing → Completed
//!     ↓
//!     └──────→ Failed
//! ```
//!
//! Records are owned by the [`ResultStore`](crate::repository::ResultStore);
//! the engine only ever creates them and issues the terminal mutation.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of one synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassId(Uuid);

impl PassId {
    /// Create a new random pass ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a pass ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidStatus(format!("invalid pass id: {}", e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PassId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Row id of a processing attempt in the result store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(i64);

impl AttemptId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AttemptId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Status of a processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// Created, acquisition not yet finished
    Processing,
    /// Media saved
    Completed,
    /// Acquisition failed or timed out
    Failed,
}

impl AttemptStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Failed)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Processing => "processing",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
        }
    }

    /// Validate a transition out of this status.
    ///
    /// Only `processing` may move, and only to a terminal status.
    pub fn validate_transition(&self, to: AttemptStatus) -> Result<()> {
        let valid = matches!(
            (self, to),
            (AttemptStatus::Processing, AttemptStatus::Completed)
                | (AttemptStatus::Processing, AttemptStatus::Failed)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Attempt already {}; terminal records are immutable",
                    self.as_str()
                ),
            });
        }

        Ok(())
    }
}

impl FromStr for AttemptStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processing" => Ok(AttemptStatus::Processing),
            "completed" => Ok(AttemptStatus::Completed),
            "failed" => Ok(AttemptStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an attempt came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Driven by the polled source list
    Playlist,
    /// Requested ad hoc by a caller
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Playlist => "playlist",
            SourceType::Manual => "manual",
        }
    }
}

impl FromStr for SourceType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "playlist" => Ok(SourceType::Playlist),
            "manual" => Ok(SourceType::Manual),
            _ => Err(SyncError::InvalidSourceType(s.to_string())),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Fields captured when an attempt is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttempt {
    pub filename: String,
    pub original_url: Option<String>,
    pub source_type: SourceType,
    pub artist: Option<String>,
    pub track_name: Option<String>,
    pub search_query: String,
    /// Identifier of the source entry, when list-driven
    pub source_entry_id: Option<String>,
}

impl NewAttempt {
    /// Attempt for an entry of the polled list.
    pub fn from_entry(entry: &bridge_traits::Entry, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            original_url: Some(entry.uri.clone()),
            source_type: SourceType::Playlist,
            artist: entry.artist_display(),
            track_name: entry.title.clone(),
            search_query: entry.search_key.clone(),
            source_entry_id: Some(entry.id.clone()),
        }
    }

    /// Attempt requested outside the polled list. A URL query is also kept
    /// as the original URL.
    pub fn manual(search_query: impl Into<String>, filename: impl Into<String>) -> Self {
        let search_query = search_query.into();
        Self {
            filename: filename.into(),
            original_url: bridge_traits::is_media_url(&search_query).then(|| search_query.clone()),
            source_type: SourceType::Manual,
            artist: None,
            track_name: None,
            search_query,
            source_entry_id: None,
        }
    }
}

/// A stored attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub filename: String,
    pub original_url: Option<String>,
    pub source_type: SourceType,
    pub file_size: Option<u64>,
    pub file_path: Option<PathBuf>,
    pub artist: Option<String>,
    pub track_name: Option<String>,
    pub search_query: Option<String>,
    pub source_entry_id: Option<String>,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    /// Unix timestamp (seconds)
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Aggregate figures over all attempts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub processing: u64,
    pub playlist: u64,
    pub manual: u64,
    pub total_file_size: u64,
    /// Completed share of all attempts, in percent
    pub success_rate: f64,
}

impl AttemptStats {
    pub(crate) fn compute_success_rate(completed: u64, total: u64) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let rate = completed as f64 / total as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

/// Filter and paging for [`ResultStore::list`](crate::repository::ResultStore::list)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptQuery {
    pub limit: u32,
    pub offset: u32,
    pub status: Option<AttemptStatus>,
    pub source: Option<SourceType>,
}

impl Default for AttemptQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            status: None,
            source: None,
        }
    }
}

impl AttemptQuery {
    pub fn with_status(mut self, status: AttemptStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: SourceType) -> Self {
        self.source = Some(source);
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
