//! Acquisition Provider Abstraction
//!
//! Search-and-download of media for one entry. Implementations are typically
//! slow (seconds to minutes) and wrap an external tool or service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    /// Search query, or a direct media URL
    pub search_key: String,
    /// Filename stem; the provider chooses the extension
    pub output_name: String,
    pub output_dir: PathBuf,
}

impl AcquisitionRequest {
    /// `search_key` names the media directly instead of describing it.
    pub fn is_direct_url(&self) -> bool {
        is_media_url(&self.search_key)
    }
}

/// Whether `value` is an http(s) URL rather than a search query.
pub fn is_media_url(value: &str) -> bool {
    let value = value.trim_start();
    ["http://", "https://"].iter().any(|scheme| {
        value
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Terminal result of a fetch that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AcquisitionOutcome {
    Completed { file_path: PathBuf },
    Failed { error: String },
}

impl AcquisitionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AcquisitionOutcome::Completed { .. })
    }
}

/// Phase reported alongside progress updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionPhase {
    Searching,
    Downloading,
    Converting,
    Finished,
}

/// Progress snapshot. Informational only; correctness never depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionProgress {
    pub phase: AcquisitionPhase,
    /// 0.0..=100.0 when known
    pub percent: Option<f32>,
    pub total_bytes: Option<u64>,
    pub speed: Option<String>,
    pub eta_secs: Option<u64>,
}

impl AcquisitionProgress {
    pub fn phase(phase: AcquisitionPhase) -> Self {
        Self {
            phase,
            percent: None,
            total_bytes: None,
            speed: None,
            eta_secs: None,
        }
    }
}

/// Callback handle for progress updates.
///
/// Cheap to clone; a reporter without a callback drops every update.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<Arc<dyn Fn(AcquisitionProgress) + Send + Sync>>,
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(AcquisitionProgress) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn noop() -> Self {
        Self::default()
    }

    pub fn report(&self, progress: AcquisitionProgress) {
        if let Some(callback) = &self.callback {
            callback(progress);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("active", &self.callback.is_some())
            .finish()
    }
}

/// Search-based media fetcher.
#[async_trait]
pub trait AcquisitionProvider: Send + Sync {
    /// Fetch media for `request` and save it under `request.output_dir`.
    ///
    /// `Ok(Failed)` means the provider ran but produced no usable media;
    /// `Err` means the provider itself could not run (missing binary, I/O).
    /// Implementations emit at least one terminal progress update.
    async fn fetch(
        &self,
        request: AcquisitionRequest,
        progress: ProgressReporter,
    ) -> Result<AcquisitionOutcome>;
}
