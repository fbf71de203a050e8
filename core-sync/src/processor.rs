//! # Track Processor
//!
//! Drives one entry through record → acquire → tag → commit.
//!
//! ## State Machine
//!
//! ```text
//! Received → Recorded → Acquiring → Acquired → Tagging → Committed
//!     ↓                     ↓           ↓          ↓
//!  CommitFailed    AcquisitionFailed  Committed  CommitFailed
//!                                     CommitFailed
//! ```
//!
//! `Committed`, `CommitFailed` and `AcquisitionFailed` are terminal. Every
//! terminal state is reported back to the engine, which marks the entry done
//! in the ledger whether it succeeded or not.
//!
//! Tagging failures are logged and never fail the entry. Removal from the
//! source list is attempted only after a successful commit, and a failed
//! removal leaves the commit standing.
//!
//! Position hints are taken when the list is fetched. Every removal earlier in
//! the same pass shifts the entries behind it, so hints are corrected through
//! a [`RemovalLog`] shared by all entries of the pass.

use crate::attempt::{AttemptId, NewAttempt};
use crate::repository::ResultStore;
use crate::{Result, SyncError};
use bridge_traits::{
    is_media_url, AcquisitionOutcome, AcquisitionPhase, AcquisitionProgress, AcquisitionProvider,
    AcquisitionRequest, Entry, EntrySource, ProgressReporter, TagFields, Tagger,
};
use core_metadata::{parse_artist_title, sanitize_filename};
use core_runtime::events::{CoreEvent, EntryEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// States
// ============================================================================

/// Where an entry is in its processing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Received,
    Recorded,
    Acquiring,
    Acquired,
    AcquisitionFailed,
    Tagging,
    Committed,
    CommitFailed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Received => "received",
            ProcessingState::Recorded => "recorded",
            ProcessingState::Acquiring => "acquiring",
            ProcessingState::Acquired => "acquired",
            ProcessingState::AcquisitionFailed => "acquisition_failed",
            ProcessingState::Tagging => "tagging",
            ProcessingState::Committed => "committed",
            ProcessingState::CommitFailed => "commit_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Committed
                | ProcessingState::CommitFailed
                | ProcessingState::AcquisitionFailed
        )
    }

    /// Validate a state transition
    pub fn validate_transition(&self, to: ProcessingState) -> Result<()> {
        use ProcessingState::*;

        let valid = match (self, to) {
            (Received, Recorded) => true,
            // The attempt record could not be created
            (Received, CommitFailed) => true,

            (Recorded, Acquiring) => true,

            (Acquiring, Acquired) => true,
            (Acquiring, AcquisitionFailed) => true,

            (Acquired, Tagging) => true,
            (Acquired, Committed) => true,
            (Acquired, CommitFailed) => true,

            (Tagging, Committed) => true,
            (Tagging, CommitFailed) => true,

            // Terminal states cannot transition
            (Committed, _) | (CommitFailed, _) | (AcquisitionFailed, _) => false,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("Cannot transition from {} to {}", self.as_str(), to.as_str()),
            });
        }

        Ok(())
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Terminal result of processing one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub entry_id: String,
    pub state: ProcessingState,
    pub attempt_id: Option<AttemptId>,
    pub file_path: Option<PathBuf>,
    pub file_size: Option<u64>,
    pub tagged: bool,
    pub removed: bool,
    pub error: Option<String>,
}

impl EntryOutcome {
    fn new(entry_id: &str) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            state: ProcessingState::Received,
            attempt_id: None,
            file_path: None,
            file_size: None,
            tagged: false,
            removed: false,
            error: None,
        }
    }

    /// Media saved and the attempt record committed
    pub fn succeeded(&self) -> bool {
        self.state == ProcessingState::Committed
    }

    fn advance(&mut self, to: ProcessingState) -> Result<()> {
        self.state.validate_transition(to)?;
        debug!(entry_id = %self.entry_id, from = %self.state, to = %to, "Entry state change");
        self.state = to;
        Ok(())
    }

    fn fail(&mut self, to: ProcessingState, message: impl Into<String>) -> Result<()> {
        self.error = Some(message.into());
        self.advance(to)
    }
}

// ============================================================================
// Removal log
// ============================================================================

/// Listing positions removed from the source during one pass.
///
/// Removals go through the log one at a time so a hint is always corrected
/// against every removal that landed before it.
#[derive(Debug, Clone, Default)]
pub struct RemovalLog {
    removed: Arc<Mutex<Vec<u32>>>,
}

impl RemovalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful positional removals recorded so far.
    pub async fn len(&self) -> usize {
        self.removed.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.removed.lock().await.is_empty()
    }
}

/// Shift a listing position down by the removals recorded before it.
fn shifted_position(position: u32, removed: &[u32]) -> u32 {
    let earlier = removed.iter().filter(|&&r| r < position).count() as u32;
    position.saturating_sub(earlier)
}

/// How an entry reached the processor
#[derive(Clone, Copy)]
enum Origin<'a> {
    /// From the polled list; removed from it once committed
    Listed(&'a RemovalLog),
    /// Requested directly, outside the list
    Manual,
}

// ============================================================================
// Processor
// ============================================================================

/// Settings for [`TrackProcessor`]
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub download_dir: PathBuf,
    /// A fetch running longer than this becomes `AcquisitionFailed`
    pub acquisition_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            acquisition_timeout: Duration::from_secs(600),
        }
    }
}

/// Processes single entries. Holds no per-entry state, so one instance can
/// serve several entries concurrently.
#[derive(Clone)]
pub struct TrackProcessor {
    config: ProcessorConfig,
    source: Arc<dyn EntrySource>,
    provider: Arc<dyn AcquisitionProvider>,
    /// `None` when tagging is disabled
    tagger: Option<Arc<dyn Tagger>>,
    store: Arc<dyn ResultStore>,
    event_bus: EventBus,
}

impl TrackProcessor {
    pub fn new(
        config: ProcessorConfig,
        source: Arc<dyn EntrySource>,
        provider: Arc<dyn AcquisitionProvider>,
        tagger: Option<Arc<dyn Tagger>>,
        store: Arc<dyn ResultStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            source,
            provider,
            tagger,
            store,
            event_bus,
        }
    }

    /// Run one entry to a terminal state.
    ///
    /// Never fails: every error is folded into the returned outcome so that
    /// one broken entry cannot abort the pass. Entries of the same pass share
    /// `removals`.
    #[instrument(skip(self, entry, removals), fields(entry_id = %entry.id))]
    pub async fn process(&self, entry: &Entry, removals: &RemovalLog) -> EntryOutcome {
        self.run(entry, Origin::Listed(removals)).await
    }

    /// Fetch one item that is not on the list.
    ///
    /// `query` is a search query or a direct media URL. The attempt is
    /// recorded as [`SourceType::Manual`](crate::attempt::SourceType::Manual),
    /// nothing is removed from the source and the ledger is not involved.
    /// Artist and title parsed from the saved filename are written back to
    /// the record.
    #[instrument(skip(self))]
    pub async fn download(&self, query: &str, filename: Option<&str>) -> EntryOutcome {
        let entry = manual_entry(query, filename);
        self.run(&entry, Origin::Manual).await
    }

    async fn run(&self, entry: &Entry, origin: Origin<'_>) -> EntryOutcome {
        let mut outcome = EntryOutcome::new(&entry.id);

        self.event_bus
            .emit(CoreEvent::Entry(EntryEvent::Started {
                entry_id: entry.id.clone(),
                display_name: entry.display_name.clone(),
            }))
            .ok();

        if let Err(e) = self.drive(entry, origin, &mut outcome).await {
            error!(error = %e, state = %outcome.state, "Entry processing aborted");
            outcome.error.get_or_insert_with(|| e.to_string());
        }

        self.emit_terminal(&outcome);
        outcome
    }

    async fn drive(
        &self,
        entry: &Entry,
        origin: Origin<'_>,
        outcome: &mut EntryOutcome,
    ) -> Result<()> {
        let filename = output_name(entry);

        // Recorded
        let attempt = match origin {
            Origin::Listed(_) => NewAttempt::from_entry(entry, filename.clone()),
            Origin::Manual => NewAttempt::manual(&entry.search_key, filename.clone()),
        };
        let attempt_id = match self.store.create_attempt(&attempt).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Could not create attempt record; skipping entry");
                return outcome.fail(ProcessingState::CommitFailed, e.to_string());
            }
        };
        outcome.attempt_id = Some(attempt_id);
        outcome.advance(ProcessingState::Recorded)?;

        // Acquiring
        outcome.advance(ProcessingState::Acquiring)?;
        info!(search_key = %entry.search_key, "Acquiring");
        let file_path = match self.acquire(entry, filename.clone()).await {
            Ok(path) => path,
            Err(message) => {
                warn!(error = %message, "Acquisition failed");
                if let Err(e) = self.store.mark_failed(attempt_id, &message).await {
                    error!(error = %e, attempt_id = %attempt_id, "Could not record failure");
                }
                return outcome.fail(ProcessingState::AcquisitionFailed, message);
            }
        };

        let file_size = match tokio::fs::metadata(&file_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                let message = format!(
                    "provider reported {} but it is not readable: {}",
                    file_path.display(),
                    e
                );
                warn!(error = %message, "Acquisition failed");
                if let Err(e) = self.store.mark_failed(attempt_id, &message).await {
                    error!(error = %e, attempt_id = %attempt_id, "Could not record failure");
                }
                return outcome.fail(ProcessingState::AcquisitionFailed, message);
            }
        };
        outcome.file_path = Some(file_path.clone());
        outcome.file_size = Some(file_size);
        outcome.advance(ProcessingState::Acquired)?;

        // Tagging (optional)
        if let Some(tagger) = &self.tagger {
            outcome.advance(ProcessingState::Tagging)?;
            outcome.tagged = match tagger.apply(&file_path, &tag_fields(entry)).await {
                Ok(true) => true,
                Ok(false) => {
                    warn!(path = %file_path.display(), "File saved but could not be tagged");
                    false
                }
                Err(e) => {
                    warn!(error = %SyncError::Tagging(e.to_string()), "Tagger error ignored");
                    false
                }
            };
        }

        // Committed
        if let Err(e) = self
            .store
            .mark_completed(attempt_id, &file_path, file_size)
            .await
        {
            error!(error = %e, attempt_id = %attempt_id, "Could not commit attempt record");
            return outcome.fail(ProcessingState::CommitFailed, e.to_string());
        }
        outcome.advance(ProcessingState::Committed)?;
        info!(path = %file_path.display(), size = file_size, "Entry saved");

        match origin {
            Origin::Listed(removals) => outcome.removed = self.retire(entry, removals).await,
            Origin::Manual => self.describe_manual(attempt_id, &file_path, &filename).await,
        }
        Ok(())
    }

    /// Write artist and title parsed from the saved filename to the record.
    async fn describe_manual(
        &self,
        attempt_id: AttemptId,
        file_path: &std::path::Path,
        filename: &str,
    ) {
        let stem = file_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(filename);
        let (artist, title) = parse_artist_title(stem);
        if artist.is_none() && title.is_none() {
            return;
        }
        if let Err(e) = self
            .store
            .update_descriptive(attempt_id, artist.as_deref(), title.as_deref())
            .await
        {
            warn!(error = %e, attempt_id = %attempt_id, "Could not store parsed artist and title");
        }
    }

    /// Fetch under the acquisition timeout. `Err` carries the failure text.
    async fn acquire(&self, entry: &Entry, filename: String) -> std::result::Result<PathBuf, String> {
        let request = AcquisitionRequest {
            search_key: entry.search_key.clone(),
            output_name: filename,
            output_dir: self.config.download_dir.clone(),
        };

        let fetch = self.provider.fetch(request, self.progress_reporter(&entry.id));
        match tokio::time::timeout(self.config.acquisition_timeout, fetch).await {
            Ok(Ok(AcquisitionOutcome::Completed { file_path })) => Ok(file_path),
            Ok(Ok(AcquisitionOutcome::Failed { error })) => {
                Err(SyncError::Acquisition(error).to_string())
            }
            Ok(Err(e)) => Err(SyncError::from(e).to_string()),
            Err(_) => Err(SyncError::Timeout(self.config.acquisition_timeout).to_string()),
        }
    }

    /// Best-effort removal from the source list.
    async fn retire(&self, entry: &Entry, removals: &RemovalLog) -> bool {
        let mut removed = removals.removed.lock().await;
        let hint = entry
            .source_position
            .map(|position| shifted_position(position, &removed));

        match self.source.remove_entry(&entry.uri, hint).await {
            Ok(true) => {
                debug!(uri = %entry.uri, ?hint, "Removed entry from source list");
                if let Some(position) = entry.source_position {
                    removed.push(position);
                }
                true
            }
            Ok(false) => {
                warn!(uri = %entry.uri, "Source declined removal; entry stays listed");
                false
            }
            Err(e) => {
                warn!(uri = %entry.uri, error = %e, "Removal failed; entry stays listed");
                false
            }
        }
    }

    fn progress_reporter(&self, entry_id: &str) -> ProgressReporter {
        let bus = self.event_bus.clone();
        let entry_id = entry_id.to_string();
        ProgressReporter::new(move |progress: AcquisitionProgress| {
            bus.emit(CoreEvent::Entry(EntryEvent::Progress {
                entry_id: entry_id.clone(),
                percent: progress.percent.map(|p| p.clamp(0.0, 100.0).round() as u8),
                eta_secs: progress.eta_secs,
                phase: phase_label(progress.phase).to_string(),
            }))
            .ok();
        })
    }

    fn emit_terminal(&self, outcome: &EntryOutcome) {
        let event = match (outcome.succeeded(), &outcome.file_path) {
            (true, Some(path)) => EntryEvent::Completed {
                entry_id: outcome.entry_id.clone(),
                file_path: path.display().to_string(),
                file_size: outcome.file_size.unwrap_or(0),
                removed: outcome.removed,
            },
            _ => EntryEvent::Failed {
                entry_id: outcome.entry_id.clone(),
                message: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("ended in state {}", outcome.state)),
            },
        };
        self.event_bus.emit(CoreEvent::Entry(event)).ok();
    }
}

fn phase_label(phase: AcquisitionPhase) -> &'static str {
    match phase {
        AcquisitionPhase::Searching => "searching",
        AcquisitionPhase::Downloading => "downloading",
        AcquisitionPhase::Converting => "converting",
        AcquisitionPhase::Finished => "finished",
    }
}

/// Filesystem-safe stem for the saved file.
pub fn output_name(entry: &Entry) -> String {
    [&entry.output_name, &entry.search_key, &entry.display_name]
        .into_iter()
        .map(|candidate| sanitize_filename(candidate))
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| sanitize_filename(&entry.id))
}

/// Entry standing in for an ad hoc request.
fn manual_entry(query: &str, filename: Option<&str>) -> Entry {
    let query = query.trim();
    let stem = filename
        .map(sanitize_filename)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            if is_media_url(query) {
                format!("download_{}", uuid::Uuid::new_v4().simple())
            } else {
                sanitize_filename(query)
            }
        });

    let mut entry = Entry::new(query, query).with_output_name(stem);
    entry.uri = String::new();
    entry
}

fn tag_fields(entry: &Entry) -> TagFields {
    TagFields {
        artist: entry.artist_display(),
        title: entry.title.clone(),
        album: entry.collection.clone(),
        ..TagFields::default()
    }
}

// ============================================================================
// Tests
// ============================================================================
