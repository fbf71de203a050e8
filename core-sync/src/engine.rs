//! # Synchronization Engine
//!
//! Mirrors a remote list onto local storage by repeated passes.
//!
//! ## Overview
//!
//! The `SyncEngine` composes the pieces of this crate:
//! - lists the live entries from the [`EntrySource`]
//! - diffs them against the [`DedupLedger`](crate::ledger::DedupLedger)
//! - runs each new entry through the [`TrackProcessor`] in list order
//! - folds the outcomes into the ledger and its counters
//! - persists the ledger once per pass
//! - feeds the number of newly handled entries to the [`PollScheduler`]
//!
//! ## Lifecycle
//!
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//! ```
//!
//! `start()` spawns the polling loop, which runs a pass immediately and then
//! sleeps the scheduler interval between passes. `stop()` cancels the loop,
//! lets the entry in flight reach its terminal state, waits at most
//! `stop_timeout` and saves the ledger.
//!
//! Only one pass runs at a time. `manual_pass()` is refused while the loop is
//! running.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{EngineConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(config, source, provider, Some(tagger), store, event_bus).await;
//! engine.start().await?;
//!
//! let status = engine.status().await;
//! println!("{} entries handled, next check in {}s", status.ledger_size, status.interval_secs);
//!
//! engine.stop().await?;
//! ```

use crate::attempt::PassId;
use crate::ledger::{DedupLedger, LedgerCounters, LedgerState};
use crate::processor::{EntryOutcome, ProcessorConfig, RemovalLog, TrackProcessor};
use crate::repository::ResultStore;
use crate::scheduler::PollScheduler;
use crate::{Result, SyncError};
use bridge_traits::{AcquisitionProvider, Clock, Entry, EntrySource, SourceInfo, SystemClock, Tagger};
use chrono::{DateTime, Utc};
use core_runtime::config::{AppConfig, PollingConfig, ProcessingConfig};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub polling: PollingConfig,
    pub processing: ProcessingConfig,
    /// Location of the ledger snapshot
    pub ledger_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polling: PollingConfig::default(),
            processing: ProcessingConfig::default(),
            ledger_path: PathBuf::from(".processed_tracks.json"),
        }
    }
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            polling: config.polling.clone(),
            processing: config.processing.clone(),
            ledger_path: config.storage.ledger_path.clone(),
        }
    }
}

// ============================================================================
// Public Types
// ============================================================================

/// Lifecycle of the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What started a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassTrigger {
    Scheduled,
    Manual,
}

impl PassTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassTrigger::Scheduled => "scheduled",
            PassTrigger::Manual => "manual",
        }
    }
}

/// Result of one completed pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass_id: PassId,
    pub trigger: PassTrigger,
    pub started_at: DateTime<Utc>,
    /// Entries found that were not yet in the ledger
    pub new_entries: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub removed: usize,
    /// New entries not started because a stop was requested
    pub skipped: usize,
    /// Growth of the ledger during this pass
    pub delta: usize,
    pub duration_ms: u64,
    pub next_interval_secs: f64,
    pub outcomes: Vec<EntryOutcome>,
}

/// Snapshot returned by [`SyncEngine::status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub running: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub ledger_size: usize,
    pub interval_secs: f64,
    pub no_change_streak: u32,
    pub counters: LedgerCounters,
}

/// One live entry as seen by [`SyncEngine::preview`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub entry: Entry,
    pub processed: bool,
}

/// Dry-run view of the next pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewReport {
    pub source: SourceInfo,
    pub entries: Vec<PreviewEntry>,
    pub new_count: usize,
    pub total: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// Mutable engine state, touched only between awaits of the pass loop.
struct EngineInner {
    ledger: LedgerState,
    scheduler: PollScheduler,
    /// Failed attempts of entries not yet ledgered
    failure_counts: HashMap<String, u32>,
    last_error: Option<(String, DateTime<Utc>)>,
}

struct Lifecycle {
    state: EngineState,
    cancellation_token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// The synchronization engine
pub struct SyncEngine {
    config: EngineConfig,
    source: Arc<dyn EntrySource>,
    processor: TrackProcessor,
    ledger: DedupLedger,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,

    inner: Arc<Mutex<EngineInner>>,

    /// Held for the whole of a pass so passes never overlap
    pass_gate: Arc<Mutex<()>>,

    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl SyncEngine {
    /// Create an engine and load the ledger.
    ///
    /// # Arguments
    ///
    /// * `config` - Polling, processing and ledger settings
    /// * `source` - The remote list to mirror
    /// * `provider` - Search-and-download backend
    /// * `tagger` - Metadata writer; ignored when tagging is disabled
    /// * `store` - Durable attempt records
    /// * `event_bus` - Receives engine and entry events
    ///
    /// Loading never fails: a missing or corrupt ledger starts empty.
    pub async fn new(
        config: EngineConfig,
        source: Arc<dyn EntrySource>,
        provider: Arc<dyn AcquisitionProvider>,
        tagger: Option<Arc<dyn Tagger>>,
        store: Arc<dyn ResultStore>,
        event_bus: EventBus,
    ) -> Self {
        let tagger = tagger.filter(|_| config.processing.enable_tagging);
        let processor = TrackProcessor::new(
            ProcessorConfig {
                download_dir: config.processing.download_dir.clone(),
                acquisition_timeout: config.processing.acquisition_timeout,
            },
            Arc::clone(&source),
            provider,
            tagger,
            store,
            event_bus.clone(),
        );

        let ledger = DedupLedger::new(&config.ledger_path);
        let state = ledger.load().await;

        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                ledger: state,
                scheduler: PollScheduler::new(config.polling.clone()),
                failure_counts: HashMap::new(),
                last_error: None,
            })),
            config,
            source,
            processor,
            ledger,
            event_bus,
            clock: Arc::new(SystemClock),
            pass_gate: Arc::new(Mutex::new(())),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: EngineState::Stopped,
                cancellation_token: None,
                task: None,
            })),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clone for background task (avoids Arc<Arc<...>>)
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            source: Arc::clone(&self.source),
            processor: self.processor.clone(),
            ledger: self.ledger.clone(),
            event_bus: self.event_bus.clone(),
            clock: Arc::clone(&self.clock),
            inner: Arc::clone(&self.inner),
            pass_gate: Arc::clone(&self.pass_gate),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start the polling loop.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] if the loop is running and
    /// [`SyncError::InvalidLifecycle`] while a stop is in progress.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.state {
            EngineState::Stopped => {}
            EngineState::Starting | EngineState::Running => return Err(SyncError::AlreadyRunning),
            EngineState::Stopping => {
                return Err(SyncError::InvalidLifecycle {
                    operation: "start".to_string(),
                    state: lifecycle.state.to_string(),
                })
            }
        }
        lifecycle.state = EngineState::Starting;

        let cancellation_token = CancellationToken::new();
        let engine = self.clone_for_task();
        let token = cancellation_token.clone();
        let task = tokio::spawn(async move {
            engine.run_loop(token).await;
        });

        lifecycle.cancellation_token = Some(cancellation_token);
        lifecycle.task = Some(task);
        lifecycle.state = EngineState::Running;

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::EngineStarted {
                interval_secs: self.config.polling.base_interval.as_secs(),
            }))
            .ok();

        info!(
            base_interval_secs = self.config.polling.base_interval.as_secs(),
            max_interval_secs = self.config.polling.max_interval.as_secs(),
            "Sync engine started"
        );
        Ok(())
    }

    /// Stop the polling loop and save the ledger.
    ///
    /// The entry being processed when the stop arrives is allowed to finish.
    /// If the loop has not ended within `stop_timeout` it is left to finish
    /// on its own and the ledger is saved anyway. Stopping a stopped engine
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the final ledger save fails.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let (token, task) = {
            let mut lifecycle = self.lifecycle.lock().await;
            match lifecycle.state {
                EngineState::Stopped => {
                    debug!("Stop requested but engine is not running");
                    return Ok(());
                }
                EngineState::Stopping => {
                    return Err(SyncError::InvalidLifecycle {
                        operation: "stop".to_string(),
                        state: lifecycle.state.to_string(),
                    })
                }
                EngineState::Starting | EngineState::Running => {}
            }
            lifecycle.state = EngineState::Stopping;
            (lifecycle.cancellation_token.take(), lifecycle.task.take())
        };

        if let Some(token) = token {
            token.cancel();
        }

        if let Some(mut task) = task {
            match tokio::time::timeout(self.config.processing.stop_timeout, &mut task).await {
                Ok(Ok(())) => debug!("Polling loop finished"),
                Ok(Err(e)) => error!(error = %e, "Polling loop ended abnormally"),
                Err(_) => warn!(
                    timeout_secs = self.config.processing.stop_timeout.as_secs(),
                    "Polling loop still busy; letting the current entry finish in the background"
                ),
            }
        }

        let saved = {
            let inner = self.inner.lock().await;
            self.ledger.save(&inner.ledger, self.clock.now()).await
        };

        self.lifecycle.lock().await.state = EngineState::Stopped;
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::EngineStopped))
            .ok();

        match saved {
            Ok(()) => {
                info!("Sync engine stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Ledger could not be saved on stop");
                Err(e)
            }
        }
    }

    async fn run_loop(&self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }

            let wait = match self.run_pass(PassTrigger::Scheduled, &token).await {
                Ok(report) => Duration::from_secs_f64(report.next_interval_secs),
                Err(_) => self.config.polling.error_cooldown,
            };

            debug!(wait_secs = wait.as_secs_f64(), "Waiting for next pass");
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!("Polling loop exited");
    }

    // ------------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------------

    /// Run one pass now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] while the polling loop runs, or
    /// the pass error (listing failed, ledger could not be saved).
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let report = engine.manual_pass().await?;
    /// println!("{} new, {} saved, {} failed", report.new_entries, report.succeeded, report.failed);
    /// ```
    pub async fn manual_pass(&self) -> Result<PassReport> {
        {
            let lifecycle = self.lifecycle.lock().await;
            match lifecycle.state {
                EngineState::Stopped => {}
                EngineState::Starting | EngineState::Running => {
                    return Err(SyncError::AlreadyRunning)
                }
                EngineState::Stopping => {
                    return Err(SyncError::InvalidLifecycle {
                        operation: "run a manual pass".to_string(),
                        state: lifecycle.state.to_string(),
                    })
                }
            }
        }

        self.run_pass(PassTrigger::Manual, &CancellationToken::new())
            .await
    }

    /// One full cycle: list, diff, process, persist, reschedule.
    #[instrument(skip(self, token), fields(trigger = trigger.as_str()))]
    pub async fn run_pass(&self, trigger: PassTrigger, token: &CancellationToken) -> Result<PassReport> {
        let _gate = self.pass_gate.lock().await;

        let pass_id = PassId::new();
        let started_at = self.clock.now();
        let timer = Instant::now();

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::PassStarted {
                pass_id: pass_id.to_string(),
                trigger: trigger.as_str().to_string(),
            }))
            .ok();

        let live = match self.source.list_entries().await {
            Ok(entries) => entries,
            Err(e) => return Err(self.fail_pass(pass_id, SyncError::from(e)).await),
        };

        let (pending, ledger_before) = {
            let inner = self.inner.lock().await;
            (new_entries(live, &inner.ledger), inner.ledger.len())
        };
        let new_count = pending.len();

        if pending.is_empty() {
            let now = self.clock.now();
            let next = self.inner.lock().await.scheduler.record_pass(0, now);
            debug!(live_unchanged = true, "No new entries");
            return Ok(self.complete_pass(PassReport {
                pass_id,
                trigger,
                started_at,
                new_entries: 0,
                succeeded: 0,
                failed: 0,
                removed: 0,
                skipped: 0,
                delta: 0,
                duration_ms: timer.elapsed().as_millis() as u64,
                next_interval_secs: next.as_secs_f64(),
                outcomes: Vec::new(),
            }));
        }

        info!(new_entries = new_count, "Processing new entries");

        let delay = self.config.processing.inter_entry_delay;
        let concurrency = self.config.processing.max_concurrent_entries.max(1);
        let removals = RemovalLog::new();
        let mut results = futures::stream::iter(pending.into_iter().enumerate())
            .map(|(index, entry)| {
                let processor = self.processor.clone();
                let removals = removals.clone();
                let token = token.clone();
                async move {
                    if index > 0 && !delay.is_zero() {
                        tokio::select! {
                            _ = token.cancelled() => return None,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    if token.is_cancelled() {
                        return None;
                    }
                    Some(processor.process(&entry, &removals).await)
                }
            })
            .buffered(concurrency);

        let mut outcomes = Vec::with_capacity(new_count);
        let mut skipped = 0;
        while let Some(result) = results.next().await {
            match result {
                Some(outcome) => {
                    self.apply_outcome(&outcome).await;
                    outcomes.push(outcome);
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            info!(skipped, "Stop requested; remaining entries left for a later pass");
        }

        let now = self.clock.now();
        let (delta, next, saved) = {
            let mut inner = self.inner.lock().await;
            let delta = inner.ledger.len().saturating_sub(ledger_before);
            inner.ledger.counters.last_sync = Some(now);
            let saved = self.ledger.save(&inner.ledger, now).await;
            let next = match &saved {
                Ok(()) => inner.scheduler.record_pass(delta, now),
                Err(_) => inner.scheduler.record_error(now),
            };
            (delta, next, saved)
        };

        if let Err(e) = saved {
            return Err(self.fail_pass(pass_id, e).await);
        }

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        let removed = outcomes.iter().filter(|o| o.removed).count();

        Ok(self.complete_pass(PassReport {
            pass_id,
            trigger,
            started_at,
            new_entries: new_count,
            succeeded,
            failed: outcomes.len() - succeeded,
            removed,
            skipped,
            delta,
            duration_ms: timer.elapsed().as_millis() as u64,
            next_interval_secs: next.as_secs_f64(),
            outcomes,
        }))
    }

    /// Fold one terminal outcome into the ledger and counters.
    async fn apply_outcome(&self, outcome: &EntryOutcome) {
        let max_attempts = self.config.processing.max_attempts_per_entry.max(1);
        let mut inner = self.inner.lock().await;

        inner.ledger.counters.total_downloads += 1;
        if outcome.succeeded() {
            inner.ledger.counters.successful_downloads += 1;
            if outcome.removed {
                inner.ledger.counters.tracks_removed += 1;
            }
            inner.failure_counts.remove(&outcome.entry_id);
            inner.ledger.insert(outcome.entry_id.clone());
            return;
        }

        inner.ledger.counters.failed_downloads += 1;
        let failures = {
            let count = inner
                .failure_counts
                .entry(outcome.entry_id.clone())
                .or_insert(0);
            *count += 1;
            *count
        };

        if failures >= max_attempts {
            inner.failure_counts.remove(&outcome.entry_id);
            inner.ledger.insert(outcome.entry_id.clone());
        } else {
            info!(
                entry_id = %outcome.entry_id,
                failures,
                max_attempts,
                "Entry failed; it will be retried on a later pass"
            );
        }
    }

    fn complete_pass(&self, report: PassReport) -> PassReport {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::PassCompleted {
                pass_id: report.pass_id.to_string(),
                new_entries: report.new_entries as u64,
                succeeded: report.succeeded as u64,
                failed: report.failed as u64,
                removed: report.removed as u64,
                duration_ms: report.duration_ms,
                next_interval_secs: report.next_interval_secs.round() as u64,
            }))
            .ok();

        if report.new_entries > 0 {
            info!(
                pass_id = %report.pass_id,
                new_entries = report.new_entries,
                succeeded = report.succeeded,
                failed = report.failed,
                removed = report.removed,
                duration_ms = report.duration_ms,
                "Pass completed"
            );
        }
        report
    }

    /// Record a pass-level failure and hand the error back.
    async fn fail_pass(&self, pass_id: PassId, err: SyncError) -> SyncError {
        let now = self.clock.now();
        {
            let mut inner = self.inner.lock().await;
            inner.scheduler.record_error(now);
            inner.last_error = Some((err.to_string(), now));
        }

        error!(pass_id = %pass_id, error = %err, "Pass failed");
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::PassFailed {
                pass_id: pass_id.to_string(),
                message: err.to_string(),
            }))
            .ok();
        err
    }

    /// Fetch one item that is not on the list.
    ///
    /// Runs beside the polling loop without taking the pass gate; the ledger
    /// and the source list are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Acquisition`] for an empty query. Failures of the
    /// download itself are reported in the outcome.
    pub async fn download(&self, query: &str, filename: Option<&str>) -> Result<EntryOutcome> {
        if query.trim().is_empty() {
            return Err(SyncError::Acquisition("nothing to download: empty query".to_string()));
        }
        let outcome = self.processor.download(query, filename).await;
        info!(
            query,
            state = %outcome.state,
            attempt_id = ?outcome.attempt_id,
            "Manual download finished"
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Queries and maintenance
    // ------------------------------------------------------------------------

    /// Current lifecycle, scheduler and ledger figures.
    pub async fn status(&self) -> EngineStatus {
        let state = self.lifecycle.lock().await.state;
        let inner = self.inner.lock().await;
        let scheduler = inner.scheduler.snapshot();
        let (last_error, last_error_at) = match &inner.last_error {
            Some((message, at)) => (Some(message.clone()), Some(*at)),
            None => (None, None),
        };

        EngineStatus {
            state,
            running: state == EngineState::Running,
            last_check: scheduler.last_check,
            last_error,
            last_error_at,
            ledger_size: inner.ledger.len(),
            interval_secs: scheduler.interval_secs,
            no_change_streak: scheduler.no_change_streak,
            counters: inner.ledger.counters.clone(),
        }
    }

    /// Forget every handled entry so the next pass reprocesses the live list.
    ///
    /// Waits for a pass in progress to finish first. Returns the number of
    /// identifiers dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the emptied ledger cannot be saved.
    #[instrument(skip(self))]
    pub async fn reset_ledger(&self) -> Result<usize> {
        let _gate = self.pass_gate.lock().await;
        let cleared = {
            let mut inner = self.inner.lock().await;
            inner.failure_counts.clear();
            self.ledger.reset(&mut inner.ledger, self.clock.now()).await?
        };

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::LedgerReset {
                cleared: cleared as u64,
            }))
            .ok();
        Ok(cleared)
    }

    /// What the next pass would see, without processing anything.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Provider`] if the source cannot be described or listed.
    pub async fn preview(&self) -> Result<PreviewReport> {
        let source = self.source.describe().await?;
        let live = self.source.list_entries().await?;

        let inner = self.inner.lock().await;
        let mut seen = HashSet::new();
        let mut new_count = 0;
        let entries: Vec<PreviewEntry> = live
            .into_iter()
            .map(|entry| {
                let processed = inner.ledger.contains(&entry.id);
                if !processed && seen.insert(entry.id.clone()) {
                    new_count += 1;
                }
                PreviewEntry { entry, processed }
            })
            .collect();

        Ok(PreviewReport {
            source,
            total: entries.len(),
            new_count,
            entries,
        })
    }
}

/// Live entries not in the ledger, in list order, first occurrence per id.
fn new_entries(live: Vec<Entry>, ledger: &LedgerState) -> Vec<Entry> {
    let mut seen = HashSet::new();
    live.into_iter()
        .filter(|entry| !ledger.contains(&entry.id) && seen.insert(entry.id.clone()))
        .collect()
}
