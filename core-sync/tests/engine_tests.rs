//! Integration tests for the synchronization engine
//!
//! These tests drive full passes against in-memory collaborators:
//! - a recording entry source that remembers removals
//! - a scripted acquisition provider that writes small files or fails on cue
//! - a recording tagger
//! - an in-memory SQLite result store

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AcquisitionOutcome, AcquisitionProvider, AcquisitionRequest, Entry, EntrySource,
    ProgressReporter, SourceInfo, TagFields, Tagger,
};
use core_runtime::events::{CoreEvent, EntryEvent, EventBus, Receiver, SyncEvent};
use core_sync::db::create_test_pool;
use core_sync::{
    AttemptQuery, AttemptStatus, DedupLedger, EngineConfig, EngineState, ResultStore,
    SqliteResultStore, SyncEngine, SyncError,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Default)]
struct RecordingSource {
    entries: Mutex<Vec<Entry>>,
    removed: Mutex<Vec<(String, Option<u32>)>>,
    fail_listing: AtomicBool,
}

impl RecordingSource {
    fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    fn set_entries(&self, entries: Vec<Entry>) {
        *self.entries.lock().unwrap() = entries;
    }

    fn removed(&self) -> Vec<(String, Option<u32>)> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntrySource for RecordingSource {
    async fn list_entries(&self) -> BridgeResult<Vec<Entry>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("HTTP 503".to_string()));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn remove_entry(&self, uri: &str, position_hint: Option<u32>) -> BridgeResult<bool> {
        self.removed
            .lock()
            .unwrap()
            .push((uri.to_string(), position_hint));
        Ok(true)
    }

    async fn describe(&self) -> BridgeResult<SourceInfo> {
        Ok(SourceInfo {
            id: "list".to_string(),
            name: "Downloads".to_string(),
            description: None,
            public: Some(false),
            collaborative: false,
            total_entries: self.entries.lock().unwrap().len() as u32,
            owner: Some("someone".to_string()),
        })
    }
}

#[derive(Default)]
struct ScriptedProvider {
    failing_keys: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    fn failing(keys: &[&str]) -> Self {
        Self {
            failing_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AcquisitionProvider for ScriptedProvider {
    async fn fetch(
        &self,
        request: AcquisitionRequest,
        _progress: ProgressReporter,
    ) -> BridgeResult<AcquisitionOutcome> {
        self.calls.lock().unwrap().push(request.search_key.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_keys.contains(&request.search_key) {
            return Ok(AcquisitionOutcome::Failed {
                error: "no matching media".to_string(),
            });
        }

        tokio::fs::create_dir_all(&request.output_dir).await?;
        let file_path = request
            .output_dir
            .join(format!("{}.mp3", request.output_name));
        tokio::fs::write(&file_path, b"ID3 not really audio").await?;
        Ok(AcquisitionOutcome::Completed { file_path })
    }
}

#[derive(Default)]
struct RecordingTagger {
    tagged: Mutex<Vec<(PathBuf, TagFields)>>,
}

#[async_trait]
impl Tagger for RecordingTagger {
    async fn apply(&self, path: &Path, fields: &TagFields) -> BridgeResult<bool> {
        self.tagged
            .lock()
            .unwrap()
            .push((path.to_path_buf(), fields.clone()));
        Ok(true)
    }
}

/// Source that behaves like a real list: a removal shifts everything behind
/// it, and a hint is only honoured if that index still holds the uri.
#[derive(Default)]
struct ShiftingSource {
    live: Mutex<Vec<Entry>>,
    rejected_hints: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl EntrySource for ShiftingSource {
    async fn list_entries(&self) -> BridgeResult<Vec<Entry>> {
        let live = self.live.lock().unwrap();
        Ok(live
            .iter()
            .enumerate()
            .map(|(index, e)| e.clone().with_position(index as u32))
            .collect())
    }

    async fn remove_entry(&self, uri: &str, position_hint: Option<u32>) -> BridgeResult<bool> {
        let mut live = self.live.lock().unwrap();
        let index = match position_hint {
            Some(hint) => hint as usize,
            None => match live.iter().position(|e| e.uri == uri) {
                Some(index) => index,
                None => return Ok(false),
            },
        };
        if live.get(index).map(|e| e.uri.as_str()) != Some(uri) {
            self.rejected_hints
                .lock()
                .unwrap()
                .push((uri.to_string(), index as u32));
            return Ok(false);
        }
        live.remove(index);
        Ok(true)
    }

    async fn describe(&self) -> BridgeResult<SourceInfo> {
        Ok(SourceInfo {
            id: "list".to_string(),
            name: "Downloads".to_string(),
            description: None,
            public: None,
            collaborative: false,
            total_entries: self.live.lock().unwrap().len() as u32,
            owner: None,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

fn entry(id: &str, position: u32) -> Entry {
    let upper = id.to_uppercase();
    Entry::new(id, format!("Artist {} - Song {}", upper, upper))
        .with_uri(format!("spotify:track:{}", id))
        .with_position(position)
        .with_artists(vec![format!("Artist {}", upper)])
        .with_title(format!("Song {}", upper))
}

struct Harness {
    dir: TempDir,
    source: Arc<RecordingSource>,
    provider: Arc<ScriptedProvider>,
    tagger: Arc<RecordingTagger>,
    store: Arc<SqliteResultStore>,
    bus: EventBus,
}

impl Harness {
    async fn new(entries: Vec<Entry>, provider: ScriptedProvider) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            source: Arc::new(RecordingSource::with_entries(entries)),
            provider: Arc::new(provider),
            tagger: Arc::new(RecordingTagger::default()),
            store: Arc::new(SqliteResultStore::new(create_test_pool().await.unwrap())),
            bus: EventBus::new(256),
        }
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("ledger.json")
    }

    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            ledger_path: self.ledger_path(),
            ..EngineConfig::default()
        };
        config.polling.base_interval = Duration::from_secs(30);
        config.polling.max_interval = Duration::from_secs(300);
        config.processing.download_dir = self.dir.path().join("downloads");
        config.processing.inter_entry_delay = Duration::ZERO;
        config.processing.acquisition_timeout = Duration::from_secs(5);
        config.processing.stop_timeout = Duration::from_secs(5);
        config
    }

    async fn engine(&self) -> SyncEngine {
        self.engine_with(self.config()).await
    }

    async fn engine_with(&self, config: EngineConfig) -> SyncEngine {
        SyncEngine::new(
            config,
            self.source.clone(),
            self.provider.clone(),
            Some(self.tagger.clone() as Arc<dyn Tagger>),
            self.store.clone(),
            self.bus.clone(),
        )
        .await
    }
}

async fn wait_for<F>(events: &mut Receiver<CoreEvent>, mut predicate: F) -> CoreEvent
where
    F: FnMut(&CoreEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("expected event was not published in time")
}

// ============================================================================
// Pass behaviour
// ============================================================================

#[tokio::test]
async fn test_end_to_end_pass_processes_in_order() {
    let h = Harness::new(vec![entry("a", 0), entry("b", 1)], ScriptedProvider::default()).await;
    let engine = h.engine().await;

    let report = engine.manual_pass().await.unwrap();

    assert_eq!(report.new_entries, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.removed, 2);
    assert_eq!(report.delta, 2);
    assert_eq!(h.provider.calls(), vec!["Artist A - Song A", "Artist B - Song B"]);
    assert_eq!(
        h.source.removed(),
        vec![
            ("spotify:track:a".to_string(), Some(0)),
            // a is gone, so b now sits at index 0
            ("spotify:track:b".to_string(), Some(0)),
        ]
    );

    let status = engine.status().await;
    assert_eq!(status.ledger_size, 2);
    assert_eq!(status.counters.total_downloads, 2);
    assert_eq!(status.counters.successful_downloads, 2);
    assert_eq!(status.counters.failed_downloads, 0);
    assert_eq!(status.counters.tracks_removed, 2);
    assert!(status.counters.last_sync.is_some());

    let tagged = h.tagger.tagged.lock().unwrap().clone();
    assert_eq!(tagged.len(), 2);
    assert_eq!(tagged[0].1.artist.as_deref(), Some("Artist A"));
    assert!(tagged[0].0.ends_with("Artist A - Song A.mp3"));

    let completed = h
        .store
        .count(Some(AttemptStatus::Completed), None)
        .await
        .unwrap();
    assert_eq!(completed, 2);
}

#[tokio::test]
async fn test_partial_failure_marks_both_done() {
    let h = Harness::new(
        vec![entry("a", 0), entry("b", 1)],
        ScriptedProvider::failing(&["Artist A - Song A"]),
    )
    .await;
    let engine = h.engine().await;

    let report = engine.manual_pass().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.delta, 2);

    let status = engine.status().await;
    assert_eq!(status.ledger_size, 2);
    assert_eq!(status.counters.failed_downloads, 1);
    assert_eq!(status.counters.successful_downloads, 1);
    assert_eq!(status.counters.tracks_removed, 1);

    assert_eq!(
        h.source.removed(),
        vec![("spotify:track:b".to_string(), Some(1))]
    );

    let failed = h
        .store
        .list(&AttemptQuery::default().with_status(AttemptStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source_entry_id.as_deref(), Some("a"));
    assert!(failed[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("no matching media"));

    // The failed entry is not retried on the next pass.
    let second = engine.manual_pass().await.unwrap();
    assert_eq!(second.new_entries, 0);
    assert_eq!(h.provider.calls().len(), 2);
}

#[tokio::test]
async fn test_second_pass_without_changes_is_idempotent() {
    let h = Harness::new(vec![entry("a", 0), entry("b", 1)], ScriptedProvider::default()).await;
    let engine = h.engine().await;

    engine.manual_pass().await.unwrap();
    let before = engine.status().await;
    let second = engine.manual_pass().await.unwrap();
    let after = engine.status().await;

    assert_eq!(second.delta, 0);
    assert_eq!(second.new_entries, 0);
    // a quiet pass only moves the check time
    assert_eq!(after.counters, before.counters);
    assert!(after.last_check >= before.last_check);
    assert_eq!(h.store.count(None, None).await.unwrap(), 2);
    assert_eq!(h.provider.calls().len(), 2);
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let h = Harness::new(vec![entry("a", 0)], ScriptedProvider::default()).await;
    {
        let engine = h.engine().await;
        engine.manual_pass().await.unwrap();
    }

    let restored = DedupLedger::new(h.ledger_path()).load().await;
    assert_eq!(restored.ids().collect::<Vec<_>>(), vec!["a"]);

    h.source.set_entries(vec![entry("a", 0), entry("c", 1)]);
    let engine = h.engine().await;
    assert_eq!(engine.status().await.ledger_size, 1);

    let report = engine.manual_pass().await.unwrap();
    assert_eq!(report.new_entries, 1);
    assert_eq!(h.provider.calls(), vec!["Artist A - Song A", "Artist C - Song C"]);
}

#[tokio::test]
async fn test_corrupt_ledger_degrades_to_empty() {
    let h = Harness::new(vec![entry("a", 0)], ScriptedProvider::default()).await;
    std::fs::write(h.ledger_path(), b"not json at all").unwrap();

    let engine = h.engine().await;
    assert_eq!(engine.status().await.ledger_size, 0);
    assert!(h.dir.path().join("ledger.json.corrupt").exists());

    let report = engine.manual_pass().await.unwrap();
    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn test_backoff_then_reset_on_activity() {
    let h = Harness::new(Vec::new(), ScriptedProvider::default()).await;
    let engine = h.engine().await;

    for _ in 0..3 {
        let report = engine.manual_pass().await.unwrap();
        assert_eq!(report.delta, 0);
    }
    let status = engine.status().await;
    assert_eq!(status.interval_secs, 45.0);
    assert_eq!(status.no_change_streak, 3);
    assert!(status.last_check.is_some());

    h.source.set_entries(vec![entry("a", 0)]);
    let report = engine.manual_pass().await.unwrap();
    assert_eq!(report.delta, 1);
    assert_eq!(report.next_interval_secs, 30.0);
    assert_eq!(engine.status().await.no_change_streak, 0);
}

#[tokio::test]
async fn test_listing_failure_aborts_pass_only() {
    let h = Harness::new(vec![entry("a", 0)], ScriptedProvider::default()).await;
    let engine = h.engine().await;

    for _ in 0..4 {
        engine.manual_pass().await.unwrap();
    }
    h.source.fail_listing.store(true, Ordering::SeqCst);

    let err = engine.manual_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Provider(_)));

    let status = engine.status().await;
    assert!(status.last_error.as_deref().unwrap().contains("HTTP 503"));
    assert!(status.last_error_at.is_some());
    assert_eq!(status.interval_secs, 30.0);
    assert_eq!(status.ledger_size, 1);

    h.source.fail_listing.store(false, Ordering::SeqCst);
    assert!(engine.manual_pass().await.is_ok());
}

#[tokio::test]
async fn test_ledger_write_failure_fails_pass() {
    let h = Harness::new(vec![entry("a", 0)], ScriptedProvider::default()).await;
    let blocker = h.dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let mut config = h.config();
    config.ledger_path = blocker.join("ledger.json");
    let engine = h.engine_with(config).await;
    let mut events = h.bus.subscribe();

    let err = engine.manual_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Persistence(_)));
    assert!(engine.status().await.last_error.is_some());

    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Sync(SyncEvent::PassFailed { .. }))
    })
    .await;
}

#[tokio::test]
async fn test_failed_entry_retried_until_attempt_limit() {
    let h = Harness::new(
        vec![entry("a", 0)],
        ScriptedProvider::failing(&["Artist A - Song A"]),
    )
    .await;
    let mut config = h.config();
    config.processing.max_attempts_per_entry = 2;
    let engine = h.engine_with(config).await;

    let first = engine.manual_pass().await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.delta, 0);
    assert_eq!(engine.status().await.ledger_size, 0);

    let second = engine.manual_pass().await.unwrap();
    assert_eq!(second.failed, 1);
    assert_eq!(second.delta, 1);

    let third = engine.manual_pass().await.unwrap();
    assert_eq!(third.new_entries, 0);
    assert_eq!(h.provider.calls().len(), 2);
}

#[tokio::test]
async fn test_bounded_concurrency_keeps_list_order() {
    let h = Harness::new(
        vec![entry("a", 0), entry("b", 1), entry("c", 2), entry("d", 3)],
        ScriptedProvider::slow(Duration::from_millis(50)),
    )
    .await;
    let mut config = h.config();
    config.processing.max_concurrent_entries = 2;
    let engine = h.engine_with(config).await;

    let report = engine.manual_pass().await.unwrap();

    assert_eq!(report.succeeded, 4);
    assert_eq!(h.provider.max_in_flight.load(Ordering::SeqCst), 2);
    let order: Vec<_> = report.outcomes.iter().map(|o| o.entry_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_tagging_disabled_skips_tagger() {
    let h = Harness::new(vec![entry("a", 0)], ScriptedProvider::default()).await;
    let mut config = h.config();
    config.processing.enable_tagging = false;
    let engine = h.engine_with(config).await;

    let report = engine.manual_pass().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(!report.outcomes[0].tagged);
    assert!(h.tagger.tagged.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_removals_follow_shifting_positions() {
    let h = Harness::new(Vec::new(), ScriptedProvider::default()).await;
    let source = Arc::new(ShiftingSource {
        live: Mutex::new(vec![entry("a", 0), entry("b", 1), entry("c", 2)]),
        ..ShiftingSource::default()
    });
    let engine = SyncEngine::new(
        h.config(),
        source.clone(),
        h.provider.clone(),
        None,
        h.store.clone(),
        h.bus.clone(),
    )
    .await;

    let report = engine.manual_pass().await.unwrap();

    assert_eq!(report.removed, 3);
    assert!(source.rejected_hints.lock().unwrap().is_empty());
    assert!(source.live.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_removals_skip_failed_entries_when_shifting() {
    let h = Harness::new(
        Vec::new(),
        ScriptedProvider::failing(&["Artist B - Song B"]),
    )
    .await;
    let source = Arc::new(ShiftingSource {
        live: Mutex::new(vec![entry("a", 0), entry("b", 1), entry("c", 2)]),
        ..ShiftingSource::default()
    });
    let mut config = h.config();
    config.processing.max_concurrent_entries = 3;
    let engine = SyncEngine::new(
        config,
        source.clone(),
        h.provider.clone(),
        None,
        h.store.clone(),
        h.bus.clone(),
    )
    .await;

    let report = engine.manual_pass().await.unwrap();

    assert_eq!(report.removed, 2);
    assert!(source.rejected_hints.lock().unwrap().is_empty());
    let remaining: Vec<_> = source
        .live
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(remaining, vec!["b"]);
}

// ============================================================================
// Maintenance
// ============================================================================

#[tokio::test]
async fn test_reset_ledger_reprocesses_live_entries() {
    let h = Harness::new(vec![entry("a", 0), entry("b", 1)], ScriptedProvider::default()).await;
    let engine = h.engine().await;
    engine.manual_pass().await.unwrap();

    let mut events = h.bus.subscribe();
    assert_eq!(engine.reset_ledger().await.unwrap(), 2);
    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Sync(SyncEvent::LedgerReset { cleared: 2 }))
    })
    .await;

    assert_eq!(DedupLedger::new(h.ledger_path()).load().await.len(), 0);

    let report = engine.manual_pass().await.unwrap();
    assert_eq!(report.new_entries, 2);
    assert_eq!(h.provider.calls().len(), 4);
}

#[tokio::test]
async fn test_preview_flags_processed_entries() {
    let h = Harness::new(vec![entry("a", 0)], ScriptedProvider::default()).await;
    let engine = h.engine().await;
    engine.manual_pass().await.unwrap();

    h.source.set_entries(vec![entry("a", 0), entry("b", 1)]);
    let preview = engine.preview().await.unwrap();

    assert_eq!(preview.source.name, "Downloads");
    assert_eq!(preview.total, 2);
    assert_eq!(preview.new_count, 1);
    assert!(preview.entries[0].processed);
    assert!(!preview.entries[1].processed);

    // Preview never processes anything.
    assert_eq!(h.provider.calls().len(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_runs_initial_pass_and_blocks_manual_pass() {
    let h = Harness::new(vec![entry("a", 0)], ScriptedProvider::default()).await;
    let engine = h.engine().await;
    let mut events = h.bus.subscribe();

    engine.start().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Sync(SyncEvent::PassCompleted { .. }))
    })
    .await;

    let status = engine.status().await;
    assert!(status.running);
    assert_eq!(status.state, EngineState::Running);
    assert_eq!(status.ledger_size, 1);

    assert!(matches!(
        engine.manual_pass().await,
        Err(SyncError::AlreadyRunning)
    ));
    assert!(matches!(engine.start().await, Err(SyncError::AlreadyRunning)));

    engine.stop().await.unwrap();
    let status = engine.status().await;
    assert_eq!(status.state, EngineState::Stopped);
    assert!(!status.running);

    wait_for(&mut events, |e| matches!(e, CoreEvent::Sync(SyncEvent::EngineStopped))).await;
    assert!(engine.manual_pass().await.is_ok());
}

#[tokio::test]
async fn test_stop_lets_current_entry_finish() {
    let h = Harness::new(
        vec![entry("a", 0), entry("b", 1)],
        ScriptedProvider::slow(Duration::from_millis(300)),
    )
    .await;
    let engine = h.engine().await;
    let mut events = h.bus.subscribe();

    engine.start().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Entry(EntryEvent::Started { entry_id, .. }) if entry_id == "a")
    })
    .await;

    engine.stop().await.unwrap();

    assert_eq!(h.provider.calls(), vec!["Artist A - Song A"]);
    let ledger = DedupLedger::new(h.ledger_path()).load().await;
    assert!(ledger.contains("a"));
    assert!(!ledger.contains("b"));

    let records = h.store.list(&AttemptQuery::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AttemptStatus::Completed);
}

#[tokio::test]
async fn test_stop_timeout_leaves_entry_finishing_in_background() {
    let h = Harness::new(
        vec![entry("a", 0), entry("b", 1)],
        ScriptedProvider::slow(Duration::from_millis(600)),
    )
    .await;
    let mut config = h.config();
    config.processing.stop_timeout = Duration::from_millis(50);
    let engine = h.engine_with(config).await;
    let mut events = h.bus.subscribe();

    engine.start().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Entry(EntryEvent::Started { entry_id, .. }) if entry_id == "a")
    })
    .await;

    let begun = std::time::Instant::now();
    engine.stop().await.unwrap();
    assert!(begun.elapsed() < Duration::from_millis(500));
    assert_eq!(engine.status().await.state, EngineState::Stopped);
    assert!(h.ledger_path().exists());

    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Entry(EntryEvent::Completed { entry_id, .. }) if entry_id == "a")
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, CoreEvent::Sync(SyncEvent::PassCompleted { .. }))
    })
    .await;

    let records = h.store.list(&AttemptQuery::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AttemptStatus::Completed);
    assert_eq!(h.provider.calls(), vec!["Artist A - Song A"]);

    let ledger = DedupLedger::new(h.ledger_path()).load().await;
    assert!(ledger.contains("a"));
    assert!(!ledger.contains("b"));
}

#[tokio::test]
async fn test_stop_when_stopped_is_noop() {
    let h = Harness::new(Vec::new(), ScriptedProvider::default()).await;
    let engine = h.engine().await;
    assert!(engine.stop().await.is_ok());
    assert_eq!(engine.status().await.state, EngineState::Stopped);
}
