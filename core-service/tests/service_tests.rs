//! Service façade tests against in-memory collaborators.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AcquisitionOutcome, AcquisitionProvider, AcquisitionRequest, Entry, EntrySource,
    ProgressReporter, SourceInfo,
};
use core_runtime::config::AppConfig;
use core_runtime::events::{CoreEvent, SyncEvent};
use core_service::{CoreDependencies, CoreError, SyncService};
use core_sync::db::create_test_pool;
use core_sync::{AttemptQuery, AttemptStatus, EngineState, SourceType, SqliteResultStore};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct StaticSource {
    entries: Vec<Entry>,
    removed: Mutex<Vec<String>>,
}

#[async_trait]
impl EntrySource for StaticSource {
    async fn list_entries(&self) -> BridgeResult<Vec<Entry>> {
        let removed = self.removed.lock().unwrap();
        Ok(self
            .entries
            .iter()
            .filter(|e| !removed.contains(&e.uri))
            .cloned()
            .collect())
    }

    async fn remove_entry(&self, uri: &str, _position_hint: Option<u32>) -> BridgeResult<bool> {
        self.removed.lock().unwrap().push(uri.to_string());
        Ok(true)
    }

    async fn describe(&self) -> BridgeResult<SourceInfo> {
        Ok(SourceInfo {
            id: "pl1".to_string(),
            name: "Inbox".to_string(),
            description: None,
            public: None,
            collaborative: false,
            total_entries: self.entries.len() as u32,
            owner: None,
        })
    }
}

struct FileWritingProvider;

#[async_trait]
impl AcquisitionProvider for FileWritingProvider {
    async fn fetch(
        &self,
        request: AcquisitionRequest,
        _progress: ProgressReporter,
    ) -> BridgeResult<AcquisitionOutcome> {
        tokio::fs::create_dir_all(&request.output_dir).await?;
        let file_path = request
            .output_dir
            .join(format!("{}.mp3", request.output_name));
        tokio::fs::write(&file_path, b"audio").await?;
        Ok(AcquisitionOutcome::Completed { file_path })
    }
}

fn config(dir: &Path, playlist: &str) -> AppConfig {
    let mut config = AppConfig::builder()
        .client_id("client")
        .client_secret("secret")
        .access_token("token")
        .playlist(playlist)
        .download_dir(dir.join("downloads"))
        .ledger_path(dir.join("ledger.json"))
        .database_path(dir.join("results.db"))
        .enable_tagging(false)
        .build()
        .unwrap();
    config.processing.inter_entry_delay = Duration::ZERO;
    config
}

fn entry(id: &str) -> Entry {
    Entry::new(id, format!("Artist - {}", id))
        .with_uri(format!("spotify:track:{}", id))
        .with_artists(vec!["Artist".to_string()])
        .with_title(id)
}

async fn service(dir: &TempDir, entries: Vec<Entry>) -> SyncService {
    let store = SqliteResultStore::new(create_test_pool().await.unwrap());
    let deps = CoreDependencies::new(
        Arc::new(StaticSource {
            entries,
            removed: Mutex::new(Vec::new()),
        }),
        Arc::new(FileWritingProvider),
        None,
        Arc::new(store),
    );
    SyncService::new(config(dir.path(), "pl1"), deps).await
}

#[tokio::test]
async fn test_manual_pass_records_attempts() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, vec![entry("one"), entry("two")]).await;

    let report = service.manual_pass().await.unwrap();
    assert_eq!(report.new_entries, 2);
    assert_eq!(report.succeeded, 2);

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.success_rate, 100.0);

    let completed = service
        .attempts(&AttemptQuery::default().with_status(AttemptStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);

    let found = service.search_attempts("two", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].source_entry_id.as_deref(), Some("two"));

    let status = service.status().await;
    assert_eq!(status.ledger_size, 2);
    assert_eq!(status.state, EngineState::Stopped);
}

#[tokio::test]
async fn test_preview_and_reset() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, vec![entry("one")]).await;

    let preview = service.preview().await.unwrap();
    assert_eq!(preview.source.name, "Inbox");
    assert_eq!(preview.new_count, 1);

    service.manual_pass().await.unwrap();
    assert_eq!(service.reset_ledger().await.unwrap(), 1);
    assert_eq!(service.status().await.ledger_size, 0);
}

#[tokio::test]
async fn test_subscribers_see_pass_events() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, vec![entry("one")]).await;
    let mut events = service.subscribe();

    service.manual_pass().await.unwrap();

    let mut saw_completed = false;
    while let Some(Ok(event)) = events.try_recv() {
        if let CoreEvent::Sync(SyncEvent::PassCompleted { succeeded, .. }) = event {
            assert_eq!(succeeded, 1);
            saw_completed = true;
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn test_manual_download_is_recorded_outside_the_ledger() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, vec![entry("one")]).await;

    let outcome = service
        .download("Guest - Jam (Official Audio)", None)
        .await
        .unwrap();
    assert!(outcome.succeeded());
    assert!(dir.path().join("downloads").join("Guest - Jam.mp3").exists());

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.manual, 1);
    assert_eq!(stats.playlist, 0);

    let manual = service
        .attempts(&AttemptQuery::default().with_source(SourceType::Manual))
        .await
        .unwrap();
    assert_eq!(manual.len(), 1);
    assert_eq!(manual[0].artist.as_deref(), Some("Guest"));
    assert_eq!(manual[0].track_name.as_deref(), Some("Jam"));

    assert_eq!(service.status().await.ledger_size, 0);
    assert_eq!(service.preview().await.unwrap().new_count, 1);

    assert!(matches!(
        service.download("   ", None).await,
        Err(CoreError::Sync(core_sync::SyncError::Acquisition(_)))
    ));
}

#[tokio::test]
async fn test_start_and_stop() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, vec![]).await;

    service.start().await.unwrap();
    assert!(matches!(
        service.start().await,
        Err(CoreError::Sync(core_sync::SyncError::AlreadyRunning))
    ));
    service.stop().await.unwrap();
    assert_eq!(service.status().await.state, EngineState::Stopped);
}

#[cfg(feature = "desktop-shims")]
#[tokio::test]
async fn test_bootstrap_desktop_builds_stopped_service() {
    let dir = TempDir::new().unwrap();
    let service = core_service::bootstrap_desktop(config(dir.path(), "spotify:playlist:abc123"))
        .await
        .unwrap();

    let status = service.status().await;
    assert_eq!(status.state, EngineState::Stopped);
    assert_eq!(status.ledger_size, 0);
    assert!(dir.path().join("results.db").exists());
}

#[cfg(feature = "desktop-shims")]
#[tokio::test]
async fn test_bootstrap_desktop_rejects_bad_playlist() {
    let dir = TempDir::new().unwrap();
    let result =
        core_service::bootstrap_desktop(config(dir.path(), "https://example.com/not-a-playlist"))
            .await;
    assert!(matches!(result, Err(CoreError::Spotify(_))));
}
