//! Core service façade and bootstrap helpers.
//!
//! This crate wires the collaborators the engine needs (entry source,
//! acquisition provider, tagger, result store) into a [`SyncService`]. Desktop
//! hosts enable the `desktop-shims` feature (the default) and call
//! [`bootstrap_desktop`], which builds the Spotify source, the `yt-dlp`
//! provider, the lofty tagger and the SQLite store from an [`AppConfig`].
//! Tests and embedders can assemble [`CoreDependencies`] by hand instead.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{acquisition::AcquisitionProvider, source::EntrySource, tagging::Tagger};
use core_runtime::config::AppConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{
    AttemptQuery, AttemptRecord, AttemptStats, EngineConfig, EngineStatus, EntryOutcome,
    PassReport, PreviewReport, ResultStore, SyncEngine,
};
use tracing::info;

#[cfg(feature = "desktop-shims")]
pub use desktop::bootstrap_desktop;

/// Aggregated handle to the collaborators the engine requires.
pub struct CoreDependencies {
    pub source: Arc<dyn EntrySource>,
    pub provider: Arc<dyn AcquisitionProvider>,
    pub tagger: Option<Arc<dyn Tagger>>,
    pub store: Arc<dyn ResultStore>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(
        source: Arc<dyn EntrySource>,
        provider: Arc<dyn AcquisitionProvider>,
        tagger: Option<Arc<dyn Tagger>>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            source,
            provider,
            tagger,
            store,
        }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SyncService {
    config: Arc<AppConfig>,
    engine: Arc<SyncEngine>,
    store: Arc<dyn ResultStore>,
    event_bus: EventBus,
}

impl SyncService {
    /// Create a new service from the provided dependencies.
    ///
    /// Loads the ledger from `config.storage.ledger_path`; the engine is not
    /// started.
    pub async fn new(config: AppConfig, deps: CoreDependencies) -> Self {
        let event_bus = EventBus::default();
        let engine = SyncEngine::new(
            EngineConfig::from_app(&config),
            deps.source,
            deps.provider,
            deps.tagger,
            Arc::clone(&deps.store),
            event_bus.clone(),
        )
        .await;

        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            store: deps.store,
            event_bus,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Direct access to the engine.
    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    /// Subscribe to engine and entry events.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub async fn start(&self) -> Result<()> {
        self.engine.start().await?;
        info!("Sync service started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.engine.stop().await?;
        info!("Sync service stopped");
        Ok(())
    }

    pub async fn status(&self) -> EngineStatus {
        self.engine.status().await
    }

    pub async fn manual_pass(&self) -> Result<PassReport> {
        Ok(self.engine.manual_pass().await?)
    }

    pub async fn reset_ledger(&self) -> Result<usize> {
        Ok(self.engine.reset_ledger().await?)
    }

    pub async fn preview(&self) -> Result<PreviewReport> {
        Ok(self.engine.preview().await?)
    }

    /// Download a search query or media URL outside the playlist. The
    /// attempt is recorded with the `manual` source type.
    pub async fn download(&self, query: &str, filename: Option<&str>) -> Result<EntryOutcome> {
        Ok(self.engine.download(query, filename).await?)
    }

    /// Page through attempt records, newest first.
    pub async fn attempts(&self, query: &AttemptQuery) -> Result<Vec<AttemptRecord>> {
        Ok(self.store.list(query).await?)
    }

    pub async fn search_attempts(&self, term: &str, limit: u32) -> Result<Vec<AttemptRecord>> {
        Ok(self.store.search(term, limit).await?)
    }

    pub async fn stats(&self) -> Result<AttemptStats> {
        Ok(self.store.stats().await?)
    }
}

#[cfg(feature = "desktop-shims")]
mod desktop {
    use std::sync::Arc;

    use bridge_desktop::{ReqwestHttpClient, YtDlpAcquisitionProvider, YtDlpConfig};
    use bridge_traits::http::HttpClient;
    use core_metadata::LoftyTagger;
    use core_runtime::config::AppConfig;
    use core_sync::{create_pool, DatabaseConfig, SqliteResultStore};
    use provider_spotify::SpotifyPlaylistSource;
    use tracing::info;

    use super::{CoreDependencies, Result, SyncService};

    /// Build a ready-to-start service from configuration.
    ///
    /// Opens (and migrates) the SQLite result store, builds the HTTP client,
    /// the Spotify source, the `yt-dlp` provider and the lofty tagger. Nothing
    /// touches the network until the engine runs a pass.
    ///
    /// Logging is left to the host; see
    /// [`core_runtime::logging::init_logging`].
    ///
    /// # Errors
    ///
    /// - `Config` if the configuration fails validation
    /// - `Spotify` if the playlist reference cannot be parsed
    /// - `Sync` if the database cannot be opened or migrated
    /// - `Bridge` if the HTTP client cannot be built
    ///
    /// # Example
    ///
    /// ```ignore
    /// use core_runtime::AppConfig;
    ///
    /// let config = AppConfig::from_env()?;
    /// core_runtime::logging::init_logging(config.logging.to_logging_config())?;
    /// let service = core_service::bootstrap_desktop(config).await?;
    /// service.start().await?;
    /// ```
    pub async fn bootstrap_desktop(config: AppConfig) -> Result<SyncService> {
        config.validate()?;

        let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        let source = SpotifyPlaylistSource::from_credentials(http_client, &config.spotify)?;
        info!(playlist = %source.playlist_id(), "Spotify source ready");

        let provider = YtDlpAcquisitionProvider::new(YtDlpConfig {
            executable: config.acquisition.ytdlp_path.clone(),
            audio_format: config.acquisition.audio_format.clone(),
            audio_quality: config.acquisition.audio_quality.clone(),
            extra_args: Vec::new(),
        });

        let tagger = LoftyTagger::new(config.processing.default_genre.clone());

        let pool = create_pool(DatabaseConfig::new(&config.storage.database_path)).await?;
        let store = SqliteResultStore::new(pool);

        let deps = CoreDependencies::new(
            Arc::new(source),
            Arc::new(provider),
            Some(Arc::new(tagger)),
            Arc::new(store),
        );

        Ok(SyncService::new(config, deps).await)
    }
}
