//! # Application Configuration
//!
//! Settings for the Spotify-to-disk mirror: credentials, polling policy,
//! processing limits, external tool options and on-disk locations.
//!
//! ## Overview
//!
//! [`AppConfig`] is assembled either with [`AppConfig::builder()`] or from the
//! process environment with [`AppConfig::from_env()`], which first loads a
//! `.env` file from the working directory when one exists. Both paths end in
//! [`AppConfig::validate()`], which reports every missing required value at
//! once rather than failing on the first.
//!
//! ## Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SPOTIPY_CLIENT_ID` | required |
//! | `SPOTIPY_CLIENT_SECRET` | required |
//! | `SPOTIFY_PLAYLIST_ID` | required |
//! | `SPOTIPY_REDIRECT_URI` | `http://127.0.0.1:8888/callback` |
//! | `SPOTIFY_REFRESH_TOKEN` / `SPOTIFY_ACCESS_TOKEN` | unset |
//! | `POLL_INTERVAL_SECONDS` | 30 |
//! | `MAX_POLL_INTERVAL_SECONDS` | 300 |
//! | `ERROR_COOLDOWN_SECONDS` | 30 |
//! | `INTER_ENTRY_DELAY_SECONDS` | 2 |
//! | `MAX_CONCURRENT_ENTRIES` | 1 |
//! | `MAX_ATTEMPTS_PER_ENTRY` | 1 |
//! | `ACQUISITION_TIMEOUT_SECONDS` | 600 |
//! | `DOWNLOAD_PATH` | `./downloads` |
//! | `LEDGER_PATH` | `.processed_tracks.json` |
//! | `DATABASE_PATH` | `audio_fetcher.db` |
//! | `ENABLE_FILE_LOGGING` | true |
//! | `LOG_FILE` | `audio_fetcher.log` |
//! | `LOG_LEVEL` | info |
//! | `ENABLE_METADATA_TAGGING` | true |
//! | `DEFAULT_GENRE` | `Electronic` |
//! | `YTDLP_PATH` | `yt-dlp` |
//! | `AUDIO_FORMAT` / `AUDIO_QUALITY` | `mp3` / `192` |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//!
//! let config = AppConfig::builder()
//!     .client_id("abc")
//!     .client_secret("def")
//!     .playlist("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M")
//!     .download_dir("/srv/music")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogLevel, LoggingConfig};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";
pub const DEFAULT_GENRE: &str = "Electronic";

/// Spotify application credentials and the playlist to mirror.
#[derive(Clone, PartialEq, Eq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Long-lived token used to mint access tokens
    pub refresh_token: Option<String>,
    /// Pre-issued access token, used until it is rejected
    pub access_token: Option<String>,
    /// Playlist id, `spotify:playlist:` URI or `open.spotify.com` URL
    pub playlist: String,
}

impl fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("playlist", &self.playlist)
            .finish()
    }
}

/// Activity-adaptive polling policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    pub base_interval: Duration,
    pub max_interval: Duration,
    /// Consecutive no-change passes before the interval starts growing
    pub backoff_threshold: u32,
    pub backoff_factor: f64,
    /// Wait after a failed pass
    pub error_cooldown: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(300),
            backoff_threshold: 3,
            backoff_factor: 1.5,
            error_cooldown: Duration::from_secs(30),
        }
    }
}

/// Per-pass processing limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingConfig {
    pub download_dir: PathBuf,
    /// Pause between consecutive entries of one pass
    pub inter_entry_delay: Duration,
    pub max_concurrent_entries: usize,
    pub acquisition_timeout: Duration,
    /// Failed passes before an entry is ledgered anyway; 1 means never retried
    pub max_attempts_per_entry: u32,
    pub enable_tagging: bool,
    pub default_genre: String,
    /// Upper bound on how long `stop()` waits for an in-flight pass
    pub stop_timeout: Duration,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            inter_entry_delay: Duration::from_secs(2),
            max_concurrent_entries: 1,
            acquisition_timeout: Duration::from_secs(600),
            max_attempts_per_entry: 1,
            enable_tagging: true,
            default_genre: DEFAULT_GENRE.to_string(),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

/// Options for the external `yt-dlp` downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionToolConfig {
    pub ytdlp_path: PathBuf,
    pub audio_format: String,
    pub audio_quality: String,
}

impl Default for AcquisitionToolConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            audio_format: "mp3".to_string(),
            audio_quality: "192".to_string(),
        }
    }
}

/// On-disk locations for durable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub ledger_path: PathBuf,
    pub database_path: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(".processed_tracks.json"),
            database_path: PathBuf::from("audio_fetcher.db"),
        }
    }
}

/// Logging switches as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub enable_file_logging: bool,
    pub log_file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_file_logging: true,
            log_file: PathBuf::from("audio_fetcher.log"),
        }
    }
}

impl LogSettings {
    /// Translate into a subscriber configuration.
    pub fn to_logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::default().with_level(self.level);
        if self.enable_file_logging {
            config.with_log_file(self.log_file.clone())
        } else {
            config
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub spotify: SpotifyCredentials,
    pub polling: PollingConfig,
    pub processing: ProcessingConfig,
    pub acquisition: AcquisitionToolConfig,
    pub storage: StoragePaths,
    pub logging: LogSettings,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Load `.env` (if present) and read the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the `.env` file exists but cannot be
    /// parsed, `Error::InvalidValue` when a value has the wrong type and
    /// `Error::MissingRequired` when required values are absent.
    pub fn from_env() -> Result<Self> {
        let loaded = dotenvy::dotenv().map(|_| true).or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            other => Err(Error::Config(format!("Invalid .env file: {}", other))),
        })?;
        tracing::debug!(env_file_loaded = loaded, "Reading configuration from environment");

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut builder = AppConfig::builder();
        if let Some(v) = get("SPOTIPY_CLIENT_ID") {
            builder = builder.client_id(v);
        }
        if let Some(v) = get("SPOTIPY_CLIENT_SECRET") {
            builder = builder.client_secret(v);
        }
        if let Some(v) = get("SPOTIFY_PLAYLIST_ID") {
            builder = builder.playlist(v);
        }
        if let Some(v) = get("SPOTIPY_REDIRECT_URI") {
            builder = builder.redirect_uri(v);
        }
        if let Some(v) = get("SPOTIFY_REFRESH_TOKEN") {
            builder = builder.refresh_token(v);
        }
        if let Some(v) = get("SPOTIFY_ACCESS_TOKEN") {
            builder = builder.access_token(v);
        }

        if let Some(v) = get("POLL_INTERVAL_SECONDS") {
            builder.polling.base_interval = parse_secs("POLL_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = get("MAX_POLL_INTERVAL_SECONDS") {
            builder.polling.max_interval = parse_secs("MAX_POLL_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = get("ERROR_COOLDOWN_SECONDS") {
            builder.polling.error_cooldown = parse_secs("ERROR_COOLDOWN_SECONDS", &v)?;
        }

        if let Some(v) = get("DOWNLOAD_PATH") {
            builder.processing.download_dir = PathBuf::from(v);
        }
        if let Some(v) = get("INTER_ENTRY_DELAY_SECONDS") {
            builder.processing.inter_entry_delay = parse_secs("INTER_ENTRY_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = get("MAX_CONCURRENT_ENTRIES") {
            builder.processing.max_concurrent_entries = parse_value("MAX_CONCURRENT_ENTRIES", &v)?;
        }
        if let Some(v) = get("MAX_ATTEMPTS_PER_ENTRY") {
            builder.processing.max_attempts_per_entry = parse_value("MAX_ATTEMPTS_PER_ENTRY", &v)?;
        }
        if let Some(v) = get("ACQUISITION_TIMEOUT_SECONDS") {
            builder.processing.acquisition_timeout =
                parse_secs("ACQUISITION_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("ENABLE_METADATA_TAGGING") {
            builder.processing.enable_tagging = parse_bool(&v);
        }
        if let Some(v) = get("DEFAULT_GENRE") {
            builder.processing.default_genre = v;
        }

        if let Some(v) = get("YTDLP_PATH") {
            builder.acquisition.ytdlp_path = PathBuf::from(v);
        }
        if let Some(v) = get("AUDIO_FORMAT") {
            builder.acquisition.audio_format = v;
        }
        if let Some(v) = get("AUDIO_QUALITY") {
            builder.acquisition.audio_quality = v;
        }

        if let Some(v) = get("LEDGER_PATH") {
            builder.storage.ledger_path = PathBuf::from(v);
        }
        if let Some(v) = get("DATABASE_PATH") {
            builder.storage.database_path = PathBuf::from(v);
        }

        if let Some(v) = get("ENABLE_FILE_LOGGING") {
            builder.logging.enable_file_logging = parse_bool(&v);
        }
        if let Some(v) = get("LOG_FILE") {
            builder.logging.log_file = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            builder.logging.level = v.parse()?;
        }

        builder.build()
    }

    /// Check required values and numeric bounds.
    ///
    /// Missing required values are reported together in one error.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<String> = [
            ("SPOTIPY_CLIENT_ID", self.spotify.client_id.is_empty()),
            ("SPOTIPY_CLIENT_SECRET", self.spotify.client_secret.is_empty()),
            ("SPOTIFY_PLAYLIST_ID", self.spotify.playlist.is_empty()),
        ]
        .iter()
        .filter(|(_, is_missing)| *is_missing)
        .map(|(name, _)| name.to_string())
        .collect();

        if !missing.is_empty() {
            return Err(Error::MissingRequired(missing));
        }

        if self.polling.base_interval.is_zero() {
            return Err(Error::Config(
                "Poll interval must be greater than 0 seconds".to_string(),
            ));
        }

        if self.polling.max_interval < self.polling.base_interval {
            return Err(Error::Config(
                "Maximum poll interval cannot be shorter than the base interval".to_string(),
            ));
        }

        if !self.polling.backoff_factor.is_finite() || self.polling.backoff_factor < 1.0 {
            return Err(Error::Config(
                "Backoff factor must be a finite number of at least 1.0".to_string(),
            ));
        }

        if !(1..=16).contains(&self.processing.max_concurrent_entries) {
            return Err(Error::Config(
                "Concurrent entries must be between 1 and 16".to_string(),
            ));
        }

        if self.processing.max_attempts_per_entry == 0 {
            return Err(Error::Config(
                "Attempts per entry must be at least 1".to_string(),
            ));
        }

        if self.processing.acquisition_timeout.is_zero() {
            return Err(Error::Config(
                "Acquisition timeout must be greater than 0 seconds".to_string(),
            ));
        }

        if self.processing.default_genre.trim().is_empty() {
            return Err(Error::Config("Default genre cannot be empty".to_string()));
        }

        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    parse_value::<u64>(key, value).map(Duration::from_secs)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Builder for [`AppConfig`].
///
/// Section structs are public so callers can replace a whole section; the
/// setters cover the values most often overridden.
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    playlist: Option<String>,
    redirect_uri: Option<String>,
    refresh_token: Option<String>,
    access_token: Option<String>,
    pub polling: PollingConfig,
    pub processing: ProcessingConfig,
    pub acquisition: AcquisitionToolConfig,
    pub storage: StoragePaths,
    pub logging: LogSettings,
}

impl AppConfigBuilder {
    pub fn client_id(mut self, value: impl Into<String>) -> Self {
        self.client_id = Some(value.into());
        self
    }

    pub fn client_secret(mut self, value: impl Into<String>) -> Self {
        self.client_secret = Some(value.into());
        self
    }

    /// Playlist to mirror, in any accepted form.
    pub fn playlist(mut self, value: impl Into<String>) -> Self {
        self.playlist = Some(value.into());
        self
    }

    pub fn redirect_uri(mut self, value: impl Into<String>) -> Self {
        self.redirect_uri = Some(value.into());
        self
    }

    pub fn refresh_token(mut self, value: impl Into<String>) -> Self {
        self.refresh_token = Some(value.into());
        self
    }

    pub fn access_token(mut self, value: impl Into<String>) -> Self {
        self.access_token = Some(value.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling.base_interval = interval;
        self
    }

    pub fn max_poll_interval(mut self, interval: Duration) -> Self {
        self.polling.max_interval = interval;
        self
    }

    pub fn download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.processing.download_dir = path.into();
        self
    }

    pub fn max_concurrent_entries(mut self, count: usize) -> Self {
        self.processing.max_concurrent_entries = count;
        self
    }

    pub fn enable_tagging(mut self, enabled: bool) -> Self {
        self.processing.enable_tagging = enabled;
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.ledger_path = path.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.database_path = path.into();
        self
    }

    /// Validate and assemble the configuration.
    pub fn build(self) -> Result<AppConfig> {
        let config = AppConfig {
            spotify: SpotifyCredentials {
                client_id: self.client_id.unwrap_or_default(),
                client_secret: self.client_secret.unwrap_or_default(),
                redirect_uri: self
                    .redirect_uri
                    .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
                refresh_token: self.refresh_token,
                access_token: self.access_token,
                playlist: self.playlist.unwrap_or_default(),
            },
            polling: self.polling,
            processing: self.processing,
            acquisition: self.acquisition,
            storage: self.storage,
            logging: self.logging,
        };

        config.validate()?;

        Ok(config)
    }
}
