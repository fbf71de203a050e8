use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[cfg(feature = "desktop-shims")]
    #[error("Spotify error: {0}")]
    Spotify(#[from] provider_spotify::SpotifyError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
