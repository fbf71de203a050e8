//! Error types for the Spotify provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Spotify provider errors
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Token refresh failed or the API rejected the token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Spotify API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// Playlist does not exist or is not visible to the token's user
    #[error("Playlist not found: {playlist_id}")]
    PlaylistNotFound { playlist_id: String },

    /// Configured playlist reference could not be parsed
    #[error("Invalid playlist reference: {0}")]
    InvalidPlaylist(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Spotify operations
pub type Result<T> = std::result::Result<T, SpotifyError>;

impl From<SpotifyError> for BridgeError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::AuthenticationFailed(msg) => BridgeError::Unauthorized(msg),
            SpotifyError::ApiError {
                status_code,
                message,
            } => BridgeError::OperationFailed(format!(
                "API error (status {}): {}",
                status_code, message
            )),
            SpotifyError::RateLimitExceeded {
                retry_after_seconds,
            } => BridgeError::OperationFailed(format!(
                "Rate limit exceeded, retry after {} seconds",
                retry_after_seconds
            )),
            SpotifyError::PlaylistNotFound { playlist_id } => {
                BridgeError::OperationFailed(format!("Playlist not found: {}", playlist_id))
            }
            SpotifyError::InvalidPlaylist(reference) => {
                BridgeError::NotAvailable(format!("Invalid playlist reference: {}", reference))
            }
            SpotifyError::ParseError(msg) => BridgeError::InvalidResponse(msg),
            SpotifyError::BridgeError(e) => e,
        }
    }
}
