//! Spotify playlist connector
//!
//! Implements the `EntrySource` trait for one playlist through the Spotify
//! Web API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::source::{Entry, EntrySource, SourceInfo};
use core_metadata::sanitize_filename;
use core_runtime::config::SpotifyCredentials;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::auth::{SpotifyAuth, SpotifyAuthConfig};
use crate::error::{Result, SpotifyError};
use crate::playlist::PlaylistId;
use crate::types::{
    ApiErrorEnvelope, PlaylistObject, PlaylistTracksPage, RemoveTracksBody, SpotifyTrack,
    TrackToRemove,
};

/// Spotify Web API base URL
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Maximum items per page (Spotify API limit)
const PAGE_LIMIT: u32 = 100;

/// Upper bound on pages followed in one listing (10,000-track playlist cap)
const MAX_PAGES: usize = 100;

/// Fields requested for playlist items
const TRACK_FIELDS: &str =
    "items(is_local,track(id,uri,name,type,explicit,duration_ms,artists(name),album(name))),next,total";

/// Fields requested for the playlist itself
const PLAYLIST_FIELDS: &str =
    "id,name,description,public,collaborative,owner(id,display_name),tracks(total)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Spotify playlist connector
///
/// # Features
///
/// - Paginated track listing following the API's `next` links
/// - Track-to-`Entry` mapping with sanitized output names
/// - Position-pinned removal with a fallback to removing by URI
/// - Token refresh and replay on 401
/// - Exponential backoff on 5xx, `Retry-After` on 429
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyPlaylistSource;
/// use bridge_traits::source::EntrySource;
///
/// let source = SpotifyPlaylistSource::from_credentials(http_client, &config.spotify)?;
/// let entries = source.list_entries().await?;
/// ```
pub struct SpotifyPlaylistSource {
    http_client: Arc<dyn HttpClient>,
    auth: Arc<SpotifyAuth>,
    playlist_id: PlaylistId,
    api_base: String,
    max_retries: u32,
}

impl SpotifyPlaylistSource {
    /// Create a new connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `auth` - Token manager; shared so several sources can reuse one token
    /// * `playlist_id` - Playlist to mirror
    pub fn new(http_client: Arc<dyn HttpClient>, auth: Arc<SpotifyAuth>, playlist_id: PlaylistId) -> Self {
        Self {
            http_client,
            auth,
            playlist_id,
            api_base: SPOTIFY_API_BASE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Build a connector from application credentials.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPlaylist` if the configured playlist reference is not a
    /// bare id, a `spotify:playlist:` URI or an `open.spotify.com` URL.
    pub fn from_credentials(
        http_client: Arc<dyn HttpClient>,
        credentials: &SpotifyCredentials,
    ) -> Result<Self> {
        let playlist_id = PlaylistId::parse(&credentials.playlist)?;
        let auth = Arc::new(SpotifyAuth::new(
            SpotifyAuthConfig::from(credentials),
            Arc::clone(&http_client),
        ));
        Ok(Self::new(http_client, auth, playlist_id))
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn playlist_id(&self) -> &PlaylistId {
        &self.playlist_id
    }

    fn tracks_url(&self) -> String {
        format!("{}/playlists/{}/tracks", self.api_base, self.playlist_id)
    }

    /// Map a playlist track to an entry.
    ///
    /// Returns `None` for episodes, local files and unavailable tracks.
    pub(crate) fn to_entry(track: SpotifyTrack, position: u32) -> Option<Entry> {
        if track.item_type != "track" {
            return None;
        }
        let id = track.id.filter(|id| !id.is_empty())?;

        let artists: Vec<String> = track.artists.into_iter().map(|a| a.name).collect();
        let search_key = match artists.first() {
            Some(first) => format!("{} - {}", first, track.name),
            None => track.name.clone(),
        };
        let display_name = if artists.is_empty() {
            track.name.clone()
        } else {
            format!("{} - {}", artists.join(", "), track.name)
        };
        let uri = if track.uri.is_empty() {
            format!("spotify:track:{}", id)
        } else {
            track.uri
        };

        let mut entry = Entry::new(id, search_key.clone())
            .with_uri(uri)
            .with_position(position)
            .with_output_name(sanitize_filename(&search_key))
            .with_artists(artists)
            .with_title(track.name);
        entry.display_name = display_name;
        entry.collection = track.album.map(|album| album.name);
        entry.duration_ms = track.duration_ms;
        entry.explicit = track.explicit;

        Some(entry)
    }

    /// Execute an authorized API request with retry logic
    ///
    /// Returns the final response for 2xx and for client errors other than
    /// 401 and 429, so callers can interpret them. A 401 invalidates the token
    /// and replays once; 429 honours `Retry-After`; 5xx and transport errors
    /// back off exponentially.
    #[instrument(skip(self, body))]
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&RemoveTracksBody>,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;
        let mut replayed_auth = false;

        loop {
            let token = self.auth.access_token().await?;
            let mut request = HttpRequest::new(method, url)
                .bearer_token(token)
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);
            if let Some(body) = body {
                request = request.json(body)?;
            }

            match self.http_client.execute(request).await {
                Ok(response) => {
                    let status = response.status;

                    if response.is_success() {
                        debug!("API request succeeded: status={}", status);
                        return Ok(response);
                    }

                    if status == 401 {
                        if !replayed_auth && self.auth.can_refresh().await {
                            replayed_auth = true;
                            self.auth.invalidate().await;
                            continue;
                        }
                        self.auth.invalidate().await;
                        return Err(SpotifyError::AuthenticationFailed(error_message(&response)));
                    }

                    if status == 429 || response.is_server_error() {
                        attempt += 1;
                        if attempt >= self.max_retries {
                            warn!(
                                "API request failed after {} attempts: status={}",
                                self.max_retries, status
                            );
                            if status == 429 {
                                return Err(SpotifyError::RateLimitExceeded {
                                    retry_after_seconds: retry_after(&response).unwrap_or(0),
                                });
                            }
                            return Err(SpotifyError::ApiError {
                                status_code: status,
                                message: format!("Request failed after {} retries", self.max_retries),
                            });
                        }

                        let backoff = match retry_after(&response) {
                            Some(seconds) if status == 429 => Duration::from_secs(seconds),
                            _ => Duration::from_millis(100u64 * 2u64.pow(attempt)),
                        };
                        warn!(
                            "API request failed (attempt {}/{}): status={}, retrying in {}ms",
                            attempt,
                            self.max_retries,
                            status,
                            backoff.as_millis()
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        warn!("API request failed after {} attempts: {}", self.max_retries, e);
                        return Err(e.into());
                    }

                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt, self.max_retries, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(HttpMethod::Get, url, None).await?;

        if response.status == 404 {
            return Err(SpotifyError::PlaylistNotFound {
                playlist_id: self.playlist_id.to_string(),
            });
        }
        if !response.is_success() {
            return Err(SpotifyError::ApiError {
                status_code: response.status,
                message: error_message(&response),
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| SpotifyError::ParseError(e.to_string()))
    }

    async fn delete_tracks(&self, uri: &str, positions: Option<Vec<u32>>) -> Result<HttpResponse> {
        let body = RemoveTracksBody {
            tracks: vec![TrackToRemove {
                uri: uri.to_string(),
                positions,
            }],
        };
        self.send(HttpMethod::Delete, &self.tracks_url(), Some(&body))
            .await
    }
}

/// Seconds from a `Retry-After` header
fn retry_after(response: &HttpResponse) -> Option<u64> {
    response
        .header("Retry-After")
        .and_then(|value| value.trim().parse().ok())
}

/// Message from the API error envelope, or the raw body
fn error_message(response: &HttpResponse) -> String {
    match serde_json::from_slice::<ApiErrorEnvelope>(&response.body) {
        Ok(envelope) => envelope
            .error
            .message
            .unwrap_or_else(|| format!("status {}", response.status)),
        Err(_) => String::from_utf8_lossy(&response.body).to_string(),
    }
}

#[async_trait]
impl EntrySource for SpotifyPlaylistSource {
    #[instrument(skip(self), fields(playlist = %self.playlist_id))]
    async fn list_entries(&self) -> BridgeResult<Vec<Entry>> {
        let mut next = Some(format!(
            "{}?limit={}&fields={}",
            self.tracks_url(),
            PAGE_LIMIT,
            urlencoding::encode(TRACK_FIELDS)
        ));
        let mut entries = Vec::new();
        let mut skipped = 0usize;
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if pages >= MAX_PAGES {
                warn!(pages, "Stopped following playlist pages at the page cap");
                break;
            }
            pages += 1;

            let page: PlaylistTracksPage = self.get_json(&url).await?;
            debug!(page = pages, items = page.items.len(), total = page.total, "Fetched playlist page");

            for item in page.items {
                let position = entries.len() as u32;
                match item.track.and_then(|track| Self::to_entry(track, position)) {
                    Some(entry) => entries.push(entry),
                    None => skipped += 1,
                }
            }

            next = page.next;
        }

        info!(
            "Retrieved {} tracks from playlist {} ({} skipped)",
            entries.len(),
            self.playlist_id,
            skipped
        );
        Ok(entries)
    }

    #[instrument(skip(self), fields(playlist = %self.playlist_id))]
    async fn remove_entry(&self, uri: &str, position_hint: Option<u32>) -> BridgeResult<bool> {
        let mut response = self
            .delete_tracks(uri, position_hint.map(|position| vec![position]))
            .await?;

        if response.status == 400 && position_hint.is_some() {
            // The playlist moved since it was listed; fall back to removing by URI.
            warn!(
                "Positioned removal rejected: {}; retrying without positions",
                error_message(&response)
            );
            response = self.delete_tracks(uri, None).await?;
        }

        if response.is_success() {
            info!("Removed track {} from playlist {}", uri, self.playlist_id);
            return Ok(true);
        }

        warn!(
            status = response.status,
            "Playlist declined removal of {}: {}",
            uri,
            error_message(&response)
        );
        Ok(false)
    }

    #[instrument(skip(self), fields(playlist = %self.playlist_id))]
    async fn describe(&self) -> BridgeResult<SourceInfo> {
        let url = format!(
            "{}/playlists/{}?fields={}",
            self.api_base,
            self.playlist_id,
            urlencoding::encode(PLAYLIST_FIELDS)
        );
        let playlist: PlaylistObject = self.get_json(&url).await?;

        Ok(SourceInfo {
            id: playlist.id,
            name: playlist.name,
            description: playlist.description.filter(|d| !d.is_empty()),
            public: playlist.public,
            collaborative: playlist.collaborative,
            total_entries: playlist.tracks.total,
            owner: playlist
                .owner
                .and_then(|owner| owner.display_name.or(owner.id)),
        })
    }
}
