//! Spotify Web API response types
//!
//! Only the fields the provider reads are modelled; serde ignores the rest.

use serde::{Deserialize, Serialize};

/// Playlist tracks page
///
/// See: https://developer.spotify.com/documentation/web-api/reference/get-playlists-tracks
#[derive(Debug, Deserialize)]
pub struct PlaylistTracksPage {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,

    /// Absolute URL of the next page
    pub next: Option<String>,

    #[serde(default)]
    pub total: u32,
}

/// One row of a playlist
#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    /// Null when the track was made unavailable
    pub track: Option<SpotifyTrack>,

    #[serde(default)]
    pub is_local: bool,
}

/// Track (or episode) object
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    /// Null for local files
    pub id: Option<String>,

    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub name: String,

    /// "track" or "episode"
    #[serde(rename = "type", default = "default_item_type")]
    pub item_type: String,

    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,

    pub album: Option<SpotifyAlbum>,

    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub explicit: bool,
}

fn default_item_type() -> String {
    "track".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
}

/// Playlist object
///
/// See: https://developer.spotify.com/documentation/web-api/reference/get-playlist
#[derive(Debug, Deserialize)]
pub struct PlaylistObject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub public: Option<bool>,

    #[serde(default)]
    pub collaborative: bool,

    pub owner: Option<PlaylistOwner>,

    pub tracks: PlaylistTracksRef,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistOwner {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistTracksRef {
    #[serde(default)]
    pub total: u32,
}

/// Body of `DELETE /playlists/{id}/tracks`
#[derive(Debug, Serialize)]
pub struct RemoveTracksBody {
    pub tracks: Vec<TrackToRemove>,
}

#[derive(Debug, Serialize)]
pub struct TrackToRemove {
    pub uri: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<u32>>,
}

/// Accounts service token response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,

    /// Present only when Spotify rotates the refresh token
    pub refresh_token: Option<String>,

    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// Web API error envelope: `{"error": {"status": 404, "message": "..."}}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub status: Option<u16>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_page_tolerates_null_tracks() {
        let json = r#"{
            "items": [
                {"track": null, "is_local": false},
                {"track": {"id": null, "uri": "spotify:local:x", "name": "Local", "type": "track"}, "is_local": true}
            ],
            "next": null,
            "total": 2
        }"#;

        let page: PlaylistTracksPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].track.is_none());
        assert!(page.items[1].is_local);
        assert!(page.items[1].track.as_ref().unwrap().id.is_none());
    }

    #[test]
    fn test_remove_body_omits_missing_positions() {
        let body = RemoveTracksBody {
            tracks: vec![TrackToRemove {
                uri: "spotify:track:1".to_string(),
                positions: None,
            }],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"tracks":[{"uri":"spotify:track:1"}]}"#
        );
    }

    #[test]
    fn test_token_response_defaults_lifetime() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.expires_in, 3600);
        assert!(token.refresh_token.is_none());
    }
}
