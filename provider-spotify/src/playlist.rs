//! Playlist reference parsing

use std::fmt;
use std::str::FromStr;

use crate::error::SpotifyError;

const URI_PREFIX: &str = "spotify:playlist:";
const URL_MARKER: &str = "open.spotify.com/playlist/";

/// Bare Spotify playlist id.
///
/// Accepts the forms users paste into configuration:
///
/// - `37i9dQZF1DXcBWIGoYBM5M`
/// - `spotify:playlist:37i9dQZF1DXcBWIGoYBM5M`
/// - `https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=...`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistId(String);

impl PlaylistId {
    pub fn parse(reference: &str) -> Result<Self, SpotifyError> {
        let trimmed = reference.trim();

        let candidate = if let Some(rest) = trimmed.strip_prefix(URI_PREFIX) {
            rest
        } else if let Some(index) = trimmed.find(URL_MARKER) {
            let rest = &trimmed[index + URL_MARKER.len()..];
            rest.split(&['?', '#', '/'][..]).next().unwrap_or_default()
        } else {
            trimmed
        };

        if candidate.is_empty() || !candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SpotifyError::InvalidPlaylist(reference.to_string()));
        }

        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PlaylistId {
    type Err = SpotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
