//! # Spotify Provider
//!
//! Spotify Web API implementation of the `EntrySource` bridge trait.
//!
//! ## Overview
//!
//! [`SpotifyPlaylistSource`] mirrors one playlist: it pages through the
//! playlist's tracks, maps each track to an [`Entry`](bridge_traits::Entry),
//! removes handled tracks and describes the playlist. Access tokens are
//! minted from a refresh token by [`SpotifyAuth`] and renewed when they
//! expire or the API answers 401.
//!
//! The interactive authorization-code flow is not handled here; the host is
//! expected to provide a refresh token (or a pre-issued access token).

pub mod auth;
pub mod connector;
pub mod error;
pub mod playlist;
pub mod types;

pub use auth::{SpotifyAuth, SpotifyAuthConfig};
pub use connector::SpotifyPlaylistSource;
pub use error::{Result, SpotifyError};
pub use playlist::PlaylistId;
