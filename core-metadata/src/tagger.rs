//! Audio tag writing backed by `lofty`.
//!
//! [`LoftyTagger`] implements the [`Tagger`] seam. Tag I/O is synchronous, so
//! every call runs on the blocking pool.
//!
//! Field resolution happens before any I/O:
//! - artist and title come from the caller, or from an "Artist - Title"
//!   filename when the caller supplied neither
//! - album artist mirrors the artist
//! - album is written only when [`is_valid_album`] accepts it
//! - genre falls back to the configured default

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    tagging::{TagFields, Tagger},
};
use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{MetadataError, Result};
use crate::naming::{clean_artist, clean_title, is_valid_album, parse_artist_title};

/// Values that will actually be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genre: String,
    pub bpm: Option<u32>,
}

/// Apply fallbacks and validity rules to caller-supplied fields.
pub fn resolve_tags(path: &Path, fields: &TagFields, default_genre: &str) -> ResolvedTags {
    let non_blank = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let mut artist = non_blank(&fields.artist).map(|a| clean_artist(&a));
    let mut title = non_blank(&fields.title).map(|t| clean_title(&t));

    if artist.is_none() && title.is_none() {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let (parsed_artist, parsed_title) = parse_artist_title(stem);
        artist = parsed_artist;
        title = parsed_title;
    }

    let album = non_blank(&fields.album)
        .filter(|album| is_valid_album(album, title.as_deref().unwrap_or_default()));

    let genre = non_blank(&fields.genre).unwrap_or_else(|| default_genre.to_string());

    ResolvedTags {
        album_artist: artist.clone(),
        title,
        artist,
        album,
        year: fields.year.filter(|y| *y > 0),
        genre,
        bpm: fields.bpm.filter(|b| *b > 0),
    }
}

/// Write `tags` into the file's primary tag, creating the tag if absent.
pub fn write_tags(path: &Path, tags: &ResolvedTags) -> Result<()> {
    if !path.exists() {
        return Err(MetadataError::FileNotFound(path.display().to_string()));
    }

    let mut tagged_file =
        lofty::read_from_path(path).map_err(|e| MetadataError::ReadFailed(e.to_string()))?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }

    let tag = tagged_file.primary_tag_mut().ok_or_else(|| {
        MetadataError::UnsupportedFormat(format!("{} cannot hold tags", path.display()))
    })?;

    if let Some(title) = &tags.title {
        tag.set_title(title.clone());
    }
    if let Some(artist) = &tags.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(album_artist) = &tags.album_artist {
        tag.insert_text(ItemKey::AlbumArtist, album_artist.clone());
    }
    if let Some(album) = &tags.album {
        tag.set_album(album.clone());
    }
    if let Some(year) = tags.year {
        tag.set_year(year);
    }
    tag.set_genre(tags.genre.clone());
    if let Some(bpm) = tags.bpm {
        tag.insert_text(ItemKey::Bpm, bpm.to_string());
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| MetadataError::WriteFailed(e.to_string()))
}

/// Lofty-backed [`Tagger`].
#[derive(Debug, Clone)]
pub struct LoftyTagger {
    default_genre: String,
}

impl LoftyTagger {
    pub fn new(default_genre: impl Into<String>) -> Self {
        Self {
            default_genre: default_genre.into(),
        }
    }
}

#[async_trait]
impl Tagger for LoftyTagger {
    async fn apply(&self, path: &Path, fields: &TagFields) -> BridgeResult<bool> {
        let path: PathBuf = path.to_path_buf();
        let tags = resolve_tags(&path, fields, &self.default_genre);

        let outcome = tokio::task::spawn_blocking(move || {
            let result = write_tags(&path, &tags);
            (path, tags, result)
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Tagging task failed: {}", e)))?;

        match outcome {
            (path, tags, Ok(())) => {
                debug!(
                    file = %path.display(),
                    title = ?tags.title,
                    artist = ?tags.artist,
                    album = ?tags.album,
                    genre = %tags.genre,
                    "Tags written"
                );
                Ok(true)
            }
            (path, _, Err(e)) => {
                warn!(file = %path.display(), error = %e, "Could not tag file");
                Ok(false)
            }
        }
    }
}
