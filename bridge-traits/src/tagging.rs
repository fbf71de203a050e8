//! Tagger Abstraction
//!
//! Writes descriptive metadata into a saved media file. Tagging is
//! best-effort: a file that could not be tagged is still a valid result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Fields the tagger may write. Absent fields are left to the tagger's
/// own fallbacks (filename parsing, default genre).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFields {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub bpm: Option<u32>,
}

impl TagFields {
    pub fn is_empty(&self) -> bool {
        self == &TagFields::default()
    }
}

#[async_trait]
pub trait Tagger: Send + Sync {
    /// Write `fields` into the file at `path`.
    ///
    /// Returns `Ok(false)` when the file could not be tagged (unsupported
    /// format, unreadable file). Callers log and move on either way.
    async fn apply(&self, path: &Path, fields: &TagFields) -> Result<bool>;
}
