//! Entry Source Abstraction
//!
//! A remote, curated list of entries that the engine mirrors locally. The
//! source yields entries in list order and supports best-effort removal of a
//! single entry once it has been handled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One item from the remote list.
///
/// `id` is the only field used for dedup membership; everything else is
/// descriptive and may be absent depending on what the remote exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identifier, unique within the source
    pub id: String,
    /// Provider URI used for removal (e.g. `spotify:track:...`)
    pub uri: String,
    /// Human-readable label, e.g. "Artist A, Artist B - Title"
    pub display_name: String,
    /// Query handed to the acquisition provider
    pub search_key: String,
    /// Sanitized filename stem
    pub output_name: String,
    /// Index in the list, used to remove the exact occurrence
    pub source_position: Option<u32>,
    pub artists: Vec<String>,
    pub title: Option<String>,
    /// Album or other grouping name
    pub collection: Option<String>,
    pub duration_ms: Option<u64>,
    pub explicit: bool,
}

impl Entry {
    /// Minimal entry with the display/search/output fields derived from
    /// `search_key`. Callers fill the descriptive fields afterwards.
    pub fn new(id: impl Into<String>, search_key: impl Into<String>) -> Self {
        let id = id.into();
        let search_key = search_key.into();
        Self {
            uri: id.clone(),
            display_name: search_key.clone(),
            output_name: search_key.clone(),
            id,
            search_key,
            source_position: None,
            artists: Vec::new(),
            title: None,
            collection: None,
            duration_ms: None,
            explicit: false,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.source_position = Some(position);
        self
    }

    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = output_name.into();
        self
    }

    pub fn with_artists(mut self, artists: Vec<String>) -> Self {
        self.artists = artists;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Artists joined the way they are shown to users.
    pub fn artist_display(&self) -> Option<String> {
        if self.artists.is_empty() {
            None
        } else {
            Some(self.artists.join(", "))
        }
    }
}

/// Descriptive information about the list itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub public: Option<bool>,
    pub collaborative: bool,
    pub total_entries: u32,
    pub owner: Option<String>,
}

/// Remote list the engine polls.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::source::EntrySource;
///
/// async fn first_key(source: &dyn EntrySource) -> Result<Option<String>> {
///     let entries = source.list_entries().await?;
///     Ok(entries.first().map(|e| e.search_key.clone()))
/// }
/// ```
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// Current entries in list order.
    ///
    /// # Errors
    ///
    /// Returns an error on authentication or transport failure. The engine
    /// treats this as a pass-level failure and retries on the next pass.
    async fn list_entries(&self) -> Result<Vec<Entry>>;

    /// Remove one entry from the list.
    ///
    /// `position_hint` pins the exact occurrence when the same item appears
    /// more than once. Returns `Ok(false)` when the remote declined the removal.
    async fn remove_entry(&self, uri: &str, position_hint: Option<u32>) -> Result<bool>;

    /// Describe the list (name, owner, size).
    async fn describe(&self) -> Result<SourceInfo>;
}
