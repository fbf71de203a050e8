//! # Metadata Module
//!
//! Text rules and tag writing for downloaded media.
//!
//! ## Overview
//!
//! - [`naming`]: filename sanitisation, title/artist cleanup, "Artist - Title"
//!   parsing and album validity
//! - [`tagger`]: [`LoftyTagger`], the `lofty`-backed implementation of the
//!   `Tagger` bridge trait

pub mod error;
pub mod naming;
pub mod tagger;

pub use error::{MetadataError, Result};
pub use naming::{clean_artist, clean_title, is_valid_album, parse_artist_title, sanitize_filename};
pub use tagger::LoftyTagger;
