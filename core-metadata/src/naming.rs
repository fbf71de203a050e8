//! Filename and tag text rules.
//!
//! Everything here is pure string work shared by the Spotify source (output
//! names), the tagger (filename fallbacks) and the engine's logging.

use regex::Regex;
use std::sync::LazyLock;

/// Longest filename stem produced by [`sanitize_filename`], in characters.
pub const MAX_FILENAME_CHARS: usize = 200;

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Bracketed or parenthesised annotations added by video platforms.
static BOILERPLATE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[\[(]\s*(?:official\s*(?:music\s*)?video|official\s*audio|lyric\s*video|lyrics?|music\s*video|visuali[sz]er|hd|4k)\s*[\])]",
    )
    .expect("boilerplate regex should compile")
});

static EXPLICIT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\[(]\s*explicit\s*[\])]").expect("explicit regex should compile")
});

static ARTIST_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\s*-\s*topic|\s*vevo)\s*$").expect("artist suffix regex should compile")
});

/// "single" or "ep" as a standalone token, e.g. "Song - Single" or "Song (EP)".
static RELEASE_KIND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s\-\[(])(?:single|ep)(?:$|[\s\-\])])")
        .expect("release kind regex should compile")
});

static COLLAPSE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

/// Collapse repeated whitespace sequences into single spaces while trimming ends.
pub fn collapse_whitespace(value: &str) -> String {
    COLLAPSE_WHITESPACE
        .replace_all(value.trim(), " ")
        .to_string()
}

/// Turn an arbitrary label into a safe filename stem.
///
/// Drops characters that are invalid on common filesystems, strips platform
/// boilerplate such as "(Official Music Video)", collapses whitespace and
/// truncates to [`MAX_FILENAME_CHARS`].
///
/// ```
/// use core_metadata::naming::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Artist - Song (Official Music Video)"), "Artist - Song");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let without_invalid: String = name
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect();

    let without_boilerplate = BOILERPLATE_TAG.replace_all(&without_invalid, "");
    let collapsed = collapse_whitespace(&without_boilerplate);

    let truncated: String = collapsed.chars().take(MAX_FILENAME_CHARS).collect();
    truncated.trim().to_string()
}

/// Strip boilerplate and explicit-content markers from a track title.
pub fn clean_title(title: &str) -> String {
    let stripped = BOILERPLATE_TAG.replace_all(title, "");
    let stripped = EXPLICIT_TAG.replace_all(&stripped, "");
    collapse_whitespace(&stripped)
}

/// Strip channel suffixes ("- Topic", "VEVO") from an artist name.
pub fn clean_artist(artist: &str) -> String {
    let collapsed = collapse_whitespace(artist);
    ARTIST_SUFFIX.replace(&collapsed, "").trim().to_string()
}

/// Split an "Artist - Title" stem.
///
/// Without a separator the whole stem is treated as the title.
pub fn parse_artist_title(stem: &str) -> (Option<String>, Option<String>) {
    let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };

    match stem.split_once(" - ") {
        Some((artist, title)) => (
            non_empty(clean_artist(artist)),
            non_empty(clean_title(title)),
        ),
        None => (None, non_empty(clean_title(stem))),
    }
}

/// Whether `album` is a real album name worth writing to tags.
///
/// Singles and EPs are usually published with the track title as the album
/// name, which clutters library views, so those are rejected along with
/// albums that merely repeat the title.
pub fn is_valid_album(album: &str, title: &str) -> bool {
    let album = collapse_whitespace(album);
    if album.is_empty() {
        return false;
    }

    if RELEASE_KIND.is_match(&album) {
        return false;
    }

    let title = collapse_whitespace(title);
    title.is_empty() || !album.eq_ignore_ascii_case(&title)
}
