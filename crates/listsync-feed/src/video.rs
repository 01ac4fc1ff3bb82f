//! Video catalog: maps listing reference numbers to YouTube URLs.

use std::collections::HashMap;
use std::path::Path;

use url::Url;

use crate::error::{FeedError, FeedResult};

/// Listing videos keyed by source id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoCatalog {
    entries: HashMap<String, String>,
}

impl VideoCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of `{ "<reference>": "<youtube url>" }`.
    pub fn from_json(json: &str) -> FeedResult<Self> {
        let entries: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| FeedError::catalog(format!("invalid video catalog: {e}")))?;
        Ok(Self { entries })
    }

    /// Load the catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> FeedResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            FeedError::catalog(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn insert(&mut self, source_id: impl Into<String>, url: impl Into<String>) {
        self.entries.insert(source_id.into(), url.into());
    }

    #[must_use]
    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    /// YouTube id for a listing.
    ///
    /// `None` when the listing has no catalog entry; an empty string when it
    /// has one whose URL is not a recognised YouTube link.
    #[must_use]
    pub fn video_id(&self, source_id: &str) -> Option<String> {
        self.entries
            .get(source_id)
            .map(|url| extract_youtube_id(url).unwrap_or_default())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract the video id from the common YouTube URL shapes.
#[must_use]
pub fn extract_youtube_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?;
    let mut segments = url.path_segments()?;

    let id = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "www.youtube.com" | "youtube.com" | "m.youtube.com" => match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("embed" | "v") => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    };

    id.filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extract_youtube_id_shapes() {
        for url in [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
        ] {
            assert_eq!(
                extract_youtube_id(url).as_deref(),
                Some("dQw4w9WgXcQ"),
                "{url}"
            );
        }
    }

    #[test]
    fn test_extract_youtube_id_unrecognised() {
        assert_eq!(extract_youtube_id("https://vimeo.com/123"), None);
        assert_eq!(extract_youtube_id("https://www.youtube.com/channel/x"), None);
        assert_eq!(extract_youtube_id("not a url"), None);
        assert_eq!(extract_youtube_id("https://youtu.be/"), None);
    }

    #[test]
    fn test_catalog_video_id() {
        let catalog = VideoCatalog::from_json(
            r#"{"REF-1": "https://youtu.be/abc123", "REF-2": "https://vimeo.com/1"}"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.video_id("REF-1").as_deref(), Some("abc123"));
        assert_eq!(catalog.video_id("REF-2").as_deref(), Some(""));
        assert_eq!(catalog.video_id("REF-3"), None);
    }

    #[test]
    fn test_catalog_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"REF-9": "https://www.youtube.com/watch?v=zzz"}}"#).unwrap();

        let catalog = VideoCatalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.video_id("REF-9").as_deref(), Some("zzz"));
    }

    #[test]
    fn test_catalog_errors() {
        let err = VideoCatalog::from_json("[1, 2]").unwrap_err();
        assert_eq!(err.error_code(), "FEED_CATALOG");

        let err = VideoCatalog::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, FeedError::Catalog { .. }));
    }
}
