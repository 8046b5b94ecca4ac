//! Video catalog: the list of streams and their song chapters.
//!
//! The catalog document is a JSON array:
//!
//! ```text
//! [
//!   { "videoName": "…", "videoId": "T7CYthEK67Y",
//!     "timestamps": [ { "start": "0", "title": "…", "artist": "…" }, … ] },
//!   …
//! ]
//! ```
//!
//! `start` is string-encoded seconds in the published document.  Plain JSON
//! numbers are accepted too.  Everything is converted to `f64` once at load
//! time so lookups and resolution never compare strings.
//!
//! Loading happens exactly once per session.  Any failure (I/O, HTTP, bad
//! JSON, bad `start`) degrades to an empty catalog; callers only ever branch on
//! emptiness.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::resolver;

// ── Public types ──────────────────────────────────────────────────────────────

/// One chapter marker inside a video.  Covers `[start, next.start)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimestampEntry {
    /// Offset into the video, seconds.
    pub start: f64,
    pub title: String,
    pub artist: Option<String>,
}

impl TimestampEntry {
    pub fn new(start: f64, title: impl Into<String>, artist: Option<&str>) -> Self {
        Self {
            start,
            title: title.into(),
            artist: artist.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Video {
    pub video_id: String,
    pub video_name: String,
    /// Sorted ascending by `start`.  Not re-sorted here.
    pub timestamps: Vec<TimestampEntry>,
}

/// Read-only list of videos for the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    videos: Vec<Video>,
}

impl Catalog {
    pub fn new(videos: Vec<Video>) -> Self {
        Self { videos }
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Video at a selector index.
    pub fn get(&self, index: usize) -> Option<&Video> {
        self.videos.get(index)
    }

    /// First video with this id.  Ids are assumed unique.
    pub fn find(&self, video_id: &str) -> Option<&Video> {
        self.videos.iter().find(|v| v.video_id == video_id)
    }

    /// Locate the video, then resolve the chapter playing at `position`.
    /// An unknown id yields `None` without touching the resolver.
    pub fn resolve_by_id(&self, video_id: &str, position: f64) -> Option<&TimestampEntry> {
        self.find(video_id)
            .and_then(|video| resolver::resolve(video, position))
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to fetch catalog: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog request returned HTTP {0}")]
    Status(u16),
    #[error("malformed catalog document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("video {video_id:?}: bad start {start:?} for {title:?}")]
    Schema {
        video_id: String,
        title: String,
        start: String,
    },
}

// ── Wire schema ───────────────────────────────────────────────────────────────

/// Mirrors the published JSON.  Kept apart from `Video` so the document can
/// keep its camelCase / string-seconds shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideo {
    video_name: String,
    video_id: String,
    #[serde(default)]
    timestamps: Vec<RawTimestamp>,
}

#[derive(Debug, Deserialize)]
struct RawTimestamp {
    start: RawStart,
    title: String,
    #[serde(default)]
    artist: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStart {
    Text(String),
    Number(f64),
}

impl RawStart {
    fn seconds(&self) -> Option<f64> {
        let secs = match self {
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Number(n) => *n,
        };
        (secs.is_finite() && secs >= 0.0).then_some(secs)
    }

    fn raw(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

// ── Parsing / loading ─────────────────────────────────────────────────────────

/// Parse a catalog document.  A single bad `start` rejects the whole document.
pub fn parse_catalog(content: &str) -> Result<Catalog, CatalogError> {
    let raw: Vec<RawVideo> = serde_json::from_str(content)?;
    let mut videos = Vec::with_capacity(raw.len());

    for rv in raw {
        let mut timestamps = Vec::with_capacity(rv.timestamps.len());
        for ts in rv.timestamps {
            let start = ts.start.seconds().ok_or_else(|| CatalogError::Schema {
                video_id: rv.video_id.clone(),
                title: ts.title.clone(),
                start: ts.start.raw(),
            })?;
            timestamps.push(TimestampEntry {
                start,
                title: ts.title,
                artist: ts.artist.filter(|a| !a.trim().is_empty()),
            });
        }
        videos.push(Video {
            video_id: rv.video_id,
            video_name: rv.video_name,
            timestamps,
        });
    }

    Ok(Catalog::new(videos))
}

/// Fetch and parse the catalog from an `http(s)://` URL or a file path.
pub async fn fetch_catalog(source: &str) -> Result<Catalog, CatalogError> {
    let content = if source.starts_with("http://") || source.starts_with("https://") {
        let resp = reqwest::get(source).await?;
        if !resp.status().is_success() {
            return Err(CatalogError::Status(resp.status().as_u16()));
        }
        resp.text().await?
    } else {
        tokio::fs::read_to_string(Path::new(source)).await?
    };
    parse_catalog(&content)
}

/// Load the session catalog.  Never fails: errors are logged and an empty
/// catalog is returned.  No retries.
pub async fn load_catalog(source: &str) -> Catalog {
    match fetch_catalog(source).await {
        Ok(catalog) => {
            let chapters: usize = catalog.videos().iter().map(|v| v.timestamps.len()).sum();
            info!(
                "[catalog] Loaded {} videos / {} chapters from {}",
                catalog.len(),
                chapters,
                source
            );
            catalog
        }
        Err(e) => {
            warn!("[catalog] Failed to load {}: {}", source, e);
            Catalog::default()
        }
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"[
        {
            "videoName": "Karaoke night #1",
            "videoId": "A",
            "timestamps": [
                { "start": "0", "title": "Song1" },
                { "start": "120", "title": "Song2", "artist": "Someone" }
            ]
        },
        {
            "videoName": "Karaoke night #2",
            "videoId": "B",
            "timestamps": [ { "start": 30.5, "title": "Song3", "artist": "" } ]
        }
    ]"#;

    #[test]
    fn test_parse_catalog_fields() {
        let catalog = parse_catalog(DOC).unwrap();
        assert_eq!(catalog.len(), 2);

        let a = catalog.find("A").unwrap();
        assert_eq!(a.video_name, "Karaoke night #1");
        assert_eq!(a.timestamps[1], TimestampEntry::new(120.0, "Song2", Some("Someone")));
        assert!(a.timestamps[0].artist.is_none());

        let b = catalog.get(1).unwrap();
        assert_eq!(b.timestamps[0].start, 30.5);
        // empty artist collapses to None
        assert!(b.timestamps[0].artist.is_none());
    }

    #[test]
    fn test_parse_catalog_missing_timestamps() {
        let catalog = parse_catalog(r#"[{"videoName":"x","videoId":"X"}]"#).unwrap();
        assert!(catalog.find("X").unwrap().timestamps.is_empty());
    }

    #[test]
    fn test_parse_catalog_rejects_bad_start() {
        let doc = r#"[{"videoName":"x","videoId":"X","timestamps":[{"start":"1:30","title":"t"}]}]"#;
        match parse_catalog(doc) {
            Err(CatalogError::Schema { video_id, start, .. }) => {
                assert_eq!(video_id, "X");
                assert_eq!(start, "1:30");
            }
            other => panic!("expected schema error, got {:?}", other),
        }

        let negative = r#"[{"videoName":"x","videoId":"X","timestamps":[{"start":"-5","title":"t"}]}]"#;
        assert!(matches!(parse_catalog(negative), Err(CatalogError::Schema { .. })));
    }

    #[test]
    fn test_parse_catalog_malformed() {
        assert!(matches!(parse_catalog("{not json"), Err(CatalogError::Parse(_))));
        assert!(matches!(
            parse_catalog(r#"{"videos": []}"#),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_resolve_by_id_unknown_video() {
        let catalog = parse_catalog(DOC).unwrap();
        assert!(catalog.resolve_by_id("nope", 60.0).is_none());
        assert_eq!(catalog.resolve_by_id("A", 60.0).unwrap().title, "Song1");
    }
}
