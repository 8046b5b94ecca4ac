//! Text shown for chapters: the chapter selector rows and the current-song line.

use serde::{Deserialize, Serialize};

use crate::catalog::{TimestampEntry, Video};

/// One row of the chapter selector.  `start` is the value the row submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterOption {
    pub start: f64,
    pub label: String,
}

/// "Title (Artist)" or just "Title".
pub fn chapter_label(entry: &TimestampEntry) -> String {
    match entry.artist.as_deref() {
        Some(artist) => format!("{} ({})", entry.title, artist),
        None => entry.title.clone(),
    }
}

/// Rows of the chapter selector for `video`, in catalog order.
pub fn chapter_options(video: &Video) -> Vec<ChapterOption> {
    video
        .timestamps
        .iter()
        .map(|e| ChapterOption {
            start: e.start,
            label: chapter_label(e),
        })
        .collect()
}

/// Current-song line: `prefix` followed by the chapter label, or the bare
/// prefix when nothing is playing.
pub fn song_label(prefix: &str, entry: Option<&TimestampEntry>) -> String {
    match entry {
        Some(e) => format!("{}{}", prefix, chapter_label(e)),
        None => prefix.to_string(),
    }
}
