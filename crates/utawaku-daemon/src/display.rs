//! Display sink: where the current-song line, the chapter list and alerts go.
//!
//! A [`DisplaySink`] is a pure projection.  The only state the session keeps
//! about what is on screen is the last shown chapter, held by [`SongDisplay`]
//! so the poller can skip redundant renders.

use std::sync::Arc;

use tracing::{debug, warn};
use utawaku_proto::catalog::TimestampEntry;
use utawaku_proto::label::{song_label, ChapterOption};

use crate::view::SessionView;

pub trait DisplaySink: Send + Sync {
    /// Render the current-song line.  `None` renders the bare label.
    fn show(&self, entry: Option<&TimestampEntry>);

    /// Replace the chapter selector rows.  Empty means "show the placeholder".
    fn set_chapters(&self, _chosen_video: Option<usize>, _chapters: Vec<ChapterOption>) {}

    /// User-visible warning.
    fn alert(&self, _message: &str) {}
}

/// Production sink: renders into the [`SessionView`] the page polls.
pub struct ViewDisplay {
    view: Arc<SessionView>,
    prefix: String,
}

impl ViewDisplay {
    pub fn new(view: Arc<SessionView>, prefix: impl Into<String>) -> Self {
        Self {
            view,
            prefix: prefix.into(),
        }
    }
}

impl DisplaySink for ViewDisplay {
    fn show(&self, entry: Option<&TimestampEntry>) {
        self.view.set_current_song(song_label(&self.prefix, entry));
    }

    fn set_chapters(&self, chosen_video: Option<usize>, chapters: Vec<ChapterOption>) {
        self.view.set_chapters(chosen_video, chapters);
    }

    fn alert(&self, message: &str) {
        warn!("[display] alert: {}", message);
        self.view.set_alert(message.to_string());
    }
}

/// A sink plus the last chapter it was told to show.
pub struct SongDisplay {
    sink: Arc<dyn DisplaySink>,
    last: Option<TimestampEntry>,
}

impl SongDisplay {
    pub fn new(sink: Arc<dyn DisplaySink>) -> Self {
        Self { sink, last: None }
    }

    pub fn last(&self) -> Option<&TimestampEntry> {
        self.last.as_ref()
    }

    /// Render unconditionally.
    pub fn show(&mut self, entry: Option<&TimestampEntry>) {
        debug!(
            "[display] show {:?}",
            entry.map(|e| e.title.as_str())
        );
        self.sink.show(entry);
        self.last = entry.cloned();
    }

    /// Render only when `entry` differs from the last shown chapter.
    /// Returns whether a render happened.
    pub fn show_if_changed(&mut self, entry: Option<&TimestampEntry>) -> bool {
        if self.last.as_ref() == entry {
            return false;
        }
        self.show(entry);
        true
    }

    pub fn set_chapters(&self, chosen_video: Option<usize>, chapters: Vec<ChapterOption>) {
        self.sink.set_chapters(chosen_video, chapters);
    }

    pub fn alert(&self, message: &str) {
        self.sink.alert(message);
    }
}
