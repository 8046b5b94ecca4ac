use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::label::ChapterOption;

/// Stable identifiers of the page's transport buttons.  Each maps to exactly
/// one session action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlId {
    Play,
    Pause,
    Stop,
    Prev,
    Next,
    VolUp,
    VolDown,
    Mute,
    Random,
}

impl ControlId {
    pub const ALL: [ControlId; 9] = [
        Self::Play,
        Self::Pause,
        Self::Stop,
        Self::Prev,
        Self::Next,
        Self::VolUp,
        Self::VolDown,
        Self::Mute,
        Self::Random,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Prev => "prev",
            Self::Next => "next",
            Self::VolUp => "volup",
            Self::VolDown => "voldown",
            Self::Mute => "mute",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown control id {0:?}")]
pub struct UnknownControl(pub String);

impl FromStr for ControlId {
    type Err = UnknownControl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownControl(s.to_string()))
    }
}

/// Messages sent from the page to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Video selector changed.  `None` (or an index past the end) clears it.
    ChooseVideo { index: Option<usize> },
    /// Chapter selector changed.
    ChooseChapter { start: f64 },
    Control { id: ControlId },
}

/// A user-visible warning ("alert") raised by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
    pub at: chrono::DateTime<chrono::Local>,
}

/// Everything the page needs to render the song line and chapter selector.
/// `rev` increases on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub rev: u64,
    pub current_song: String,
    pub chosen_video: Option<usize>,
    /// Empty when no video is chosen; the page shows its placeholder instead.
    pub chapters: Vec<ChapterOption>,
    /// Placeholder row for the chapter selector.
    pub chapter_placeholder: String,
    pub alert: Option<Alert>,
    /// Recent WARN/ERROR log lines.
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Row of `GET /api/videos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub index: usize,
    pub video_id: String,
    pub video_name: String,
}
