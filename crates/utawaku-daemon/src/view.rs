//! SessionView — read model served to the page.
//!
//! Written by the display sink (on behalf of the session core) and by the log
//! layer; read by the HTTP handlers.  `rev` is bumped on every write so the
//! page can skip redundant redraws.  Critical sections are tiny and never span
//! an `.await`, so a plain `std::sync::RwLock` is used.

use std::collections::VecDeque;
use std::sync::RwLock;

use utawaku_proto::config::DisplayConfig;
use utawaku_proto::label::ChapterOption;
use utawaku_proto::protocol::{Alert, SessionSnapshot};

/// WARN/ERROR lines kept for the page.
const MAX_LOG_LINES: usize = 50;

pub struct SessionView {
    state: RwLock<SessionSnapshot>,
    logs: RwLock<VecDeque<String>>,
}

impl SessionView {
    pub fn new(display: &DisplayConfig) -> Self {
        let state = SessionSnapshot {
            rev: 1,
            current_song: display.song_label_prefix.clone(),
            chosen_video: None,
            chapters: Vec::new(),
            chapter_placeholder: display.chapter_placeholder.clone(),
            alert: None,
            logs: Vec::new(),
        };
        Self {
            state: RwLock::new(state),
            logs: RwLock::new(VecDeque::with_capacity(MAX_LOG_LINES)),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snap = match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        snap.logs = match self.logs.read() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        };
        snap
    }

    pub fn set_current_song(&self, label: String) {
        self.update(|s| s.current_song = label);
    }

    pub fn set_chapters(&self, chosen_video: Option<usize>, chapters: Vec<ChapterOption>) {
        self.update(|s| {
            s.chosen_video = chosen_video;
            s.chapters = chapters;
        });
    }

    pub fn set_alert(&self, message: String) {
        self.update(|s| {
            s.alert = Some(Alert {
                message,
                at: chrono::Local::now(),
            })
        });
    }

    pub fn push_log(&self, line: String) {
        let mut logs = match self.logs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if logs.len() == MAX_LOG_LINES {
            logs.pop_front();
        }
        logs.push_back(line);
    }

    fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state);
        state.rev += 1;
    }
}
