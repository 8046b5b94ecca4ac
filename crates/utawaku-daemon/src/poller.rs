//! Sync poller — keeps the current-song line in step with the player.
//!
//! Seeks made directly in the player window are not reported as discrete
//! events, so the session samples (video id, position) once a second and
//! re-resolves.  The timer task only emits `SessionEvent::PollTick`; the tick
//! itself runs inside the session core so it never races a user command.
//!
//! At most one timer task exists per poller: `start()` is a no-op while one is
//! running, `stop()` aborts it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use utawaku_proto::catalog::Catalog;
use utawaku_proto::resolver;

use crate::core::SessionEvent;
use crate::display::SongDisplay;
use crate::engine::PlaybackEngine;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Player could not report position or video (not ready / idle).
    EngineUnavailable,
    /// Loaded video is not in the catalog; display left as is.
    UnknownVideo,
    Unchanged,
    Changed,
}

pub struct SyncPoller {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl SyncPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the timer task unless one is already running.
    /// Returns `true` if a new task was spawned.
    pub fn start(&mut self, event_tx: mpsc::Sender<SessionEvent>) -> bool {
        if self.is_running() {
            return false;
        }

        let interval = self.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately; the first sample is one
            // interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if event_tx.send(SessionEvent::PollTick).await.is_err() {
                    debug!("[poller] session channel closed, timer exiting");
                    break;
                }
            }
        }));
        info!("[poller] started ({:?} interval)", interval);
        true
    }

    /// Abort the timer task.  Returns `true` if one was running.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                info!("[poller] stopped");
                true
            }
            None => false,
        }
    }

    /// Sample the player once and update the display if the chapter changed.
    pub async fn tick<E>(&self, engine: &E, catalog: &Catalog, display: &mut SongDisplay) -> TickOutcome
    where
        E: PlaybackEngine + ?Sized,
    {
        let video_id = match engine.video_id().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!("[poller] no video loaded");
                return TickOutcome::EngineUnavailable;
            }
            Err(e) => {
                debug!("[poller] video id unavailable: {}", e);
                return TickOutcome::EngineUnavailable;
            }
        };
        let position = match engine.current_time().await {
            Ok(t) => t,
            Err(e) => {
                debug!("[poller] position unavailable: {}", e);
                return TickOutcome::EngineUnavailable;
            }
        };

        let Some(video) = catalog.find(&video_id) else {
            debug!("[poller] video {} not in catalog", video_id);
            return TickOutcome::UnknownVideo;
        };

        let entry = resolver::resolve(video, position);
        if display.show_if_changed(entry) {
            info!(
                "[poller] {} @ {:.1}s → {:?}",
                video_id,
                position,
                entry.map(|e| e.title.as_str())
            );
            TickOutcome::Changed
        } else {
            TickOutcome::Unchanged
        }
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::testing::RecordingSink;
    use crate::engine::testing::FakeEngine;
    use std::sync::Arc;
    use utawaku_proto::catalog::{TimestampEntry, Video};

    fn catalog() -> Catalog {
        Catalog::new(vec![Video {
            video_id: "A".into(),
            video_name: "A".into(),
            timestamps: vec![
                TimestampEntry::new(0.0, "Song1", None),
                TimestampEntry::new(120.0, "Song2", None),
            ],
        }])
    }

    #[tokio::test]
    async fn test_same_chapter_renders_once() {
        let catalog = catalog();
        let engine = FakeEngine::playing("A", 1.0);
        let sink = Arc::new(RecordingSink::default());
        let mut display = SongDisplay::new(sink.clone());
        let poller = SyncPoller::new(POLL_INTERVAL);

        assert_eq!(poller.tick(&engine, &catalog, &mut display).await, TickOutcome::Changed);
        for t in [2.0, 30.0, 119.9] {
            engine.set_position(t);
            assert_eq!(
                poller.tick(&engine, &catalog, &mut display).await,
                TickOutcome::Unchanged
            );
        }
        engine.set_position(120.0);
        assert_eq!(poller.tick(&engine, &catalog, &mut display).await, TickOutcome::Changed);

        assert_eq!(
            sink.songs(),
            vec![Some("Song1".to_string()), Some("Song2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unknown_video_keeps_display() {
        let catalog = catalog();
        let engine = FakeEngine::playing("A", 130.0);
        let sink = Arc::new(RecordingSink::default());
        let mut display = SongDisplay::new(sink.clone());
        let poller = SyncPoller::new(POLL_INTERVAL);

        poller.tick(&engine, &catalog, &mut display).await;
        engine.set_video("not-in-catalog", 5.0);
        assert_eq!(
            poller.tick(&engine, &catalog, &mut display).await,
            TickOutcome::UnknownVideo
        );
        assert_eq!(display.last().map(|e| e.title.as_str()), Some("Song2"));
        assert_eq!(sink.songs().len(), 1);
    }

    #[tokio::test]
    async fn test_not_ready_is_silent() {
        let catalog = catalog();
        let engine = FakeEngine::new();
        let sink = Arc::new(RecordingSink::default());
        let mut display = SongDisplay::new(sink.clone());
        let poller = SyncPoller::new(POLL_INTERVAL);

        assert_eq!(
            poller.tick(&engine, &catalog, &mut display).await,
            TickOutcome::EngineUnavailable
        );
        assert!(sink.rendered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut poller = SyncPoller::new(POLL_INTERVAL);

        assert!(poller.start(tx.clone()));
        assert!(!poller.start(tx.clone()));
        assert!(!poller.start(tx));
        assert!(poller.is_running());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let mut ticks = 0;
        while let Ok(evt) = rx.try_recv() {
            assert!(matches!(evt, SessionEvent::PollTick));
            ticks += 1;
        }
        // one timer, three elapsed intervals
        assert_eq!(ticks, 3);

        assert!(poller.stop());
        assert!(!poller.stop());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
