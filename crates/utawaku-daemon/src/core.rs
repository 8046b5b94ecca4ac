/// SessionCore — single-owner event loop for the playback session.
///
/// Owns the catalog handle, the engine, the poller, the selection controller
/// and the display tracker exclusively.  Everything that wants something to
/// happen (HTTP handlers, the poll timer, the engine's event forwarder) sends
/// a `SessionEvent`; events are handled strictly one after another, so a poll
/// tick can never interleave with a user command.
///
/// Failures stop at this boundary: handler errors are logged, user-facing
/// ones become alerts, and the loop keeps running.
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use utawaku_proto::catalog::Catalog;
use utawaku_proto::config::DisplayConfig;
use utawaku_proto::protocol::{Command, ControlId};

use crate::display::{DisplaySink, SongDisplay};
use crate::engine::{EngineEvent, PlaybackEngine};
use crate::poller::{SyncPoller, TickOutcome, POLL_INTERVAL};
use crate::selection::{self, SelectionController, SelectionError, Transport};

// ── SessionEvent ──────────────────────────────────────────────────────────────

/// All inputs into the SessionCore loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// A command from the page (via HTTP).
    Command(Command),
    /// Poll timer fired.
    PollTick,
    /// Notification from the playback engine.
    Engine(EngineEvent),
    /// Shutdown requested.
    Shutdown,
}

// ── SessionCore ───────────────────────────────────────────────────────────────

pub struct SessionCore<E: PlaybackEngine> {
    catalog: Arc<Catalog>,
    engine: E,
    poller: SyncPoller,
    selection: SelectionController,
    display: SongDisplay,
    messages: DisplayConfig,
    rng: StdRng,
    /// Handed to the poller so its timer can feed ticks back in.
    event_tx: mpsc::Sender<SessionEvent>,
}

impl<E: PlaybackEngine> SessionCore<E> {
    pub fn new(
        catalog: Arc<Catalog>,
        engine: E,
        sink: Arc<dyn DisplaySink>,
        messages: DisplayConfig,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            catalog,
            engine,
            poller: SyncPoller::new(POLL_INTERVAL),
            selection: SelectionController::new(),
            display: SongDisplay::new(sink),
            messages,
            rng: StdRng::from_entropy(),
            event_tx,
        }
    }

    #[cfg(test)]
    fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Run until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<SessionEvent>) -> anyhow::Result<()> {
        info!(
            "SessionCore: starting event loop ({} videos)",
            self.catalog.len()
        );

        while let Some(evt) = event_rx.recv().await {
            if !self.handle_event(evt).await {
                info!("SessionCore: shutdown requested");
                break;
            }
        }

        self.poller.stop();
        info!("SessionCore: event loop finished");
        Ok(())
    }

    /// Handle one event.  Returns `false` on shutdown.
    pub async fn handle_event(&mut self, evt: SessionEvent) -> bool {
        match evt {
            SessionEvent::Shutdown => return false,
            SessionEvent::Command(cmd) => {
                info!("SessionCore: command {:?}", cmd);
                if let Err(e) = self.handle_command(cmd).await {
                    error!("SessionCore: command error: {}", e);
                }
            }
            SessionEvent::PollTick => {
                let outcome = self
                    .poller
                    .tick(&self.engine, &self.catalog, &mut self.display)
                    .await;
                if outcome == TickOutcome::Changed {
                    debug!("SessionCore: current song updated by poll");
                }
            }
            SessionEvent::Engine(evt) => self.handle_engine_event(evt),
        }
        true
    }

    fn handle_engine_event(&mut self, evt: EngineEvent) {
        match evt {
            EngineEvent::Ready => {
                info!("SessionCore: player ready");
                self.poller.start(self.event_tx.clone());
            }
            EngineEvent::StateChanged => {
                if self.poller.start(self.event_tx.clone()) {
                    debug!("SessionCore: polling resumed on player state change");
                }
            }
            EngineEvent::Error(e) => {
                warn!("SessionCore: player error: {}", e);
            }
        }
    }

    // ── command handlers ──────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::ChooseVideo { index } => {
                self.selection
                    .choose_video(&self.catalog, index, &mut self.display);
            }
            Command::ChooseChapter { start } => {
                let result = self
                    .selection
                    .choose_chapter(&self.catalog, start, &self.engine, &mut self.display)
                    .await;
                match result {
                    Ok(_) => {}
                    Err(SelectionError::NoVideoChosen | SelectionError::ChapterNotFound(_)) => {
                        debug!("SessionCore: chapter {}s ignored", start);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Command::Control { id: ControlId::Random } => self.random().await?,
            Command::Control { id } => {
                if let Some(transport) = Transport::from_control(id) {
                    self.transport(transport).await?;
                }
            }
        }
        Ok(())
    }

    async fn random(&mut self) -> anyhow::Result<()> {
        let result = selection::random_pick(
            &self.catalog,
            &mut self.rng,
            &self.engine,
            &mut self.display,
        )
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e @ (SelectionError::EmptyCatalog | SelectionError::InvalidPick)) => {
                debug!("SessionCore: random pick rejected: {}", e);
                self.display.alert(&self.messages.invalid_pick_message);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn transport(&mut self, transport: Transport) -> anyhow::Result<()> {
        let result = transport.apply(&self.engine).await;
        if let Err(ref e) = result {
            warn!("SessionCore: {:?} failed: {}", transport, e);
        }

        // Side effects follow the button, not the player's answer.
        match transport {
            Transport::Play => {
                self.poller.start(self.event_tx.clone());
            }
            Transport::Stop => {
                self.poller.stop();
                self.display.show(None);
            }
            _ => {}
        }
        Ok(())
    }

    #[cfg(test)]
    fn poller_running(&self) -> bool {
        self.poller.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::testing::{RecordingSink, Rendered};
    use crate::display::ViewDisplay;
    use crate::engine::testing::{Call, FakeEngine};
    use crate::view::SessionView;
    use utawaku_proto::catalog::parse_catalog;

    const DOC: &str = r#"[
        {"videoName":"Night A","videoId":"A","timestamps":[
            {"start":"0","title":"Song1"},
            {"start":"120","title":"Song2","artist":"Artist2"}
        ]}
    ]"#;

    fn core_with(
        catalog: Catalog,
        engine: FakeEngine,
    ) -> (
        SessionCore<FakeEngine>,
        Arc<RecordingSink>,
        mpsc::Receiver<SessionEvent>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let sink = Arc::new(RecordingSink::default());
        let core = SessionCore::new(
            Arc::new(catalog),
            engine,
            sink.clone(),
            DisplayConfig::default(),
            tx,
        )
        .with_rng(StdRng::seed_from_u64(3));
        (core, sink, rx)
    }

    fn cmd(c: Command) -> SessionEvent {
        SessionEvent::Command(c)
    }

    fn control(id: ControlId) -> SessionEvent {
        SessionEvent::Command(Command::Control { id })
    }

    #[tokio::test]
    async fn test_choose_video_then_chapter_then_poll() {
        let (mut core, sink, _rx) = core_with(parse_catalog(DOC).unwrap(), FakeEngine::new());

        core.handle_event(cmd(Command::ChooseVideo { index: Some(0) })).await;
        core.handle_event(cmd(Command::ChooseChapter { start: 0.0 })).await;
        assert_eq!(
            core.engine.calls(),
            vec![Call::Load { video_id: "A".into(), start: 0.0 }]
        );

        // Poll inside the same chapter: no extra render.
        core.engine.set_position(30.0);
        core.handle_event(SessionEvent::PollTick).await;
        // Player crossed into the next chapter.
        core.engine.set_position(125.0);
        core.handle_event(SessionEvent::PollTick).await;
        core.handle_event(SessionEvent::PollTick).await;

        assert_eq!(
            sink.songs(),
            vec![
                None,
                Some("Song1".to_string()),
                Some("Song2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_choose_video_none_resets_label_and_chapters() {
        let view = Arc::new(SessionView::new(&DisplayConfig::default()));
        let (tx, _rx) = mpsc::channel(8);
        let sink = Arc::new(ViewDisplay::new(view.clone(), "現在の楽曲："));
        let mut core = SessionCore::new(
            Arc::new(parse_catalog(DOC).unwrap()),
            FakeEngine::new(),
            sink,
            DisplayConfig::default(),
            tx,
        );

        core.handle_event(cmd(Command::ChooseVideo { index: Some(0) })).await;
        core.handle_event(cmd(Command::ChooseChapter { start: 120.0 })).await;
        let snap = view.snapshot();
        assert_eq!(snap.current_song, "現在の楽曲：Song2 (Artist2)");
        assert_eq!(snap.chapters.len(), 2);
        assert_eq!(snap.chosen_video, Some(0));

        core.handle_event(cmd(Command::ChooseVideo { index: None })).await;
        let snap = view.snapshot();
        assert_eq!(snap.current_song, "現在の楽曲：");
        assert!(snap.chapters.is_empty());
        assert_eq!(snap.chosen_video, None);
    }

    #[tokio::test]
    async fn test_unmatched_chapter_is_ignored() {
        let (mut core, sink, _rx) = core_with(parse_catalog(DOC).unwrap(), FakeEngine::new());
        core.handle_event(cmd(Command::ChooseVideo { index: Some(0) })).await;
        let before = sink.rendered();

        core.handle_event(cmd(Command::ChooseChapter { start: 60.0 })).await;
        assert!(core.engine.calls().is_empty());
        assert_eq!(sink.rendered(), before);
    }

    #[tokio::test]
    async fn test_random_on_empty_catalog_takes_invalid_path() {
        let (mut core, sink, _rx) = core_with(Catalog::default(), FakeEngine::new());
        assert!(core.handle_event(control(ControlId::Random)).await);

        assert!(core.engine.calls().is_empty());
        assert_eq!(
            sink.alerts(),
            vec![DisplayConfig::default().invalid_pick_message]
        );
        assert!(sink.songs().is_empty());
    }

    #[tokio::test]
    async fn test_random_keeps_selection_untouched() {
        let (mut core, sink, _rx) = core_with(parse_catalog(DOC).unwrap(), FakeEngine::new());
        core.handle_event(control(ControlId::Random)).await;

        assert_eq!(core.selection.chosen_video(), None);
        assert!(core.selection.chosen_chapter().is_none());
        let calls = core.engine.calls();
        assert_eq!(calls[0], Call::Stop);
        assert!(matches!(&calls[1], Call::Load { video_id, .. } if video_id == "A"));
        assert_eq!(sink.songs().len(), 1);
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_starts_single_poller_and_stop_clears() {
        let (mut core, sink, mut rx) =
            core_with(parse_catalog(DOC).unwrap(), FakeEngine::playing("A", 130.0));

        core.handle_event(control(ControlId::Play)).await;
        core.handle_event(control(ControlId::Play)).await;
        core.handle_event(SessionEvent::Engine(EngineEvent::StateChanged)).await;
        assert!(core.poller_running());

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        let mut ticks = 0;
        while let Ok(evt) = rx.try_recv() {
            assert!(matches!(evt, SessionEvent::PollTick));
            core.handle_event(evt).await;
            ticks += 1;
        }
        assert_eq!(ticks, 2);
        assert_eq!(sink.songs(), vec![Some("Song2".to_string())]);

        core.handle_event(control(ControlId::Stop)).await;
        assert!(!core.poller_running());
        assert_eq!(sink.rendered().last(), Some(&Rendered::Song(None)));
        assert_eq!(
            core.engine.calls(),
            vec![Call::Play, Call::Play, Call::Pause, Call::Seek(0.0)]
        );
    }

    #[tokio::test]
    async fn test_engine_error_is_not_fatal() {
        let (mut core, _sink, _rx) = core_with(parse_catalog(DOC).unwrap(), FakeEngine::new());
        assert!(
            core.handle_event(SessionEvent::Engine(EngineEvent::Error("150".into())))
                .await
        );
        // Transport against a player that cannot report position
        assert!(core.handle_event(control(ControlId::Next)).await);
        assert!(core.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_transport_still_applies_side_effects() {
        let (mut core, sink, _rx) =
            core_with(parse_catalog(DOC).unwrap(), FakeEngine::playing("A", 130.0));
        core.handle_event(control(ControlId::Play)).await;
        core.handle_event(SessionEvent::PollTick).await;
        assert!(core.poller_running());
        assert_eq!(sink.songs(), vec![Some("Song2".to_string())]);

        core.engine.set_failing(true);

        assert!(core.handle_event(control(ControlId::Stop)).await);
        assert!(!core.poller_running());
        assert_eq!(sink.rendered().last(), Some(&Rendered::Song(None)));

        assert!(core.handle_event(control(ControlId::Play)).await);
        assert!(core.poller_running());

        // Only the first play ever reached the player.
        assert_eq!(core.engine.calls(), vec![Call::Play]);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let (core, _sink, rx) = core_with(Catalog::default(), FakeEngine::new());
        let tx = core.event_tx.clone();
        tx.send(SessionEvent::Engine(EngineEvent::Ready)).await.unwrap();
        tx.send(SessionEvent::Shutdown).await.unwrap();
        core.run(rx).await.unwrap();
    }
}
