//! Playback-engine capability.
//!
//! The session never owns playback state; it queries and commands whatever
//! implements [`PlaybackEngine`].  Production uses `MpvEngine` (see `mpv.rs`),
//! tests use `testing::FakeEngine`.

use async_trait::async_trait;

/// Unsolicited notifications from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The player is up and accepting commands.  Fires once.
    Ready,
    /// Play/pause/seek/end happened.  The specific state is not inspected;
    /// it only (re)starts polling.
    StateChanged,
    /// Player-side failure (e.g. the video could not be loaded).  Non-fatal.
    Error(String),
}

#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Load `video_id` and start playing at `start_secs`.
    async fn load_video_by_id(&self, video_id: &str, start_secs: f64) -> anyhow::Result<()>;
    async fn play_video(&self) -> anyhow::Result<()>;
    async fn pause_video(&self) -> anyhow::Result<()>;
    async fn stop_video(&self) -> anyhow::Result<()>;
    async fn seek_to(&self, secs: f64) -> anyhow::Result<()>;
    /// Playback position in seconds.  Errors while nothing is loaded.
    async fn current_time(&self) -> anyhow::Result<f64>;
    /// Id of the loaded video, `None` if the player is idle or playing
    /// something that is not a catalog URL.
    async fn video_id(&self) -> anyhow::Result<Option<String>>;
    /// 0..=100
    async fn set_volume(&self, volume: u8) -> anyhow::Result<()>;
    async fn volume(&self) -> anyhow::Result<u8>;
    async fn is_muted(&self) -> anyhow::Result<bool>;
    async fn mute(&self) -> anyhow::Result<()>;
    async fn unmute(&self) -> anyhow::Result<()>;
}
