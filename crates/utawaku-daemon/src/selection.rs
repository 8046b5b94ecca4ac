//! Selection controller — what the user picked, and what that makes the
//! player do.
//!
//! Tracks two coupled selections: the chosen video (a catalog index, as the
//! video selector submits) and the chosen chapter.  Random pick deliberately
//! lives outside the controller and leaves both untouched.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};
use utawaku_proto::catalog::{Catalog, TimestampEntry, Video};
use utawaku_proto::label::chapter_options;
use utawaku_proto::protocol::ControlId;

use crate::display::SongDisplay;
use crate::engine::PlaybackEngine;

pub const SEEK_STEP_SECS: f64 = 10.0;
pub const VOLUME_STEP: u8 = 10;
pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no video chosen")]
    NoVideoChosen,
    #[error("no chapter starts at {0}s")]
    ChapterNotFound(f64),
    #[error("catalog is empty")]
    EmptyCatalog,
    #[error("random pick has no usable video id or chapter")]
    InvalidPick,
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

#[derive(Debug, Default)]
pub struct SelectionController {
    chosen_video: Option<usize>,
    chosen_chapter: Option<TimestampEntry>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chosen_video(&self) -> Option<usize> {
        self.chosen_video
    }

    pub fn chosen_chapter(&self) -> Option<&TimestampEntry> {
        self.chosen_chapter.as_ref()
    }

    /// Video selector changed.  An out-of-range index counts as "none".
    /// Either way the chapter selection and the song line are reset; the
    /// player is not touched.
    pub fn choose_video(&mut self, catalog: &Catalog, index: Option<usize>, display: &mut SongDisplay) {
        self.chosen_chapter = None;

        match index.and_then(|i| catalog.get(i).map(|v| (i, v))) {
            Some((i, video)) => {
                info!("[select] video #{} {:?}", i, video.video_name);
                self.chosen_video = Some(i);
                display.set_chapters(Some(i), chapter_options(video));
            }
            None => {
                debug!("[select] video cleared (index {:?})", index);
                self.chosen_video = None;
                display.set_chapters(None, Vec::new());
            }
        }
        display.show(None);
    }

    /// Chapter selector changed.  `start` must match a chapter of the chosen
    /// video exactly; otherwise nothing happens.
    pub async fn choose_chapter<E>(
        &mut self,
        catalog: &Catalog,
        start: f64,
        engine: &E,
        display: &mut SongDisplay,
    ) -> Result<TimestampEntry, SelectionError>
    where
        E: PlaybackEngine + ?Sized,
    {
        let video = self
            .chosen_video
            .and_then(|i| catalog.get(i))
            .ok_or(SelectionError::NoVideoChosen)?;
        let entry = video
            .timestamps
            .iter()
            .find(|e| e.start == start)
            .cloned()
            .ok_or(SelectionError::ChapterNotFound(start))?;

        info!(
            "[select] chapter {:?} @ {}s of {}",
            entry.title, entry.start, video.video_id
        );
        engine.load_video_by_id(&video.video_id, entry.start).await?;
        display.show(Some(&entry));
        self.chosen_chapter = Some(entry.clone());
        Ok(entry)
    }
}

/// Draw a video uniformly, then one of its chapters uniformly.
pub fn pick_random<'a, R>(catalog: &'a Catalog, rng: &mut R) -> Result<(&'a Video, &'a TimestampEntry), SelectionError>
where
    R: Rng + ?Sized,
{
    let video = catalog
        .videos()
        .choose(rng)
        .ok_or(SelectionError::EmptyCatalog)?;
    let entry = video
        .timestamps
        .choose(rng)
        .ok_or(SelectionError::InvalidPick)?;
    if video.video_id.trim().is_empty() || !entry.start.is_finite() {
        return Err(SelectionError::InvalidPick);
    }
    Ok((video, entry))
}

/// Stop whatever plays, load a random chapter and show it.  Does not touch
/// the controller's chosen video / chapter.
pub async fn random_pick<E, R>(
    catalog: &Catalog,
    rng: &mut R,
    engine: &E,
    display: &mut SongDisplay,
) -> Result<TimestampEntry, SelectionError>
where
    E: PlaybackEngine + ?Sized,
    R: Rng + ?Sized,
{
    let (video, entry) = pick_random(catalog, rng)?;
    info!(
        "[select] random: {:?} @ {}s of {}",
        entry.title, entry.start, video.video_id
    );
    engine.stop_video().await?;
    engine.load_video_by_id(&video.video_id, entry.start).await?;
    display.show(Some(entry));
    Ok(entry.clone())
}

/// Transport buttons.  Each is exactly one player command (stop is
/// pause + rewind).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Play,
    Pause,
    Stop,
    SeekBack,
    SeekForward,
    VolumeUp,
    VolumeDown,
    ToggleMute,
}

impl Transport {
    /// `None` for controls that are not transport (random).
    pub fn from_control(id: ControlId) -> Option<Self> {
        Some(match id {
            ControlId::Play => Self::Play,
            ControlId::Pause => Self::Pause,
            ControlId::Stop => Self::Stop,
            ControlId::Prev => Self::SeekBack,
            ControlId::Next => Self::SeekForward,
            ControlId::VolUp => Self::VolumeUp,
            ControlId::VolDown => Self::VolumeDown,
            ControlId::Mute => Self::ToggleMute,
            ControlId::Random => return None,
        })
    }

    pub async fn apply<E>(self, engine: &E) -> anyhow::Result<()>
    where
        E: PlaybackEngine + ?Sized,
    {
        match self {
            Self::Play => engine.play_video().await,
            Self::Pause => engine.pause_video().await,
            Self::Stop => {
                engine.pause_video().await?;
                engine.seek_to(0.0).await
            }
            Self::SeekBack => {
                let t = engine.current_time().await?;
                engine.seek_to((t - SEEK_STEP_SECS).max(0.0)).await
            }
            Self::SeekForward => {
                let t = engine.current_time().await?;
                engine.seek_to(t + SEEK_STEP_SECS).await
            }
            Self::VolumeUp => {
                let v = engine.volume().await?;
                engine
                    .set_volume(v.saturating_add(VOLUME_STEP).min(MAX_VOLUME))
                    .await
            }
            Self::VolumeDown => {
                let v = engine.volume().await?;
                engine.set_volume(v.saturating_sub(VOLUME_STEP)).await
            }
            Self::ToggleMute => {
                if engine.is_muted().await? {
                    engine.unmute().await
                } else {
                    engine.mute().await
                }
            }
        }
    }
}
