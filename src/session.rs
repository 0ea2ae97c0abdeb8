use std::fmt;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, EngineEvents, EngineFactory, MediaEngine, SubtitleTrack};
use crate::events::AppEvent;
use crate::progress::ProgressStore;
use crate::types::{MediaLocator, NavTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKey {
    TogglePlay,
    SeekBackward,
    SeekForward,
    ToggleFullscreen,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Offsets at or below this are never persisted.
    pub resume_threshold_secs: f64,
    pub seek_step_secs: f64,
    pub preferred_subtitle: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            resume_threshold_secs: 10.0,
            seek_step_secs: 10.0,
            preferred_subtitle: String::from("id"),
        }
    }
}

/// What the router should do after a session handled an engine event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    Nothing,
    Advance(NavTarget),
    /// Playback ended with no next episode.
    Stopped,
    /// The engine closed on its own.
    Closed,
}

#[derive(Debug, Error)]
pub enum MountError {
    /// No engine could be started at all.
    #[error("failed to start media engine: {0:#}")]
    Start(anyhow::Error),
    /// The engine started but rejected the stream; it has been disposed.
    #[error("{0:#}")]
    Load(anyhow::Error),
}

/// One mounted title: the engine plus the episode it currently plays.
#[derive(Debug)]
pub struct PlaybackSession<E> {
    id: SessionId,
    title_id: String,
    current_sequence: usize,
    engine: E,
    last_persisted_offset: Option<f64>,
    pending_resume: Option<f64>,
    duration_hint: Option<f64>,
    next: Option<NavTarget>,
    settings: SessionSettings,
}

impl<E: MediaEngine> PlaybackSession<E> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn title_id(&self) -> &str {
        &self.title_id
    }

    pub fn current_sequence(&self) -> usize {
        self.current_sequence
    }

    pub fn last_persisted_offset(&self) -> Option<f64> {
        self.last_persisted_offset
    }

    pub fn set_next(&mut self, next: Option<NavTarget>) {
        self.next = next;
    }

    /// Swaps media and subtitles on the running engine for another episode of
    /// the same title.
    pub async fn swap_episode(
        &mut self,
        sequence: usize,
        locator: &MediaLocator,
        progress: &ProgressStore,
    ) -> Result<()> {
        debug!(session = %self.id, from = self.current_sequence, to = sequence, "swapping episode in place");
        self.current_sequence = sequence;
        self.last_persisted_offset = None;
        self.load(locator, progress).await
    }

    async fn load(&mut self, locator: &MediaLocator, progress: &ProgressStore) -> Result<()> {
        self.pending_resume = progress.offset(&self.title_id, self.current_sequence);
        self.duration_hint = locator.duration_seconds;
        self.engine
            .load_source(&locator.stream_url)
            .await
            .context("failed to load stream")?;
        for subtitle in &locator.subtitles {
            let track = SubtitleTrack {
                url: subtitle.url.clone(),
                language: subtitle.language_code.clone(),
                label: subtitle.label(),
                selected: subtitle
                    .language_code
                    .eq_ignore_ascii_case(&self.settings.preferred_subtitle),
            };
            self.engine.add_subtitle_track(track).await?;
        }
        self.engine.play().await
    }

    pub async fn on_event(
        &mut self,
        event: EngineEvent,
        progress: &mut ProgressStore,
    ) -> Result<SessionSignal> {
        match event {
            EngineEvent::MetadataLoaded => {
                if let Some(offset) = self.pending_resume.take() {
                    info!(session = %self.id, offset, "resuming from saved position");
                    self.engine.seek(offset).await?;
                }
                Ok(SessionSignal::Nothing)
            }
            EngineEvent::TimeUpdate(offset) => {
                if offset > self.settings.resume_threshold_secs {
                    progress.record(&self.title_id, self.current_sequence, offset)?;
                    self.last_persisted_offset = Some(offset);
                }
                Ok(SessionSignal::Nothing)
            }
            EngineEvent::Ended => Ok(match &self.next {
                Some(next) => SessionSignal::Advance(next.clone()),
                None => SessionSignal::Stopped,
            }),
            EngineEvent::Exited => Ok(SessionSignal::Closed),
        }
    }

    pub async fn handle_key(&mut self, key: TransportKey) -> Result<()> {
        match key {
            TransportKey::TogglePlay => {
                if self.engine.is_paused() {
                    self.engine.play().await
                } else {
                    self.engine.pause().await
                }
            }
            TransportKey::SeekBackward => {
                let target = (self.engine.current_time() - self.settings.seek_step_secs).max(0.0);
                self.engine.seek(target).await
            }
            TransportKey::SeekForward => {
                let mut target = self.engine.current_time() + self.settings.seek_step_secs;
                if let Some(duration) = self.engine.duration().or(self.duration_hint) {
                    target = target.min(duration);
                }
                self.engine.seek(target).await
            }
            TransportKey::ToggleFullscreen => self.engine.toggle_fullscreen().await,
        }
    }

    async fn dispose(mut self, progress: &mut ProgressStore) {
        debug!(session = %self.id, title = %self.title_id, "disposing session");
        if let Err(err) = self.engine.dispose().await {
            warn!(session = %self.id, error = %err, "engine dispose failed");
        }
        if let Err(err) = progress.flush() {
            warn!(error = %err, "failed to flush progress");
        }
    }
}

/// Owns the single live [`PlaybackSession`] and the factory that builds
/// engines for it.
#[derive(Debug)]
pub struct SessionManager<F: EngineFactory> {
    factory: F,
    current: Option<PlaybackSession<F::Engine>>,
    next_id: u64,
    settings: SessionSettings,
}

impl<F: EngineFactory> SessionManager<F> {
    pub fn new(factory: F, settings: SessionSettings) -> Self {
        Self {
            factory,
            current: None,
            next_id: 0,
            settings,
        }
    }

    pub fn current(&self) -> Option<&PlaybackSession<F::Engine>> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut PlaybackSession<F::Engine>> {
        self.current.as_mut()
    }

    pub fn current_title(&self) -> Option<&str> {
        self.current.as_ref().map(|session| session.title_id())
    }

    pub fn is_live(&self, id: SessionId) -> bool {
        self.current.as_ref().is_some_and(|session| session.id == id)
    }

    /// Disposes any live session, then builds a fresh engine for `locator`.
    pub async fn mount(
        &mut self,
        title_id: &str,
        sequence: usize,
        locator: &MediaLocator,
        events: UnboundedSender<AppEvent>,
        progress: &mut ProgressStore,
    ) -> Result<SessionId, MountError> {
        self.unmount(progress).await;

        self.next_id += 1;
        let id = SessionId(self.next_id);
        let engine = self
            .factory
            .create(EngineEvents::new(id, events))
            .await
            .map_err(MountError::Start)?;
        let mut session = PlaybackSession {
            id,
            title_id: title_id.to_string(),
            current_sequence: sequence,
            engine,
            last_persisted_offset: None,
            pending_resume: None,
            duration_hint: None,
            next: None,
            settings: self.settings.clone(),
        };
        if let Err(err) = session.load(locator, progress).await {
            session.dispose(progress).await;
            return Err(MountError::Load(err));
        }
        info!(session = %id, title = %title_id, sequence, "session mounted");
        self.current = Some(session);
        Ok(id)
    }

    pub async fn unmount(&mut self, progress: &mut ProgressStore) {
        if let Some(session) = self.current.take() {
            session.dispose(progress).await;
        }
    }
}
