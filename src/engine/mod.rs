use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;

use crate::events::AppEvent;
use crate::session::SessionId;

#[cfg(unix)]
pub mod mpv;

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleTrack {
    pub url: String,
    pub language: String,
    pub label: String,
    pub selected: bool,
}

/// Signals a media engine reports back while it plays.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Media metadata is available; seeking is safe from here on.
    MetadataLoaded,
    TimeUpdate(f64),
    Ended,
    /// The engine went away on its own (window closed, process died).
    Exited,
}

/// The narrow set of playback controls a session needs.
pub trait MediaEngine {
    /// Replaces the current media and drops its subtitle tracks.
    async fn load_source(&mut self, url: &str) -> Result<()>;
    async fn add_subtitle_track(&mut self, track: SubtitleTrack) -> Result<()>;
    async fn play(&mut self) -> Result<()>;
    async fn pause(&mut self) -> Result<()>;
    fn is_paused(&self) -> bool;
    async fn seek(&mut self, offset: f64) -> Result<()>;
    fn current_time(&self) -> f64;
    fn duration(&self) -> Option<f64>;
    async fn toggle_fullscreen(&mut self) -> Result<()>;
    async fn dispose(&mut self) -> Result<()>;
}

pub trait EngineFactory {
    type Engine: MediaEngine;

    async fn create(&self, events: EngineEvents) -> Result<Self::Engine>;
}

/// Event sink handed to one engine instance; every event is tagged with the
/// session that owns the engine.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    session: SessionId,
    tx: UnboundedSender<AppEvent>,
}

impl EngineEvents {
    pub fn new(session: SessionId, tx: UnboundedSender<AppEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns false once nobody listens any more.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(AppEvent::Engine {
                session: self.session,
                event,
            })
            .is_ok()
    }
}
