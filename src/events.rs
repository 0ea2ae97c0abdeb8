use crate::engine::EngineEvent;
use crate::router::ResolutionOutcome;
use crate::session::{SessionId, TransportKey};

/// Everything the router reacts to, funnelled through one channel.
#[derive(Debug)]
pub enum AppEvent {
    Resolved(ResolutionOutcome),
    Engine {
        session: SessionId,
        event: EngineEvent,
    },
    Key(KeyCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Transport(TransportKey),
    NextEpisode,
    PreviousEpisode,
    Back,
    Retry,
    Quit,
}
