use std::fmt;

use thiserror::Error;

pub const GENERIC_NOT_FOUND: &str = "upstream did not return a playable stream";

/// Failures surfaced by the catalog client and the playback resolver.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("{0}")]
    Validation(String),
    #[error("network error: {message}")]
    Network {
        message: String,
        /// Error text the upstream put in its body, if any.
        upstream_message: Option<String>,
    },
    #[error("request timeout ({0}s)")]
    Timeout(u64),
    #[error("unexpected upstream response: {0}")]
    UpstreamFormat(String),
    #[error("{message}")]
    NotFound {
        message: String,
        attempts: Vec<StepFailure>,
    },
    /// The media engine refused a stream it was handed.
    #[error("player error: {0}")]
    Player(String),
}

impl PlaybackError {
    pub fn network(message: impl Into<String>) -> Self {
        PlaybackError::Network {
            message: message.into(),
            upstream_message: None,
        }
    }

    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            PlaybackError::Network {
                upstream_message, ..
            } => upstream_message.as_deref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PlaybackError::Timeout(_))
    }
}

/// One step of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    Path,
    QueryFallback,
    Relay,
}

impl fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionStep::Path => "path",
            ResolutionStep::QueryFallback => "query-fallback",
            ResolutionStep::Relay => "relay",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct StepFailure {
    pub step: ResolutionStep,
    pub error: PlaybackError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}
