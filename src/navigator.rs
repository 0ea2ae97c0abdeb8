use tracing::debug;

use crate::types::{EpisodeRef, NavTarget};

/// Current/previous/next episodes for one requested sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeNavigation {
    pub current: Option<EpisodeRef>,
    pub previous: Option<EpisodeRef>,
    pub next: Option<EpisodeRef>,
    /// False when the requested sequence was not in the list and the first
    /// episode was substituted.
    pub exact_match: bool,
}

impl EpisodeNavigation {
    pub fn previous_target(&self, title_id: &str) -> Option<NavTarget> {
        self.previous
            .as_ref()
            .map(|ep| NavTarget::new(title_id, ep.sequence_index))
    }

    pub fn next_target(&self, title_id: &str) -> Option<NavTarget> {
        self.next
            .as_ref()
            .map(|ep| NavTarget::new(title_id, ep.sequence_index))
    }
}

/// Resolves `sequence` against an ordered episode list.
///
/// A sequence that is not in the list falls back to the first episode;
/// neighbours are taken relative to the episode that was picked.
pub fn navigate(episodes: &[EpisodeRef], sequence: usize) -> EpisodeNavigation {
    let exact = episodes.iter().find(|ep| ep.sequence_index == sequence);
    let exact_match = exact.is_some();
    let Some(current) = exact.or_else(|| episodes.first()) else {
        return EpisodeNavigation {
            current: None,
            previous: None,
            next: None,
            exact_match: false,
        };
    };
    if !exact_match {
        debug!(
            requested = sequence,
            substituted = current.sequence_index,
            "sequence not in episode list, using first episode"
        );
    }

    let at = |seq: usize| episodes.iter().find(|ep| ep.sequence_index == seq).cloned();
    let previous = current
        .sequence_index
        .checked_sub(1)
        .and_then(&at);
    let next = current.sequence_index.checked_add(1).and_then(&at);

    EpisodeNavigation {
        current: Some(current.clone()),
        previous,
        next,
        exact_match,
    }
}
