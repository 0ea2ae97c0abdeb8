use serde::{Deserialize, Serialize};

/// Snapshot of a catalog title as shown on listing and detail pages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Title {
    pub external_id: String,
    pub display_title: String,
    pub cover_url: String,
    pub rating_or_hot_value: String,
    pub episode_count: usize,
    pub description: String,
    pub tags: Vec<String>,
}

impl Title {
    pub fn label(&self) -> String {
        let mut label = self.display_title.clone();
        if self.episode_count > 0 {
            label.push_str(&format!(" [{} eps]", self.episode_count));
        }
        if !self.rating_or_hot_value.is_empty() && self.rating_or_hot_value != "0" {
            label.push_str(&format!(" \u{2605} {}", self.rating_or_hot_value));
        }
        label
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub external_id: String,
    /// Always 0-based.
    pub sequence_index: usize,
    pub display_number: u64,
    pub title: String,
}

impl EpisodeRef {
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            format!("Episode {}", self.display_number)
        } else {
            format!("Episode {} \u{00b7} {}", self.display_number, self.title)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub language_code: String,
    pub url: String,
}

impl Subtitle {
    pub fn label(&self) -> String {
        self.language_code.to_uppercase()
    }
}

/// Ready-to-play descriptor. Only the resolver hands these out, and only with a
/// non-empty `stream_url`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaLocator {
    pub stream_url: String,
    pub subtitles: Vec<Subtitle>,
    pub display_title: Option<String>,
    pub sequence: Option<usize>,
    pub duration_seconds: Option<f64>,
}

/// Where a navigation control points to: a title and a 0-based sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavTarget {
    pub title_id: String,
    pub sequence: usize,
}

impl NavTarget {
    pub fn new(title_id: impl Into<String>, sequence: usize) -> Self {
        Self {
            title_id: title_id.into(),
            sequence,
        }
    }
}

/// Which ranking list to request from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankKind {
    #[default]
    Popular,
    Rising,
}

impl RankKind {
    pub fn as_param(self) -> u32 {
        match self {
            RankKind::Popular => 1,
            RankKind::Rising => 2,
        }
    }
}
