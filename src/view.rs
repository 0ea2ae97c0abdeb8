use crate::error::PlaybackError;
use crate::navigator::EpisodeNavigation;
use crate::route::Route;
use crate::types::{EpisodeRef, MediaLocator, NavTarget, Title};

/// Stable handles for the player elements that change between episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementId {
    EpisodeLabel,
    PrevButton,
    NextButton,
    /// Grid entry keyed by the episode's sequence index.
    GridCell(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub id: ElementId,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerViewModel {
    pub title_id: String,
    pub title: String,
    pub episode_label: String,
    pub grid: Vec<GridCell>,
    pub highlighted: Option<ElementId>,
    pub previous: Option<NavTarget>,
    pub next: Option<NavTarget>,
    pub subtitles: Vec<String>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewPatch {
    SetText {
        id: ElementId,
        text: String,
    },
    Highlight {
        from: Option<ElementId>,
        to: Option<ElementId>,
    },
    SetTarget {
        id: ElementId,
        target: Option<NavTarget>,
    },
    SetSubtitles(Vec<String>),
    ReplaceGrid(Vec<GridCell>),
    Notice(Option<String>),
}

impl PlayerViewModel {
    pub fn build(
        title_id: &str,
        title: Option<&Title>,
        episodes: &[EpisodeRef],
        navigation: &EpisodeNavigation,
        sequence: usize,
        locator: &MediaLocator,
    ) -> Self {
        let name = title
            .map(|t| t.display_title.clone())
            .filter(|name| !name.is_empty())
            .or_else(|| locator.display_title.clone())
            .unwrap_or_else(|| title_id.to_string());
        let episode_label = navigation
            .current
            .as_ref()
            .map(EpisodeRef::label)
            .unwrap_or_else(|| format!("Episode {}", sequence + 1));
        let grid: Vec<GridCell> = episodes
            .iter()
            .map(|ep| GridCell {
                id: ElementId::GridCell(ep.sequence_index),
                number: ep.display_number,
            })
            .collect();
        let playing = navigation
            .current
            .as_ref()
            .map_or(sequence, |ep| ep.sequence_index);
        let highlighted = grid
            .iter()
            .map(|cell| cell.id)
            .find(|id| *id == ElementId::GridCell(playing));
        let notice = (!episodes.is_empty() && !navigation.exact_match)
            .then(|| format!("Episode {} is not listed, playing the first episode", sequence + 1));

        Self {
            title_id: title_id.to_string(),
            title: name,
            episode_label,
            grid,
            highlighted,
            previous: navigation.previous_target(title_id),
            next: navigation.next_target(title_id),
            subtitles: locator.subtitles.iter().map(|s| s.label()).collect(),
            notice,
        }
    }

    /// Element-level changes that turn `self` into `next`.
    pub fn diff(&self, next: &PlayerViewModel) -> Vec<ViewPatch> {
        let mut patches = Vec::new();
        if self.grid != next.grid {
            patches.push(ViewPatch::ReplaceGrid(next.grid.clone()));
        }
        if self.episode_label != next.episode_label {
            patches.push(ViewPatch::SetText {
                id: ElementId::EpisodeLabel,
                text: next.episode_label.clone(),
            });
        }
        if self.highlighted != next.highlighted {
            patches.push(ViewPatch::Highlight {
                from: self.highlighted,
                to: next.highlighted,
            });
        }
        if self.previous != next.previous {
            patches.push(ViewPatch::SetTarget {
                id: ElementId::PrevButton,
                target: next.previous.clone(),
            });
        }
        if self.next != next.next {
            patches.push(ViewPatch::SetTarget {
                id: ElementId::NextButton,
                target: next.next.clone(),
            });
        }
        if self.subtitles != next.subtitles {
            patches.push(ViewPatch::SetSubtitles(next.subtitles.clone()));
        }
        if self.notice != next.notice {
            patches.push(ViewPatch::Notice(next.notice.clone()));
        }
        patches
    }

    pub fn apply(&mut self, patch: &ViewPatch) {
        match patch {
            ViewPatch::SetText { id, text } => {
                if *id == ElementId::EpisodeLabel {
                    self.episode_label = text.clone();
                }
            }
            ViewPatch::Highlight { to, .. } => self.highlighted = *to,
            ViewPatch::SetTarget { id, target } => match id {
                ElementId::PrevButton => self.previous = target.clone(),
                ElementId::NextButton => self.next = target.clone(),
                _ => {}
            },
            ViewPatch::SetSubtitles(labels) => self.subtitles = labels.clone(),
            ViewPatch::ReplaceGrid(grid) => self.grid = grid.clone(),
            ViewPatch::Notice(notice) => self.notice = notice.clone(),
        }
    }

    /// Display number of the grid cell a target points at.
    pub fn number_for(&self, target: &NavTarget) -> Option<u64> {
        self.grid
            .iter()
            .find(|cell| cell.id == ElementId::GridCell(target.sequence))
            .map(|cell| cell.number)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleSection {
    pub heading: String,
    pub titles: Vec<Title>,
}

/// Non-player screens.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogPage {
    Listing {
        sections: Vec<TitleSection>,
        ranked: bool,
    },
    Detail {
        title: Title,
        episodes: Vec<EpisodeRef>,
    },
    NotFound {
        route: String,
    },
}

/// Where the router sends player output.
pub trait ViewSink {
    fn show_loading(&mut self, route: &Route);
    fn mount_player(&mut self, model: &PlayerViewModel);
    fn patch_player(&mut self, patches: &[ViewPatch]);
    /// Terminal error panel; the user may retry with a full reload.
    fn show_error(&mut self, error: &PlaybackError);
    fn status(&mut self, message: &str);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{PlayerViewModel, ViewPatch, ViewSink};
    use crate::error::PlaybackError;
    use crate::route::Route;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Rendered {
        Loading(Route),
        Mount(PlayerViewModel),
        Patch(Vec<ViewPatch>),
        Error(String),
        Status(String),
    }

    #[derive(Debug, Default)]
    pub struct RecordingView {
        pub rendered: Vec<Rendered>,
    }

    impl ViewSink for RecordingView {
        fn show_loading(&mut self, route: &Route) {
            self.rendered.push(Rendered::Loading(route.clone()));
        }

        fn mount_player(&mut self, model: &PlayerViewModel) {
            self.rendered.push(Rendered::Mount(model.clone()));
        }

        fn patch_player(&mut self, patches: &[ViewPatch]) {
            self.rendered.push(Rendered::Patch(patches.to_vec()));
        }

        fn show_error(&mut self, error: &PlaybackError) {
            self.rendered.push(Rendered::Error(error.to_string()));
        }

        fn status(&mut self, message: &str) {
            self.rendered.push(Rendered::Status(message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::navigate;
    use crate::types::Subtitle;

    fn episodes(count: usize) -> Vec<EpisodeRef> {
        (0..count)
            .map(|seq| EpisodeRef {
                external_id: format!("v{seq}"),
                sequence_index: seq,
                display_number: seq as u64 + 1,
                title: String::new(),
            })
            .collect()
    }

    fn locator(langs: &[&str]) -> MediaLocator {
        MediaLocator {
            stream_url: String::from("s.m3u8"),
            subtitles: langs
                .iter()
                .map(|lang| Subtitle {
                    language_code: lang.to_string(),
                    url: format!("{lang}.vtt"),
                })
                .collect(),
            display_title: Some(String::from("From Stream")),
            sequence: None,
            duration_seconds: None,
        }
    }

    fn model(eps: &[EpisodeRef], seq: usize, langs: &[&str]) -> PlayerViewModel {
        PlayerViewModel::build("t1", None, eps, &navigate(eps, seq), seq, &locator(langs))
    }

    #[test]
    fn build_marks_current_cell_and_neighbours() {
        let eps = episodes(3);
        let vm = model(&eps, 1, &["id"]);
        assert_eq!(vm.title, "From Stream");
        assert_eq!(vm.episode_label, "Episode 2");
        assert_eq!(vm.highlighted, Some(ElementId::GridCell(1)));
        assert_eq!(vm.previous, Some(NavTarget::new("t1", 0)));
        assert_eq!(vm.next, Some(NavTarget::new("t1", 2)));
        assert_eq!(vm.subtitles, vec![String::from("ID")]);
        assert!(vm.notice.is_none());
    }

    #[test]
    fn moving_to_next_episode_patches_only_changed_elements() {
        let eps = episodes(3);
        let before = model(&eps, 0, &["id"]);
        let after = model(&eps, 1, &["id"]);
        let patches = before.diff(&after);

        assert_eq!(patches, vec![
            ViewPatch::SetText {
                id: ElementId::EpisodeLabel,
                text: String::from("Episode 2"),
            },
            ViewPatch::Highlight {
                from: Some(ElementId::GridCell(0)),
                to: Some(ElementId::GridCell(1)),
            },
            ViewPatch::SetTarget {
                id: ElementId::PrevButton,
                target: Some(NavTarget::new("t1", 0)),
            },
            ViewPatch::SetTarget {
                id: ElementId::NextButton,
                target: Some(NavTarget::new("t1", 2)),
            },
        ]);
    }

    #[test]
    fn applying_a_diff_reaches_the_target_model() {
        let eps = episodes(4);
        let mut current = model(&eps, 3, &["en"]);
        let target = model(&eps, 42, &["id", "en"]);
        for patch in current.diff(&target) {
            current.apply(&patch);
        }
        assert_eq!(current, target);
        assert!(current.notice.is_some());
    }

    #[test]
    fn identical_models_need_no_patches() {
        let eps = episodes(2);
        assert!(model(&eps, 0, &[]).diff(&model(&eps, 0, &[])).is_empty());
    }

    #[test]
    fn number_for_reads_upstream_numbering() {
        let mut eps = episodes(2);
        eps[1].display_number = 7;
        let vm = model(&eps, 0, &[]);
        assert_eq!(vm.number_for(&NavTarget::new("t1", 1)), Some(7));
        assert_eq!(vm.number_for(&NavTarget::new("t1", 5)), None);
    }
}
