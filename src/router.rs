use std::rc::Rc;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task;
use tracing::{debug, info, warn};

use crate::catalog::CatalogClient;
use crate::catalog::transport::Transport;
use crate::engine::{EngineEvent, EngineFactory};
use crate::error::PlaybackError;
use crate::events::{AppEvent, KeyCommand};
use crate::navigator::{EpisodeNavigation, navigate};
use crate::progress::ProgressStore;
use crate::resolver::LocatorResolver;
use crate::route::Route;
use crate::session::{MountError, SessionId, SessionManager, SessionSignal};
use crate::types::{EpisodeRef, MediaLocator, RankKind, Title};
use crate::view::{CatalogPage, PlayerViewModel, TitleSection, ViewSink};

const HOME_PAGE_SIZE: u32 = 20;

/// Result of a spawned resolution, tagged with the navigation that asked for it.
#[derive(Debug)]
pub struct ResolutionOutcome {
    pub generation: u64,
    pub title_id: String,
    pub result: Result<Resolved, PlaybackError>,
}

#[derive(Debug)]
pub struct Resolved {
    pub load: Load,
    pub navigation: EpisodeNavigation,
    /// Sequence the user asked for.
    pub requested: usize,
    /// Sequence actually resolved and played.
    pub sequence: usize,
    pub locator: MediaLocator,
}

#[derive(Debug)]
pub enum Load {
    Mount {
        title: Option<Title>,
        episodes: Vec<EpisodeRef>,
    },
    Patch,
}

/// What the caller should show after a navigation.
#[derive(Debug)]
pub enum Screen {
    Page(CatalogPage),
    /// The player is (being) mounted; keep pumping events.
    Player,
    Failed(PlaybackError),
}

#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue,
    Navigate(Route),
    Quit,
}

struct PlayerState {
    title_id: String,
    title: Option<Title>,
    episodes: Vec<EpisodeRef>,
    model: PlayerViewModel,
}

/// Decides between mounting and patching on every navigation and applies
/// resolution results, engine events and keys to the live session.
pub struct Router<T, F: EngineFactory, V> {
    catalog: Rc<CatalogClient<T>>,
    resolver: Rc<LocatorResolver<T>>,
    sessions: SessionManager<F>,
    progress: ProgressStore,
    view: V,
    events: UnboundedSender<AppEvent>,
    generation: u64,
    route: Route,
    player: Option<PlayerState>,
    key_binding: Option<SessionId>,
}

impl<T, F, V> Router<T, F, V>
where
    T: Transport + 'static,
    F: EngineFactory,
    V: ViewSink,
{
    pub fn new(
        catalog: Rc<CatalogClient<T>>,
        sessions: SessionManager<F>,
        progress: ProgressStore,
        view: V,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        let resolver = Rc::new(LocatorResolver::new(Rc::clone(&catalog)));
        Self {
            catalog,
            resolver,
            sessions,
            progress,
            view,
            events,
            generation: 0,
            route: Route::Home,
            player: None,
            key_binding: None,
        }
    }

    pub async fn navigate(&mut self, route: Route) -> Screen {
        self.generation += 1;
        info!(route = %route, generation = self.generation, "navigating");
        self.route = route.clone();

        match route {
            Route::Play { id, seq } => {
                self.view.show_loading(&self.route);
                let patchable = self.sessions.current_title() == Some(id.as_str())
                    && self.player.as_ref().is_some_and(|p| p.title_id == id);
                if patchable {
                    self.spawn_patch(id, seq);
                } else {
                    self.unmount().await;
                    self.spawn_mount(id, seq);
                }
                Screen::Player
            }
            other => {
                self.unmount().await;
                match self.load_page(other).await {
                    Ok(page) => Screen::Page(page),
                    Err(err) => {
                        warn!(route = %self.route, error = %err, "page failed to load");
                        Screen::Failed(err)
                    }
                }
            }
        }
    }

    pub async fn handle(&mut self, event: AppEvent) -> Result<Flow> {
        match event {
            AppEvent::Resolved(outcome) => self.on_resolved(outcome).await,
            AppEvent::Engine { session, event } => Ok(self.on_engine(session, event).await),
            AppEvent::Key(command) => Ok(self.on_key(command).await),
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(session) = self.sessions.current() {
            info!(
                title = %session.title_id(),
                sequence = session.current_sequence(),
                offset = ?session.last_persisted_offset(),
                "closing player"
            );
        }
        self.unmount().await;
        if let Err(err) = self.progress.flush() {
            warn!(error = %err, "failed to flush progress on shutdown");
        }
    }

    async fn unmount(&mut self) {
        self.player = None;
        self.sessions.unmount(&mut self.progress).await;
    }

    fn spawn_mount(&self, title_id: String, requested: usize) {
        let generation = self.generation;
        let catalog = Rc::clone(&self.catalog);
        let resolver = Rc::clone(&self.resolver);
        let events = self.events.clone();
        task::spawn_local(async move {
            let result = resolve_mount(&catalog, &resolver, &title_id, requested).await;
            let _ = events.send(AppEvent::Resolved(ResolutionOutcome {
                generation,
                title_id,
                result,
            }));
        });
    }

    fn spawn_patch(&self, title_id: String, requested: usize) {
        let Some(player) = &self.player else {
            return;
        };
        let navigation = navigate(&player.episodes, requested);
        let sequence = navigation
            .current
            .as_ref()
            .map_or(requested, |ep| ep.sequence_index);
        let generation = self.generation;
        let resolver = Rc::clone(&self.resolver);
        let events = self.events.clone();
        task::spawn_local(async move {
            let result = resolver
                .resolve(&title_id, sequence)
                .await
                .map(|locator| Resolved {
                    load: Load::Patch,
                    navigation,
                    requested,
                    sequence,
                    locator,
                });
            let _ = events.send(AppEvent::Resolved(ResolutionOutcome {
                generation,
                title_id,
                result,
            }));
        });
    }

    async fn on_resolved(&mut self, outcome: ResolutionOutcome) -> Result<Flow> {
        if outcome.generation != self.generation {
            debug!(
                stale = outcome.generation,
                current = self.generation,
                title = %outcome.title_id,
                "discarding stale resolution"
            );
            return Ok(Flow::Continue);
        }
        let resolved = match outcome.result {
            Ok(resolved) => resolved,
            Err(err) => {
                self.view.show_error(&err);
                return Ok(Flow::Continue);
            }
        };

        let Resolved {
            load,
            navigation,
            requested,
            sequence,
            locator,
        } = resolved;
        match load {
            Load::Mount { title, episodes } => {
                let mounted = self
                    .sessions
                    .mount(
                        &outcome.title_id,
                        sequence,
                        &locator,
                        self.events.clone(),
                        &mut self.progress,
                    )
                    .await;
                let id = match mounted {
                    Ok(id) => id,
                    Err(MountError::Load(err)) => {
                        return Ok(self.player_failed(&outcome.title_id, err).await);
                    }
                    Err(err @ MountError::Start(_)) => return Err(err.into()),
                };
                if let Some(session) = self.sessions.current_mut() {
                    session.set_next(navigation.next_target(&outcome.title_id));
                }
                let model = PlayerViewModel::build(
                    &outcome.title_id,
                    title.as_ref(),
                    &episodes,
                    &navigation,
                    requested,
                    &locator,
                );
                self.view.mount_player(&model);
                self.key_binding = Some(id);
                self.player = Some(PlayerState {
                    title_id: outcome.title_id,
                    title,
                    episodes,
                    model,
                });
            }
            Load::Patch => {
                let (Some(player), Some(session)) = (&mut self.player, self.sessions.current_mut())
                else {
                    warn!(title = %outcome.title_id, "patch resolved without a live session");
                    return Ok(Flow::Continue);
                };
                if let Err(err) = session.swap_episode(sequence, &locator, &self.progress).await {
                    return Ok(self.player_failed(&outcome.title_id, err).await);
                }
                session.set_next(navigation.next_target(&player.title_id));
                let model = PlayerViewModel::build(
                    &player.title_id,
                    player.title.as_ref(),
                    &player.episodes,
                    &navigation,
                    requested,
                    &locator,
                );
                let patches = player.model.diff(&model);
                debug!(count = patches.len(), "patching player view");
                self.view.patch_player(&patches);
                player.model = model;
            }
        }
        Ok(Flow::Continue)
    }

    /// Tears down a session whose engine rejected a stream and shows the
    /// error panel so the user can retry.
    async fn player_failed(&mut self, title_id: &str, err: anyhow::Error) -> Flow {
        let message = format!("{err:#}");
        warn!(title = %title_id, error = %message, "player failed to load stream");
        self.unmount().await;
        self.view.show_error(&PlaybackError::Player(message));
        Flow::Continue
    }

    async fn on_engine(&mut self, session: SessionId, event: EngineEvent) -> Flow {
        if !self.sessions.is_live(session) {
            debug!(%session, ?event, "dropping event from disposed session");
            return Flow::Continue;
        }
        let Some(current) = self.sessions.current_mut() else {
            return Flow::Continue;
        };
        let signal = match current.on_event(event, &mut self.progress).await {
            Ok(signal) => signal,
            Err(err) => {
                warn!(%session, error = %err, "session failed to handle engine event");
                return Flow::Continue;
            }
        };
        match signal {
            SessionSignal::Nothing => Flow::Continue,
            SessionSignal::Advance(next) => {
                info!(title = %next.title_id, sequence = next.sequence, "episode ended, advancing");
                Flow::Navigate(Route::play(next.title_id, next.sequence))
            }
            SessionSignal::Stopped => {
                self.view.status("Playback finished");
                Flow::Continue
            }
            SessionSignal::Closed => {
                let back = self.back_route();
                self.unmount().await;
                Flow::Navigate(back)
            }
        }
    }

    async fn on_key(&mut self, command: KeyCommand) -> Flow {
        match command {
            KeyCommand::Transport(key) => {
                if !self.binding_is_live() {
                    return Flow::Continue;
                }
                if let Some(session) = self.sessions.current_mut() {
                    if let Err(err) = session.handle_key(key).await {
                        warn!(?key, error = %err, "transport key failed");
                    }
                }
                Flow::Continue
            }
            KeyCommand::NextEpisode | KeyCommand::PreviousEpisode => {
                let target = self.player.as_ref().and_then(|player| {
                    if command == KeyCommand::NextEpisode {
                        player.model.next.clone()
                    } else {
                        player.model.previous.clone()
                    }
                });
                match target {
                    Some(target) => Flow::Navigate(Route::play(target.title_id, target.sequence)),
                    None => {
                        self.view.status("No episode in that direction");
                        Flow::Continue
                    }
                }
            }
            KeyCommand::Back => Flow::Navigate(self.back_route()),
            KeyCommand::Retry => {
                let route = self.route.clone();
                self.unmount().await;
                Flow::Navigate(route)
            }
            KeyCommand::Quit => Flow::Quit,
        }
    }

    /// Drops the key binding once the session it was bound to is gone.
    fn binding_is_live(&mut self) -> bool {
        match self.key_binding {
            Some(id) if self.sessions.is_live(id) => true,
            Some(id) => {
                debug!(session = %id, "bound session is gone, releasing keys");
                self.key_binding = None;
                false
            }
            None => false,
        }
    }

    fn back_route(&self) -> Route {
        match (&self.player, &self.route) {
            (Some(player), _) => Route::Drama {
                id: player.title_id.clone(),
            },
            (None, Route::Play { id, .. }) => Route::Drama { id: id.clone() },
            _ => Route::Home,
        }
    }

    async fn load_page(&self, route: Route) -> Result<CatalogPage, PlaybackError> {
        match route {
            Route::Home => {
                let mut sections = vec![TitleSection {
                    heading: String::from("Latest"),
                    titles: self.catalog.home(1, HOME_PAGE_SIZE).await?,
                }];
                match self.catalog.recommendations().await {
                    Ok(titles) if !titles.is_empty() => sections.push(TitleSection {
                        heading: String::from("Recommended"),
                        titles,
                    }),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "recommendations unavailable"),
                }
                Ok(CatalogPage::Listing {
                    sections,
                    ranked: false,
                })
            }
            Route::Search { query } => {
                let titles = self.catalog.search(&query, 1).await?;
                Ok(CatalogPage::Listing {
                    sections: vec![TitleSection {
                        heading: format!("Results for \"{}\"", query.trim()),
                        titles,
                    }],
                    ranked: false,
                })
            }
            Route::Rank => {
                let titles = self.catalog.rank(RankKind::Popular, 1).await?;
                Ok(CatalogPage::Listing {
                    sections: vec![TitleSection {
                        heading: String::from("Top ranked"),
                        titles,
                    }],
                    ranked: true,
                })
            }
            Route::Drama { id } => {
                let title = self.catalog.detail(&id).await?;
                let episodes = self.catalog.episodes(&id).await?;
                Ok(CatalogPage::Detail { title, episodes })
            }
            Route::NotFound(route) => Ok(CatalogPage::NotFound { route }),
            Route::Play { .. } => Ok(CatalogPage::NotFound {
                route: route.to_string(),
            }),
        }
    }

    #[cfg(test)]
    fn view(&self) -> &V {
        &self.view
    }
}

/// Fetches the episode list, picks the sequence to play and resolves it.
async fn resolve_mount<T: Transport>(
    catalog: &CatalogClient<T>,
    resolver: &LocatorResolver<T>,
    title_id: &str,
    requested: usize,
) -> Result<Resolved, PlaybackError> {
    let episodes = match catalog.episodes(title_id).await {
        Ok(episodes) => episodes,
        Err(err @ PlaybackError::Validation(_)) => return Err(err),
        Err(err) => {
            warn!(title = %title_id, error = %err, "episode list unavailable");
            Vec::new()
        }
    };
    let navigation = navigate(&episodes, requested);
    let sequence = navigation
        .current
        .as_ref()
        .map_or(requested, |ep| ep.sequence_index);
    let locator = resolver.resolve(title_id, sequence).await?;

    let title = if locator.display_title.is_none() {
        catalog
            .detail(title_id)
            .await
            .inspect_err(|err| debug!(title = %title_id, error = %err, "title detail unavailable"))
            .ok()
    } else {
        None
    };

    Ok(Resolved {
        load: Load::Mount { title, episodes },
        navigation,
        requested,
        sequence,
        locator,
    })
}
