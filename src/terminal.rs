use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use dialoguer::{FuzzySelect, Input, Select, theme::ColorfulTheme};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::error::PlaybackError;
use crate::events::{AppEvent, KeyCommand};
use crate::route::Route;
use crate::session::TransportKey;
use crate::types::Title;
use crate::view::{CatalogPage, ElementId, PlayerViewModel, TitleSection, ViewPatch, ViewSink};

const KEY_POLL: Duration = Duration::from_millis(100);
const KEY_HELP: &str =
    "space play/pause | \u{2190}/\u{2192} seek | f fullscreen | n/p next/prev | b back | q quit";

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// Writes lines with explicit carriage returns so output stays aligned while
/// the terminal is in raw mode.
fn emit<I, S>(lines: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = io::stdout().lock();
    for line in lines {
        let _ = write!(out, "{}\r\n", line.as_ref());
    }
    let _ = out.flush();
}

/// Prints the player to stdout and keeps the last model so patches can be
/// applied element by element.
#[derive(Debug, Default)]
pub struct TerminalView {
    model: Option<PlayerViewModel>,
}

impl TerminalView {
    pub fn new() -> Self {
        Self::default()
    }

    fn grid_line(model: &PlayerViewModel) -> String {
        let cells: Vec<String> = model
            .grid
            .iter()
            .map(|cell| {
                if Some(cell.id) == model.highlighted {
                    format!("[{}]", cell.number)
                } else {
                    cell.number.to_string()
                }
            })
            .collect();
        format!("Episodes: {}", cells.join(" "))
    }

    fn target_line(model: &PlayerViewModel, id: ElementId) -> String {
        let (label, key, target) = match id {
            ElementId::PrevButton => ("Prev", 'p', model.previous.as_ref()),
            _ => ("Next", 'n', model.next.as_ref()),
        };
        match target {
            Some(target) => {
                let number = model
                    .number_for(target)
                    .unwrap_or_else(|| (target.sequence as u64).saturating_add(1));
                format!("{label} [{key}]: Episode {number}")
            }
            None => format!("{label}: -"),
        }
    }

    fn subtitle_line(model: &PlayerViewModel) -> String {
        if model.subtitles.is_empty() {
            String::from("Subtitles: none")
        } else {
            format!("Subtitles: {}", model.subtitles.join(", "))
        }
    }
}

impl ViewSink for TerminalView {
    fn show_loading(&mut self, route: &Route) {
        emit([format!("Loading {route} ...")]);
    }

    fn mount_player(&mut self, model: &PlayerViewModel) {
        let mut lines = vec![
            format!("== {} ==", model.title),
            format!("Now playing: {}", model.episode_label),
        ];
        if !model.grid.is_empty() {
            lines.push(Self::grid_line(model));
        }
        lines.push(Self::target_line(model, ElementId::PrevButton));
        lines.push(Self::target_line(model, ElementId::NextButton));
        lines.push(Self::subtitle_line(model));
        if let Some(notice) = &model.notice {
            lines.push(format!("Note: {notice}"));
        }
        lines.push(KEY_HELP.to_string());
        emit(lines);
        self.model = Some(model.clone());
    }

    fn patch_player(&mut self, patches: &[ViewPatch]) {
        let Some(model) = self.model.as_mut() else {
            return;
        };
        let mut lines = Vec::new();
        for patch in patches {
            model.apply(patch);
            match patch {
                ViewPatch::SetText { .. } => {
                    lines.push(format!("Now playing: {}", model.episode_label));
                }
                ViewPatch::Highlight { .. } | ViewPatch::ReplaceGrid(_) => {
                    lines.push(Self::grid_line(model));
                }
                ViewPatch::SetTarget { id, .. } => lines.push(Self::target_line(model, *id)),
                ViewPatch::SetSubtitles(_) => lines.push(Self::subtitle_line(model)),
                ViewPatch::Notice(Some(notice)) => lines.push(format!("Note: {notice}")),
                ViewPatch::Notice(None) => {}
            }
        }
        emit(lines);
    }

    fn show_error(&mut self, error: &PlaybackError) {
        let mut lines = vec![format!("!! Playback failed: {error}")];
        if let PlaybackError::NotFound { attempts, .. } = error {
            lines.extend(attempts.iter().map(|attempt| format!("   {attempt}")));
        }
        lines.push(String::from("   r retry | b back | q quit"));
        emit(lines);
    }

    fn status(&mut self, message: &str) {
        emit([message]);
    }
}

enum Choice {
    Open(Route),
    Search,
    Rank,
    Home,
}

/// Lets the user pick the next route from a catalog page. `None` means quit.
pub fn choose(page: &CatalogPage) -> Result<Option<Route>> {
    match page {
        CatalogPage::Listing { sections, ranked } => choose_listing(sections, *ranked),
        CatalogPage::Detail { title, episodes } => {
            print_title(title);
            let mut labels: Vec<String> = episodes.iter().map(|ep| ep.label()).collect();
            let mut routes: Vec<Route> = episodes
                .iter()
                .map(|ep| Route::play(&title.external_id, ep.sequence_index))
                .collect();
            if episodes.is_empty() {
                labels.push(String::from("Play"));
                routes.push(Route::play(&title.external_id, 0));
            }
            labels.push(String::from("\u{2190} Home"));
            routes.push(Route::Home);

            let selection = Select::with_theme(&theme())
                .with_prompt("Select an episode (Esc to quit)")
                .items(&labels)
                .default(0)
                .max_length(15)
                .interact_opt()?;
            Ok(selection.map(|idx| routes[idx].clone()))
        }
        CatalogPage::NotFound { route } => {
            println!("Nothing lives at {route}.");
            let selection = Select::with_theme(&theme())
                .with_prompt("Page not found")
                .items(&["Back to home"])
                .default(0)
                .interact_opt()?;
            Ok(selection.map(|_| Route::Home))
        }
    }
}

fn choose_listing(sections: &[TitleSection], ranked: bool) -> Result<Option<Route>> {
    let mut labels = Vec::new();
    let mut choices = Vec::new();
    for section in sections {
        for (rank, title) in section.titles.iter().enumerate() {
            let label = if ranked {
                format!("#{} {}", rank + 1, title.label())
            } else {
                format!("{} \u{00b7} {}", section.heading, title.label())
            };
            labels.push(label);
            choices.push(Choice::Open(Route::Drama {
                id: title.external_id.clone(),
            }));
        }
    }
    if labels.is_empty() {
        println!("No titles found.");
    }
    for (label, choice) in [
        ("[Search]", Choice::Search),
        ("[Top ranked]", Choice::Rank),
        ("[Home]", Choice::Home),
    ] {
        labels.push(label.to_string());
        choices.push(choice);
    }

    let selection = FuzzySelect::with_theme(&theme())
        .with_prompt("Select a title (Esc to quit)")
        .items(&labels)
        .default(0)
        .max_length(15)
        .interact_opt()?;
    let Some(idx) = selection else {
        return Ok(None);
    };
    let route = match choices.swap_remove(idx) {
        Choice::Open(route) => route,
        Choice::Search => {
            let query: String = Input::with_theme(&theme())
                .with_prompt("Search")
                .interact_text()?;
            Route::Search { query }
        }
        Choice::Rank => Route::Rank,
        Choice::Home => Route::Home,
    };
    Ok(Some(route))
}

fn print_title(title: &Title) {
    println!("\n{}", title.label());
    if !title.tags.is_empty() {
        println!("{}", title.tags.join(" \u{00b7} "));
    }
    if !title.description.is_empty() {
        println!("{}\n", title.description);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorChoice {
    Retry,
    Home,
    Quit,
}

/// Error panel for catalog pages.
pub fn error_menu(error: &PlaybackError) -> Result<ErrorChoice> {
    eprintln!("Error: {error}");
    let options = ["Retry", "Home", "Quit"];
    let selection = Select::with_theme(&theme())
        .with_prompt("What now?")
        .items(&options)
        .default(0)
        .interact_opt()?;
    Ok(match selection {
        Some(0) => ErrorChoice::Retry,
        Some(1) => ErrorChoice::Home,
        _ => ErrorChoice::Quit,
    })
}

pub fn map_key(key: KeyEvent) -> Option<KeyCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return (key.code == KeyCode::Char('c')).then_some(KeyCommand::Quit);
    }
    let command = match key.code {
        KeyCode::Char(' ') => KeyCommand::Transport(TransportKey::TogglePlay),
        KeyCode::Left => KeyCommand::Transport(TransportKey::SeekBackward),
        KeyCode::Right => KeyCommand::Transport(TransportKey::SeekForward),
        KeyCode::Char('f') => KeyCommand::Transport(TransportKey::ToggleFullscreen),
        KeyCode::Char('n') => KeyCommand::NextEpisode,
        KeyCode::Char('p') => KeyCommand::PreviousEpisode,
        KeyCode::Char('b') | KeyCode::Esc => KeyCommand::Back,
        KeyCode::Char('r') => KeyCommand::Retry,
        KeyCode::Char('q') => KeyCommand::Quit,
        _ => return None,
    };
    Some(command)
}

/// Reads keys on a background thread while the player is on screen. Raw mode
/// lasts as long as the reader.
pub struct KeyReader {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl KeyReader {
    pub fn start(tx: UnboundedSender<AppEvent>) -> Result<Self> {
        terminal::enable_raw_mode().context("failed to enable raw terminal mode")?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_signal = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !stop_signal.load(Ordering::Relaxed) {
                match event::poll(KEY_POLL) {
                    Ok(false) => {}
                    Ok(true) => match event::read() {
                        Ok(Event::Key(key)) => {
                            if let Some(command) = map_key(key) {
                                if tx.send(AppEvent::Key(command)).is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "terminal read failed");
                            break;
                        }
                    },
                    Err(err) => {
                        warn!(error = %err, "terminal poll failed");
                        break;
                    }
                }
            }
        });
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            let _ = terminal::disable_raw_mode();
        }
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        self.stop();
    }
}
