use anyhow::Result;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::catalog::transport::Transport;
use crate::engine::EngineFactory;
use crate::events::AppEvent;
use crate::route::Route;
use crate::router::{Flow, Router, Screen};
use crate::terminal::{self, ErrorChoice, KeyReader, TerminalView};

type TerminalRouter<T, F> = Router<T, F, TerminalView>;

/// Alternates between catalog menus and the player until the user quits.
pub async fn run<T, F>(
    mut router: TerminalRouter<T, F>,
    tx: UnboundedSender<AppEvent>,
    mut rx: UnboundedReceiver<AppEvent>,
    start: Route,
) -> Result<()>
where
    T: Transport + 'static,
    F: EngineFactory,
{
    let result = drive(&mut router, &tx, &mut rx, start).await;
    router.shutdown().await;
    result
}

async fn drive<T, F>(
    router: &mut TerminalRouter<T, F>,
    tx: &UnboundedSender<AppEvent>,
    rx: &mut UnboundedReceiver<AppEvent>,
    start: Route,
) -> Result<()>
where
    T: Transport + 'static,
    F: EngineFactory,
{
    let mut route = start;
    loop {
        match router.navigate(route.clone()).await {
            Screen::Page(page) => match terminal::choose(&page)? {
                Some(next) => route = next,
                None => return Ok(()),
            },
            Screen::Failed(err) => match terminal::error_menu(&err)? {
                ErrorChoice::Retry => {}
                ErrorChoice::Home => route = Route::Home,
                ErrorChoice::Quit => return Ok(()),
            },
            Screen::Player => match play(router, tx, rx).await? {
                Some(next) => route = next,
                None => return Ok(()),
            },
        }
    }
}

/// Pumps events while the player is on screen. Returns the catalog route to
/// show next, or `None` to quit.
async fn play<T, F>(
    router: &mut TerminalRouter<T, F>,
    tx: &UnboundedSender<AppEvent>,
    rx: &mut UnboundedReceiver<AppEvent>,
) -> Result<Option<Route>>
where
    T: Transport + 'static,
    F: EngineFactory,
{
    // Keys pressed while a menu was open belong to nobody.
    while let Ok(event) = rx.try_recv() {
        if let AppEvent::Key(command) = event {
            debug!(?command, "dropping key queued outside the player");
        } else {
            router.handle(event).await?;
        }
    }

    let mut keys = KeyReader::start(tx.clone())?;
    let next = loop {
        let Some(event) = rx.recv().await else {
            break None;
        };
        match router.handle(event).await? {
            Flow::Continue => {}
            Flow::Navigate(next) if next.is_player() => {
                router.navigate(next).await;
            }
            Flow::Navigate(next) => break Some(next),
            Flow::Quit => break None,
        }
    };
    keys.stop();
    Ok(next)
}
