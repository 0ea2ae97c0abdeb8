use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::task::LocalSet;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod catalog;
mod engine;
mod error;
mod events;
mod gate;
mod navigator;
mod progress;
mod resolver;
mod route;
mod router;
mod session;
mod settings;
mod terminal;
mod types;
mod view;

use route::Route;

#[derive(Debug, Parser)]
#[command(name = "dramain", about = "Browse and stream short dramas via mpv.", version)]
struct Cli {
    /// Start at a hash route, e.g. '#/play/abc?seq=2'.
    #[arg(long, value_name = "HASH", conflicts_with_all = ["rank", "drama", "play"])]
    route: Option<String>,

    #[arg(long)]
    rank: bool,

    #[arg(long, value_name = "ID")]
    drama: Option<String>,

    #[arg(long, value_name = "ID")]
    play: Option<String>,

    /// 1-based episode number for --play.
    #[arg(short = 'e', long, value_name = "EPISODE", requires = "play")]
    episode: Option<usize>,

    #[arg(long, value_name = "LANG")]
    lang: Option<String>,

    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(value_name = "QUERY")]
    query: Vec<String>,
}

impl Cli {
    fn start_route(&self) -> Route {
        if let Some(hash) = &self.route {
            return Route::parse(hash);
        }
        if let Some(id) = &self.play {
            let seq = self.episode.unwrap_or(1).saturating_sub(1);
            return Route::play(id, seq);
        }
        if let Some(id) = &self.drama {
            return Route::Drama { id: id.clone() };
        }
        if self.rank {
            return Route::Rank;
        }
        if !self.query.is_empty() {
            return Route::Search {
                query: self.query.join(" "),
            };
        }
        Route::Home
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dramain=debug" } else { "dramain=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = LocalSet::new().run_until(run(cli)).await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

#[cfg(unix)]
async fn run(cli: Cli) -> Result<()> {
    use std::rc::Rc;

    use tokio::sync::mpsc;

    use catalog::CatalogClient;
    use catalog::transport::HttpTransport;
    use engine::mpv::MpvFactory;
    use gate::RateGate;
    use progress::{ProgressStore, progress_path};
    use router::Router;
    use session::SessionManager;
    use settings::Settings;
    use terminal::TerminalView;

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(lang) = &cli.lang {
        settings.lang = lang.clone();
    }
    let start = cli.start_route();

    let progress_file = match &settings.progress_file {
        Some(path) => path.clone(),
        None => progress_path()?,
    };
    let progress = ProgressStore::load(&progress_file, settings.progress_flush())?;

    let gate = Rc::new(RateGate::new(settings.rate_limit()));
    let catalog = Rc::new(CatalogClient::new(
        HttpTransport::new()?,
        Rc::clone(&gate),
        &settings.api_base,
        &settings.relay_base,
        &settings.lang,
        settings.request_timeout(),
    )?);
    tracing::debug!(
        api = %settings.api_base,
        lang = catalog.lang(),
        min_interval_ms = gate.min_interval().as_millis() as u64,
        "catalog client ready"
    );
    let sessions = SessionManager::new(MpvFactory::new(&settings.player)?, settings.session());

    let (tx, rx) = mpsc::unbounded_channel();
    let router = Router::new(catalog, sessions, progress, TerminalView::new(), tx.clone());
    app::run(router, tx, rx, start).await
}

#[cfg(not(unix))]
async fn run(_cli: Cli) -> Result<()> {
    anyhow::bail!("dramain drives mpv over a Unix socket and needs a Unix system")
}
