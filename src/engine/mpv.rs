use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::{EngineEvent, EngineEvents, EngineFactory, MediaEngine, SubtitleTrack};

const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);
const QUIT_GRACE: Duration = Duration::from_secs(2);
/// Smallest change in `time-pos` worth reporting.
const TIME_STEP: f64 = 0.25;

const OBSERVED: [(u64, &str); 3] = [(1, "time-pos"), (2, "duration"), (3, "pause")];

/// Starts one mpv process per session, idle until a source is loaded.
#[derive(Debug, Clone)]
pub struct MpvFactory {
    program: String,
    args: Vec<String>,
}

impl MpvFactory {
    /// `player` is a full command line, e.g. `mpv --hwdec=auto`.
    pub fn new(player: &str) -> Result<Self> {
        let mut parts = shlex::split(player)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| anyhow!("invalid player command: {player:?}"))?;
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }
}

impl EngineFactory for MpvFactory {
    type Engine = MpvEngine;

    async fn create(&self, events: EngineEvents) -> Result<MpvEngine> {
        let socket = std::env::temp_dir().join(format!(
            "dramain-{}-{:08x}.sock",
            std::process::id(),
            rand::random::<u32>()
        ));
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--idle=yes")
            .arg("--force-window=yes")
            .arg("--terminal=no")
            .arg("--keep-open=no")
            .arg(format!("--input-ipc-server={}", socket.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                bail!(
                    "Player '{}' not found. Install mpv or set `player` in the config file.",
                    self.program
                );
            }
            Err(err) => {
                return Err(anyhow!(err).context(format!("failed to launch player '{}'", self.program)));
            }
        };

        let stream = connect(&socket, &mut child).await?;
        let (read, write) = stream.into_split();
        let writer = Rc::new(Mutex::new(write));
        let state = Rc::new(RefCell::new(MpvState::default()));

        for (id, property) in OBSERVED {
            send(&writer, json!(["observe_property", id, property])).await?;
        }
        debug!(session = %events.session(), socket = %socket.display(), "mpv connected");

        let reader = task::spawn_local(read_events(
            read,
            Rc::clone(&writer),
            Rc::clone(&state),
            events,
        ));
        Ok(MpvEngine {
            child,
            writer,
            state,
            reader,
            socket,
        })
    }
}

async fn connect(socket: &Path, child: &mut Child) -> Result<UnixStream> {
    for _ in 0..CONNECT_ATTEMPTS {
        if let Some(status) = child.try_wait()? {
            bail!("player exited with status {status} before opening its IPC socket");
        }
        match UnixStream::connect(socket).await {
            Ok(stream) => return Ok(stream),
            Err(_) => sleep(CONNECT_BACKOFF).await,
        }
    }
    bail!("timed out waiting for player IPC socket {}", socket.display())
}

async fn send(writer: &Mutex<OwnedWriteHalf>, command: Value) -> Result<()> {
    let mut line = serde_json::to_vec(&json!({ "command": command }))?;
    line.push(b'\n');
    writer
        .lock()
        .await
        .write_all(&line)
        .await
        .context("failed to send command to player")
}

fn sub_add(track: &SubtitleTrack) -> Value {
    let flag = if track.selected { "select" } else { "auto" };
    json!(["sub-add", track.url, flag, track.label, track.language])
}

#[derive(Debug, Default)]
struct MpvState {
    paused: bool,
    time: f64,
    reported_time: Option<f64>,
    duration: Option<f64>,
    loaded: bool,
    pending_subtitles: Vec<SubtitleTrack>,
}

#[derive(Debug, PartialEq)]
enum Reaction {
    Emit(EngineEvent),
    AddSubtitles(Vec<SubtitleTrack>),
}

/// Folds one IPC message into `state` and says what to do about it.
fn interpret(message: &Value, state: &mut MpvState) -> Vec<Reaction> {
    let Some(event) = message.get("event").and_then(Value::as_str) else {
        match message.get("error").and_then(Value::as_str) {
            Some("success") | None => {}
            Some(error) => debug!(error, "player rejected a command"),
        }
        return Vec::new();
    };

    match event {
        "property-change" => {
            let data = message.get("data");
            match message.get("name").and_then(Value::as_str) {
                Some("time-pos") => {
                    // Until `file-loaded` the position still belongs to the
                    // previous file.
                    let Some(time) = data.and_then(Value::as_f64).filter(|_| state.loaded) else {
                        return Vec::new();
                    };
                    state.time = time;
                    let due = state
                        .reported_time
                        .is_none_or(|last| (time - last).abs() >= TIME_STEP);
                    if due {
                        state.reported_time = Some(time);
                        return vec![Reaction::Emit(EngineEvent::TimeUpdate(time))];
                    }
                }
                Some("duration") => state.duration = data.and_then(Value::as_f64),
                Some("pause") => {
                    if let Some(paused) = data.and_then(Value::as_bool) {
                        state.paused = paused;
                    }
                }
                _ => {}
            }
            Vec::new()
        }
        "file-loaded" => {
            state.loaded = true;
            let mut reactions = Vec::new();
            if !state.pending_subtitles.is_empty() {
                reactions.push(Reaction::AddSubtitles(std::mem::take(
                    &mut state.pending_subtitles,
                )));
            }
            reactions.push(Reaction::Emit(EngineEvent::MetadataLoaded));
            reactions
        }
        "end-file" if message.get("reason").and_then(Value::as_str) == Some("eof") => {
            vec![Reaction::Emit(EngineEvent::Ended)]
        }
        _ => Vec::new(),
    }
}

async fn read_events(
    read: OwnedReadHalf,
    writer: Rc<Mutex<OwnedWriteHalf>>,
    state: Rc<RefCell<MpvState>>,
    events: EngineEvents,
) {
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "player IPC read failed");
                break;
            }
        };
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let reactions = interpret(&message, &mut state.borrow_mut());
        for reaction in reactions {
            match reaction {
                Reaction::Emit(event) => {
                    if !events.emit(event) {
                        return;
                    }
                }
                Reaction::AddSubtitles(tracks) => {
                    for track in &tracks {
                        if let Err(err) = send(&writer, sub_add(track)).await {
                            warn!(error = %err, language = %track.language, "failed to add subtitle");
                        }
                    }
                }
            }
        }
    }
    events.emit(EngineEvent::Exited);
}

/// A running mpv process controlled over its JSON IPC socket.
#[derive(Debug)]
pub struct MpvEngine {
    child: Child,
    writer: Rc<Mutex<OwnedWriteHalf>>,
    state: Rc<RefCell<MpvState>>,
    reader: JoinHandle<()>,
    socket: PathBuf,
}

impl MpvEngine {
    async fn command(&self, command: Value) -> Result<()> {
        send(&self.writer, command).await
    }
}

impl MediaEngine for MpvEngine {
    async fn load_source(&mut self, url: &str) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            state.loaded = false;
            state.time = 0.0;
            state.reported_time = None;
            state.duration = None;
            state.pending_subtitles.clear();
        }
        self.command(json!(["loadfile", url, "replace"])).await
    }

    async fn add_subtitle_track(&mut self, track: SubtitleTrack) -> Result<()> {
        if !self.state.borrow().loaded {
            self.state.borrow_mut().pending_subtitles.push(track);
            return Ok(());
        }
        self.command(sub_add(&track)).await
    }

    async fn play(&mut self) -> Result<()> {
        self.state.borrow_mut().paused = false;
        self.command(json!(["set_property", "pause", false])).await
    }

    async fn pause(&mut self) -> Result<()> {
        self.state.borrow_mut().paused = true;
        self.command(json!(["set_property", "pause", true])).await
    }

    fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    async fn seek(&mut self, offset: f64) -> Result<()> {
        self.state.borrow_mut().time = offset;
        self.command(json!(["seek", offset, "absolute"])).await
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().time
    }

    fn duration(&self) -> Option<f64> {
        self.state.borrow().duration
    }

    async fn toggle_fullscreen(&mut self) -> Result<()> {
        self.command(json!(["cycle", "fullscreen"])).await
    }

    async fn dispose(&mut self) -> Result<()> {
        self.reader.abort();
        if let Err(err) = self.command(json!(["quit"])).await {
            debug!(error = %err, "player already gone");
        }
        match timeout(QUIT_GRACE, self.child.wait()).await {
            Ok(status) => {
                status.context("failed to wait for player")?;
            }
            Err(_) => {
                warn!("player ignored quit, killing it");
                self.child.kill().await.context("failed to kill player")?;
            }
        }
        let _ = std::fs::remove_file(&self.socket);
        Ok(())
    }
}

impl Drop for MpvEngine {
    fn drop(&mut self) {
        self.reader.abort();
        let _ = std::fs::remove_file(&self.socket);
    }
}
