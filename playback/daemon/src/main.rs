//! Playback Daemon - Console Front End for the Playback Controller
//!
//! Drives a [`PlaybackController`] over two simulated surfaces from line
//! commands on stdin, printing every state change. Useful for exercising
//! clip configuration and timing without a browser.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (armored skin, config from ~/.config/p69real/playback.toml)
//! playback-daemon
//!
//! # Start in the normal skin with a short idle timeout
//! playback-daemon --initial-mode normal --idle-timeout-ms 1000
//!
//! # Machine-readable snapshots
//! playback-daemon --json
//!
//! # Verbose logging
//! RUST_LOG=debug playback-daemon
//! ```
//!
//! # Commands
//!
//! - `speak` / `quiet`: start or stop the speaking loop
//! - `mode <armored|normal>`: switch skins immediately
//! - `poke`: report user activity
//! - `status`: print the current state
//! - `pass <phrase>`: answer a passphrase prompt
//! - `quit`: exit
//! - anything else: `チェンジ` / `キャストオフ` switch skins through the
//!   transition reply, other text is "spoken" for a moment
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl+C): graceful shutdown

mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use playback_core::{
    default_config_path, load_config_from_path, ConfigOverrides, ControllerHandle,
    ControllerSnapshot, Mode, ModeCommand, ModeSwitchDispatcher, PlaybackController,
    SimulatedBehavior, SimulatedSurface, SwitchOutcome,
};

use console::Input;

/// Speaking time per character of free text
const SPEECH_PER_CHAR: Duration = Duration::from_millis(80);

/// Playback Daemon - console driver for the P69REAL character controller
#[derive(Parser, Debug)]
#[command(name = "playback-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "PLAYBACK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Idle timeout override in milliseconds
    #[arg(long, value_name = "MS")]
    idle_timeout_ms: Option<u64>,

    /// Settle delay override in milliseconds
    #[arg(long, value_name = "MS")]
    settle_delay_ms: Option<u64>,

    /// Skin shown at startup
    #[arg(short = 'm', long, default_value = "armored", value_name = "MODE")]
    initial_mode: Mode,

    /// Length of every simulated one-shot clip in milliseconds
    #[arg(long, default_value_t = 2500, value_name = "MS")]
    one_shot_ms: u64,

    /// Print snapshots as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("playback_daemon=info".parse()?)
                .add_directive("playback_core=info".parse()?),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Starting Playback Daemon");

    let mut config = load_config_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load playback configuration")?;
    let mut overrides = ConfigOverrides::new();
    if let Some(ms) = args.idle_timeout_ms {
        overrides = overrides.with_idle_timeout_ms(ms);
    }
    if let Some(ms) = args.settle_delay_ms {
        overrides = overrides.with_settle_delay_ms(ms);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line override")?;
    info!(source = %config.source(), idle_timeout = ?config.idle_timeout, "Configuration loaded");

    let clips = config.clip_set();
    for (mode, role, clip) in clips.all_paths() {
        tracing::debug!(mode = %mode, role = %role, clip = %clip, "Clip configured");
    }

    let behavior = simulated_behavior(&clips, Duration::from_millis(args.one_shot_ms));
    let (controller, signals) = PlaybackController::new(
        clips,
        config.controller_config(),
        SimulatedSurface::with_behavior("primary", behavior.clone()),
        SimulatedSurface::with_behavior("secondary", behavior),
    );
    let (handle, actor) = ControllerHandle::spawn(controller, signals);

    let printer = tokio::spawn(print_snapshots(handle.clone(), args.json));

    if let Err(e) = handle.initialize(args.initial_mode).await {
        warn!(error = %e, "Initial clip unavailable; continuing without picture");
    }

    let mut dispatcher = ModeSwitchDispatcher::new(handle.clone());
    if let Some(ref passphrase) = config.castoff_passphrase {
        dispatcher = dispatcher.with_passphrase(passphrase.clone());
    }

    tokio::select! {
        result = run_console(handle.clone(), dispatcher, args.json) => {
            result?;
            info!("Console closed, shutting down");
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    handle.shutdown().await;
    printer.abort();
    if let Err(e) = actor.await {
        warn!(error = %e, "Playback actor ended abnormally");
    }
    info!("Playback Daemon stopped");
    Ok(())
}

/// Give every one-shot clip a finite length so replies and idle actions end
fn simulated_behavior(clips: &playback_core::ClipSet, one_shot: Duration) -> SimulatedBehavior {
    let mut behavior = SimulatedBehavior::default();
    for mode in [Mode::Normal, Mode::Armored] {
        let set = clips.for_mode(mode);
        for clip in [&set.idle_action_1, &set.idle_action_2, &set.transition_reply] {
            behavior.clip_durations.insert(clip.clone(), one_shot);
        }
    }
    behavior
}

fn render(snapshot: &ControllerSnapshot, json: bool) -> String {
    if json {
        serde_json::to_string(snapshot).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    } else {
        console::describe(snapshot)
    }
}

async fn print_snapshots(handle: ControllerHandle, json: bool) {
    let mut rx = handle.subscribe();
    let mut last = None;
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        // Skip republished identical states
        if last.as_ref() == Some(&snapshot) {
            continue;
        }
        println!("{}", render(&snapshot, json));
        last = Some(snapshot);
    }
}

async fn run_console(
    handle: ControllerHandle,
    dispatcher: ModeSwitchDispatcher,
    json: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let pending: Arc<Mutex<Option<ModeCommand>>> = Arc::new(Mutex::new(None));

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let Some(input) = Input::parse(&line) else {
            continue;
        };
        handle.user_activity();

        match input {
            Input::Quit => break,
            Input::Speak => report(handle.start_speaking().await),
            Input::Quiet => report(handle.stop_speaking().await),
            Input::SetMode(mode) => report(handle.set_mode(mode).await),
            Input::Poke => {}
            Input::Status => println!("{}", render(&handle.snapshot(), json)),
            Input::Invalid(message) => eprintln!("{message}"),
            Input::Passphrase(phrase) => {
                let Some(command) = pending.lock().await.take() else {
                    eprintln!("no passphrase requested");
                    continue;
                };
                spawn_dispatch(&dispatcher, &pending, command, Some(phrase));
            }
            Input::Text(text) => match ModeCommand::detect(&text) {
                Some(command) => spawn_dispatch(&dispatcher, &pending, command, None),
                None => {
                    let handle = handle.clone();
                    let length = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
                    tokio::spawn(async move {
                        let talk = tokio::time::sleep(SPEECH_PER_CHAR * length);
                        report(handle.speak_while(talk).await);
                    });
                }
            },
        }
    }
    Ok(())
}

/// Run a mode command off the console loop; replies take seconds to play
fn spawn_dispatch(
    dispatcher: &ModeSwitchDispatcher,
    pending: &Arc<Mutex<Option<ModeCommand>>>,
    command: ModeCommand,
    passphrase: Option<String>,
) {
    let dispatcher = dispatcher.clone();
    let pending = Arc::clone(pending);
    tokio::spawn(async move {
        match dispatcher.dispatch(command, passphrase.as_deref()).await {
            Ok(SwitchOutcome::PassphraseRequired) => {
                *pending.lock().await = Some(command);
                eprintln!("passphrase required: pass <phrase>");
            }
            Ok(outcome) => eprintln!("{outcome}"),
            Err(e) => eprintln!("error: {e}"),
        }
    });
}

fn report<T>(result: Result<T, playback_core::PlaybackError>) {
    if let Err(e) = result {
        eprintln!("error: {e}");
    }
}
