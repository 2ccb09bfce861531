//! `Streamroster` — live-stream viewer roster collector.
//!
//! Connects to a companion feed server, collects unique viewer names from
//! the chat stream, and prints the deduplicated roster to stdout whenever
//! it changes. Status lines go to stderr.
//!
//! ```bash
//! # Connect to an already-running feed server on port 8080
//! cargo run --bin streamroster
//!
//! # Spawn the companion server too and start with sanitized names
//! cargo run --bin streamroster -- --backend "node server.js" --policy sanitized
//!
//! # Or via environment variables
//! FEED_PORT=9000 cargo run --bin streamroster
//! ```
//!
//! Runtime commands on stdin: `policy <unsanitized|sanitized|first-word>`,
//! `clear`, `retry`, `connect`, `disconnect`, `quit`.

use std::io;
use std::path::Path;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use streamroster::backend;
use streamroster::config::{CliArgs, ClientConfig};
use streamroster::engine::{self, EngineCommand, EngineEvent};
use streamroster::roster::{DisplayPolicy, RosterLine};
use streamroster::supervisor::Severity;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("streamroster starting");

    // Spawn the companion server first, if one is configured; the
    // supervisor only connects once the backend answers its health check.
    let backend_handle = match config.to_backend_config() {
        Some(backend_config) => match backend::launch(&backend_config, config.port).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("Failed to start backend: {e}");
                return Ok(());
            }
        },
        None => None,
    };

    let (cmd_tx, evt_rx) = engine::spawn_engine(config.to_engine_config());

    let result = run(&cmd_tx, evt_rx).await;

    if let Some(handle) = backend_handle {
        handle.shutdown().await;
    }

    tracing::info!("streamroster exiting");
    result
}

/// Initialize logging to stderr, or to a file when `--log-file` is given.
///
/// Returns a [`WorkerGuard`] for the file writer that must be held until
/// shutdown so buffered entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if let Some(log_path) = file_path {
        let log_dir = log_path.parent()?;
        let file_name = log_path.file_name()?.to_str()?;
        let file_appender = tracing_appender::rolling::never(log_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_env_filter(env_filter)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        None
    }
}

/// Main event loop: drain engine events, accept stdin commands.
async fn run(
    cmd_tx: &mpsc::Sender<EngineCommand>,
    mut evt_rx: mpsc::Receiver<EngineEvent>,
) -> io::Result<()> {
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = evt_rx.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            line = stdin.next_line() => match line? {
                Some(line) => {
                    if !dispatch_command(cmd_tx, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(EngineCommand::Shutdown).await;
                break;
            }
        }
    }
    Ok(())
}

/// Print an engine event; the roster goes to stdout, everything else to
/// stderr.
fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Status { text, severity } => {
            let tag = match severity {
                Severity::Info => "info",
                Severity::Success => "ok",
                Severity::Warning => "warn",
                Severity::Error => "error",
            };
            eprintln!("[{tag}] {text}");
        }
        EngineEvent::RosterChanged { roster } => {
            println!("{}", format_roster(roster));
        }
        EngineEvent::ViewerCount { platform, count } => {
            eprintln!("[info] {platform} viewers: {count}");
        }
    }
}

/// Join the roster the way the viewer list displays it.
fn format_roster(roster: &[RosterLine]) -> String {
    roster
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Handle one stdin command line. Returns `false` to quit.
async fn dispatch_command(cmd_tx: &mpsc::Sender<EngineCommand>, line: &str) -> bool {
    let command = match line {
        "" => return true,
        "quit" | "exit" => {
            let _ = cmd_tx.send(EngineCommand::Shutdown).await;
            return false;
        }
        "clear" => EngineCommand::ClearRoster,
        "retry" => EngineCommand::Retry,
        "connect" => EngineCommand::Connect,
        "disconnect" => EngineCommand::Disconnect,
        _ => match line.strip_prefix("policy ").map(str::trim) {
            Some("unsanitized") => EngineCommand::SetPolicy(DisplayPolicy::Unsanitized),
            Some("sanitized") => EngineCommand::SetPolicy(DisplayPolicy::Sanitized),
            Some("first-word") => EngineCommand::SetPolicy(DisplayPolicy::FirstWord),
            _ => {
                eprintln!(
                    "commands: policy <unsanitized|sanitized|first-word>, clear, retry, \
                     connect, disconnect, quit"
                );
                return true;
            }
        },
    };

    if cmd_tx.send(command).await.is_err() {
        eprintln!("[error] engine stopped");
        return false;
    }
    true
}
