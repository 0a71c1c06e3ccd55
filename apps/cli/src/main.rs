use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use atv_core::credentials::{self, PairingRecord};
use atv_core::protocol::{KeyCommand, QueueRequest};
use atv_core::transport::{Connector, Discovery, Pairing};
use atv_core::{ClientConfig, DeviceEvent, EventKind, NetworkBackend, SessionOrchestrator, ops};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Remote control for network media players", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pair with a device and save the credentials
    Pair {
        /// Seconds to wait for a device to answer
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Send one remote key
    Command {
        /// up, down, left, right, menu, play, pause, next, previous,
        /// suspend, select, tv or longtv
        #[arg(value_parser = parse_key)]
        key: KeyCommand,

        #[arg(long)]
        credentials: Option<String>,
    },

    /// Print now playing updates until interrupted
    State {
        #[arg(long)]
        credentials: Option<String>,
    },

    /// Print the playback queue
    Queue {
        #[arg(long)]
        credentials: Option<String>,

        #[arg(long, default_value_t = 0)]
        location: u32,

        #[arg(long, default_value_t = 1)]
        length: u32,

        /// Include item metadata
        #[arg(long)]
        metadata: bool,

        /// Include lyrics
        #[arg(long)]
        lyrics: bool,

        /// Include language options
        #[arg(long)]
        languages: bool,
    },

    /// Print every protocol message until interrupted
    Messages {
        #[arg(long)]
        credentials: Option<String>,
    },

    /// Enter every restriction passcode from 0300 up
    Guess,
}

fn parse_key(s: &str) -> Result<KeyCommand, String> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = execute(cli) {
        error!("{}", e);
        debug!("{:?}", e);
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let record = PairingRecord::load_lenient(&config.pairing_file);

    let backend = NetworkBackend::new(config.clone(), prompt_pin);
    let orchestrator = SessionOrchestrator::new(backend, config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(cli.command, &orchestrator, record.as_ref(), &mut out)
}

fn prompt_pin() -> io::Result<String> {
    eprint!("Enter the 4-digit pin that appears on your device: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Dispatch one subcommand. Credentials are resolved before any network
/// traffic, so a missing pairing fails without touching the LAN.
fn run<B>(
    command: Command,
    orchestrator: &SessionOrchestrator<B>,
    record: Option<&PairingRecord>,
    out: &mut dyn Write,
) -> Result<()>
where
    B: Discovery + Pairing + Connector,
{
    match command {
        Command::Pair { timeout } => {
            let credential = orchestrator.pair(timeout.map(Duration::from_secs))?;
            let path = &orchestrator.config().pairing_file;
            PairingRecord::from_credential(&credential)
                .save(path)
                .with_context(|| format!("Failed to save credentials to {}", path.display()))?;
            info!(path = %path.display(), device_id = %credential.device_id, "Credentials saved");
            Ok(())
        }
        Command::Command { key, credentials } => {
            let credential = credentials::resolve(credentials.as_deref(), record)?;
            let observer = orchestrator.observer();
            orchestrator.run(&credential, |session| {
                ops::send_command(session, key, observer.as_ref())
            })?;
            writeln!(out, "Success!")?;
            Ok(())
        }
        Command::State { credentials } => {
            let credential = credentials::resolve(credentials.as_deref(), record)?;
            orchestrator.run(&credential, |session| {
                ops::stream_events(session, EventKind::NowPlaying, |event| {
                    print_now_playing(out, event)
                })
            })
        }
        Command::Queue {
            credentials,
            location,
            length,
            metadata,
            lyrics,
            languages,
        } => {
            let credential = credentials::resolve(credentials.as_deref(), record)?;
            let request = QueueRequest {
                location,
                length,
                include_metadata: metadata,
                include_lyrics: lyrics,
                include_language_options: languages,
            };
            let response =
                orchestrator.run(&credential, |session| ops::query_queue(session, &request))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;
            Ok(())
        }
        Command::Messages { credentials } => {
            let credential = credentials::resolve(credentials.as_deref(), record)?;
            orchestrator.run(&credential, |session| {
                ops::stream_events(session, EventKind::Message, |event| print_message(out, event))
            })
        }
        Command::Guess => {
            let credential = credentials::resolve(None, record)?;
            let observer = orchestrator.observer();
            let sent = orchestrator.run(&credential, |session| ops::guess(session, observer))?;
            info!(attempts = sent, "Every code entered");
            Ok(())
        }
    }
}

fn print_now_playing(out: &mut dyn Write, event: &DeviceEvent) -> Result<()> {
    if let DeviceEvent::NowPlaying(info) = event {
        writeln!(out, "{info}")?;
        out.flush()?;
    }
    Ok(())
}

fn print_message(out: &mut dyn Write, event: &DeviceEvent) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string(&event.to_message())?)?;
    out.flush()?;
    Ok(())
}
