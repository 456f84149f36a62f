//! Burner CLI
//!
//! Terminal client for Burner chat rooms. Joins a room on the coordinator,
//! prints what happens there and sends every line typed as a message.

use std::io::Write;
use std::process::ExitCode;

use burner_core::config::ClientConfig;
use burner_core::events::StdoutSink;
use burner_core::{DisplayName, RoomId, RoomSession};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing_subscriber::EnvFilter;

mod room;

/// Burner - anonymous, ephemeral chat rooms
///
/// Join a room by id, or create a fresh one with --new. Nothing is stored;
/// the room disappears when everyone leaves.
#[derive(Parser, Debug)]
#[command(name = "burner")]
#[command(version, about, long_about = None)]
struct Args {
    /// Room id to join
    #[arg(required_unless_present = "new", conflicts_with = "new")]
    room: Option<String>,

    /// Create a new room with a generated id
    #[arg(long)]
    new: bool,

    /// Display name (prompted for when omitted)
    #[arg(short, long)]
    name: Option<String>,

    /// Coordinator WebSocket URL
    #[arg(short, long, env = "BURNER_SERVER")]
    server: Option<String>,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Maximum consecutive reconnection attempts
    #[arg(long)]
    reconnect_attempts: Option<u32>,

    /// Delay before the first reconnection attempt (ms)
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Upper bound for the reconnection delay (ms)
    #[arg(long)]
    reconnect_delay_max_ms: Option<u64>,

    /// Timeout for a single connection attempt (ms)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Give up on the first connection failure
    #[arg(long)]
    no_reconnect: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Layer command-line flags over a loaded configuration
    fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        let reconnect = &mut config.reconnect;
        if let Some(attempts) = self.reconnect_attempts {
            reconnect.attempts = attempts;
        }
        if let Some(delay) = self.reconnect_delay_ms {
            reconnect.base_delay_ms = delay;
        }
        if let Some(max) = self.reconnect_delay_max_ms {
            reconnect.max_delay_ms = max;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            reconnect.connect_timeout_ms = timeout;
        }
        if self.no_reconnect {
            reconnect.enabled = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr and stay quiet unless asked for
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match ClientConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ClientConfig::default(),
    };
    let config = args.apply(config);

    let room_id = match &args.room {
        Some(raw) => match RoomId::parse(raw) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => RoomId::generate(),
    };
    if args.new {
        println!("Created room {room_id}. Share this id to invite others.");
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let name = match &args.name {
        Some(raw) => match DisplayName::parse(raw) {
            Ok(name) => name,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => match prompt_name(&mut input).await {
            Some(name) => name,
            None => return ExitCode::SUCCESS,
        },
    };

    let session = match RoomSession::websocket(room_id.as_str(), &config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("joining {} on {}", room_id, config.server_url);

    let json_output = matches!(args.format, OutputFormat::Json);
    let sink = StdoutSink::new(json_output);

    match room::run_room(session, name, &mut input, sink).await {
        Ok(room::RoomExit::Left) => ExitCode::SUCCESS,
        Ok(room::RoomExit::Failed) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Ask for a display name until a valid one is entered
///
/// Returns `None` when input ends first.
async fn prompt_name<R>(input: &mut Lines<R>) -> Option<DisplayName>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        print!("Enter your name: ");
        let _ = std::io::stdout().flush();

        match input.next_line().await {
            Ok(Some(line)) => match DisplayName::parse(&line) {
                Ok(name) => return Some(name),
                Err(e) => println!("{e}"),
            },
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                return None;
            }
        }
    }
}
