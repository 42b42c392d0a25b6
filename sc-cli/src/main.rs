//! StoreChat CLI - command-line client for storefront customer chat.
//!
//! Joins chat rooms over the real-time socket, sends messages, marks rooms
//! read, and prints room history from the REST API. Useful for support
//! staff working from a terminal, scripting, and debugging the socket layer.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use sc_core::config::{AppConfig, ConfigHandle};
use sc_core::error::ScResult;
use sc_core::logging;

/// StoreChat - customer chat client.
#[derive(Parser)]
#[command(
    name = "storechat",
    version,
    about = "StoreChat customer chat CLI",
    long_about = "A command-line client for the StoreChat real-time chat server.\n\
                   Join rooms, send and receive messages, and browse room history."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Join rooms and print incoming messages until Ctrl+C.
    Listen {
        /// Room id to join (repeatable).
        #[arg(short, long = "room", required = true)]
        rooms: Vec<String>,
    },
    /// Send a message to a room.
    Send {
        /// Room id.
        #[arg(short, long)]
        room: String,
        /// Message text.
        #[arg(short, long)]
        text: String,
        /// Seconds to wait for the server to relay the message back.
        #[arg(long, default_value = "5")]
        wait: u64,
    },
    /// Mark a room as read.
    Read {
        /// Room id.
        #[arg(short, long)]
        room: String,
        /// Use the REST endpoint instead of the socket.
        #[arg(long)]
        rest: bool,
    },
    /// Show a room's message history.
    History {
        /// Room id.
        #[arg(short, long)]
        room: String,
        /// Number of most recent messages to show.
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// View and modify configuration.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> ScResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) if path.exists() => AppConfig::load_from_file(path)?,
        Some(_) => AppConfig::default(),
        None => AppConfig::load_default()?,
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let log_dir = config.effective_log_dir()?;
    let _guard = logging::init_logging(&log_level, &log_dir, config.logging.json_output)?;

    let config_handle = ConfigHandle::new(config, cli.config.clone());

    info!("StoreChat CLI v{}", sc_core::constants::APP_VERSION);
    debug!("logging to {}", log_dir.display());

    // Dispatch to command handlers
    match cli.command {
        Commands::Listen { rooms } => commands::listen::run(config_handle, rooms, cli.format).await,
        Commands::Send { room, text, wait } => {
            commands::send::run(config_handle, room, text, wait, cli.format).await
        }
        Commands::Read { room, rest } => {
            commands::read::run(config_handle, room, rest, cli.format).await
        }
        Commands::History { room, limit } => {
            commands::history::run(config_handle, room, limit, cli.format).await
        }
        Commands::Config { action } => {
            commands::config::run(config_handle, action, cli.format).await
        }
    }
}
