//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod exchange;
pub mod ingest;
pub mod memory;
pub mod remote;
pub mod sessions;
pub mod settings;
pub mod status;


use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::core::app::AppContext;
use crate::core::config::Config;
use crate::utils::logging::TranscriptLog;

/// Filter for diagnostics, checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "AIR4_LOG";

#[derive(Parser)]
#[command(name = "air4")]
#[command(version = version_string())]
#[command(about = "A local-first chat client for the AIr4 backend")]
#[command(
    long_about = "AIr4 talks to a local inference and retrieval backend, keeps every \
conversation on disk, and streams replies as they arrive. When the backend is unreachable \
it answers with an offline notice instead of failing.\n\n\
Configuration:\n\
  config.toml in the platform config directory (base_url, paths, timeouts)\n\n\
Environment Variables:\n\
  AIR4_BASE_URL     Backend base URL (overrides config.toml)\n\
  AIR4_LOG          Diagnostic log filter (e.g. debug, air4=trace)\n\n\
Chat commands:\n\
  /new              Start a new session\n\
  /sessions         List sessions\n\
  /log <filename>   Enable transcript logging to a file\n\
  /log              Toggle transcript logging pause/resume\n\
  /dump <filename>  Write the current session as a transcript\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Append committed exchanges to a transcript file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,

    /// Backend base URL for this invocation
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Session to continue (defaults to the most recent)
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Send a single message and stream the reply to stdout
    Say {
        /// Message text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
        /// Session to post into (defaults to the most recent)
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Manage local sessions
    Sessions {
        #[command(subcommand)]
        command: Option<SessionCommands>,
    },
    /// Probe the backend and print a status summary
    Status,
    /// Search or add stored memories
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// Upload files for ingestion and inspect the queue
    Ingest {
        #[command(subcommand)]
        command: IngestCommands,
    },
    /// Set a preference
    Set {
        /// Preference key
        key: String,
        /// New value (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Show preferences and configuration
    Get {
        /// Show a single preference
        key: Option<String>,
    },
    /// Inspect sessions held by the backend
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SessionCommands {
    /// List sessions grouped by recency (default)
    List,
    /// Create a new session
    New {
        /// Title (defaults to "New Session")
        title: Option<String>,
    },
    /// Rename a session
    Rename {
        id: String,
        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,
    },
    /// Delete a session
    Delete { id: String },
    /// Delete every session and start over with a fresh one
    ClearAll,
    /// Copy a session under a new id
    Duplicate { id: String },
    /// Write a session to air4_session_<id>.json
    Export {
        id: String,
        /// Output directory (defaults to the current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum MemoryCommands {
    /// Search memories (an empty query lists recent ones)
    Search {
        query: Vec<String>,
        /// Maximum number of results
        #[arg(short)]
        k: Option<usize>,
    },
    /// Store a note
    Add {
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum IngestCommands {
    /// Upload a file
    File {
        path: PathBuf,
        /// Tag recorded with the upload
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Show files still being processed
    Queue,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum RemoteCommands {
    /// List sessions known to the backend
    Sessions,
    /// Clear a session's history on the backend
    Clear { id: String },
}

fn version_string() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("VERGEN_GIT_DESCRIBE"),
        ", built ",
        env!("VERGEN_BUILD_DATE"),
        ")"
    )
}

/// Install the diagnostics subscriber. Output goes to stderr so replies on
/// stdout stay clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut config = Config::load()?;
    if let Some(base_url) = args.base_url {
        config.base_url = Some(base_url);
    }
    debug!(base_url = %config.base_url(), "Configuration loaded");

    let ctx = AppContext::from_config(config)?;
    let mut transcript = TranscriptLog::new(args.log)?;

    let result = match args.command.unwrap_or(Commands::Chat { session: None }) {
        Commands::Chat { session } => chat::run_chat(&ctx, session, &mut transcript).await,
        Commands::Say { prompt, session } => {
            exchange::run_say(&ctx, prompt, session, &transcript).await
        }
        Commands::Sessions { command } => {
            sessions::run_sessions(&ctx, command.unwrap_or(SessionCommands::List))
        }
        Commands::Status => status::run_status(&ctx).await,
        Commands::Memory { command } => memory::run_memory(&ctx, command).await,
        Commands::Ingest { command } => ingest::run_ingest(&ctx, command).await,
        Commands::Set { key, value } => settings::run_set(&ctx, &key, &value.join(" ")),
        Commands::Get { key } => settings::run_get(&ctx, key.as_deref()),
        Commands::Remote { command } => remote::run_remote(&ctx, command).await,
    };

    if let Err(err) = ctx.sessions().flush() {
        eprintln!("⚠️  Sessions could not be saved: {err}");
    }
    result
}
