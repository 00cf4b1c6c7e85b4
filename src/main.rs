//! # Policy Assistant CLI (`policy-assistant`)
//!
//! Answers questions about a directory of company policy documents.
//!
//! ## Usage
//!
//! ```bash
//! policy-assistant --config ./config/policy.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `index [--force]` | Build the vector index, or confirm the current one is up to date |
//! | `search "<query>"` | Show the most similar policy passages |
//! | `ask "<question>"` | Answer a question with citations |
//! | `health` | Report credential and index status |
//!
//! Set `RUST_LOG=info` (or `debug`) to see pipeline logs on stderr.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use policy_assistant::commands;
use policy_assistant::config;
use policy_assistant::progress::ProgressMode;

/// Policy Assistant: grounded answers from your company policy documents.
#[derive(Parser)]
#[command(name = "policy-assistant", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/policy.toml")]
    config: PathBuf,

    /// Build progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index if the policy corpus changed.
    ///
    /// Fingerprints the corpus and reuses the persisted index when nothing
    /// changed. Otherwise chunks and embeds every document into a fresh
    /// collection.
    Index {
        /// Rebuild even if the corpus is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Retrieve the policy passages most similar to a query.
    Search {
        query: String,

        /// Number of passages to return (default: retrieval.k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a question using only the policy documents.
    Ask {
        question: String,

        /// Number of passages to retrieve as context (default: retrieval.k).
        #[arg(long)]
        k: Option<usize>,

        /// Sampling temperature (default: llm.temperature).
        #[arg(long)]
        temperature: Option<f32>,

        /// Print the answer record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report credential and vector index status.
    Health {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Index { force } => {
            commands::run_index(&cfg, force, progress).await?;
        }
        Commands::Search { query, k } => {
            commands::run_search(&cfg, &query, k, progress).await?;
        }
        Commands::Ask {
            question,
            k,
            temperature,
            json,
        } => {
            commands::run_ask(&cfg, &question, k, temperature, json, progress).await?;
        }
        Commands::Health { json } => {
            commands::run_health(&cfg, json).await?;
        }
    }

    Ok(())
}
