//! # Subnet Copilot CLI (`copilot`)
//!
//! ## Usage
//!
//! ```bash
//! copilot --config ./config/copilot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `copilot index` | Build the semantic index, or skip if one is persisted |
//! | `copilot index --rebuild` | Delete the persisted index and build from scratch |
//! | `copilot search "<text>"` | Show the chunks retrieval would pick |
//! | `copilot ask "<question>"` | Answer one question, print `{reply, update}` |
//! | `copilot serve` | Start the HTTP server (`POST /chat`) |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use subnet_copilot::{ask, config, index_cmd, logging, server};

/// Subnet Copilot: answers subnet configuration questions from the docs and
/// proposes config merge-patches.
#[derive(Parser)]
#[command(
    name = "copilot",
    about = "Retrieval-grounded assistant for subnet configuration",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/copilot.toml`. See `config/copilot.example.toml`.
    #[arg(long, global = true, default_value = "./config/copilot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the semantic index from the corpus.
    ///
    /// Idempotent: when a complete index already exists at `[index].path`
    /// nothing is embedded.
    Index {
        /// Delete the persisted index first.
        #[arg(long)]
        rebuild: bool,
    },

    /// Query the persisted index and print the nearest chunks.
    Search {
        /// Search text.
        query: String,

        /// Number of results (defaults to `[retrieval].k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single question and print the structured result as JSON.
    Ask {
        /// The question.
        question: String,

        /// File containing the current configuration as a JSON object.
        #[arg(long)]
        config_json: Option<PathBuf>,

        /// File containing the previous chat history as plain text.
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Index { rebuild } => {
            index_cmd::run_index(&cfg, rebuild).await?;
        }
        Commands::Search { query, k } => {
            index_cmd::run_search(&cfg, &query, k).await?;
        }
        Commands::Ask {
            question,
            config_json,
            history,
        } => {
            ask::run_ask(&cfg, &question, config_json.as_deref(), history.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
