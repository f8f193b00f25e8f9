//! # Context FAQ CLI (`faq`)
//!
//! ## Usage
//!
//! ```bash
//! faq --config ./config/faq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `faq check` | Load config and knowledge base, embed everything, report |
//! | `faq ask "<text>"` | Answer a single question |
//! | `faq chat` | Interactive conversation on stdin/stdout |
//! | `faq snapshot` | Rebuild the embedding snapshot |
//! | `faq serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Ask in the Gold Card context directly
//! faq ask "What is the annual fee?" --context GOLDCARD
//!
//! # Machine-readable output
//! faq ask "opening hours" --json
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to override the level.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use context_faq::{ask, check, config, server};

/// Context FAQ: answer questions from a curated knowledge base, keeping
/// track of what each conversation is about.
#[derive(Parser)]
#[command(
    name = "faq",
    about = "Context-aware FAQ matcher",
    version,
    long_about = "Answers incoming messages with the closest known question from a curated \
    knowledge base, searching only the conversation's current context. Contexts switch on \
    trigger phrases and fall back to the default after a period of silence."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/faq.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and knowledge base.
    ///
    /// Embeds every context exactly as `serve` would, so provider
    /// problems show up here too.
    Check,

    /// Answer a single question.
    Ask {
        /// The question text.
        text: String,

        /// Start in this context instead of the default.
        #[arg(long)]
        context: Option<String>,

        /// Print the full match result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Hold one conversation on stdin/stdout. `/quit` or EOF ends it.
    Chat,

    /// Re-embed the knowledge base and rewrite the snapshot file.
    Snapshot,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Check => check::run_check(&cfg).await?,
        Commands::Ask {
            text,
            context,
            json,
        } => ask::run_ask(&cfg, &text, context.as_deref(), json).await?,
        Commands::Chat => ask::run_chat(&cfg).await?,
        Commands::Snapshot => check::run_snapshot(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
