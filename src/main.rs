//! # docgate CLI
//!
//! ## Usage
//!
//! ```bash
//! docgate --config ./config/docgate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docgate serve` | Start the local HTTP front |
//! | `docgate invoke <file\|->` | Dispatch one raw event and print the result |
//! | `docgate routes` | List registered resource templates |
//!
//! ## Examples
//!
//! ```bash
//! # Replay a captured API event
//! docgate invoke ./events/get-document.json
//!
//! # Drain a queued batch from stdin
//! cat batch.json | docgate invoke -
//!
//! # Serve on a different address
//! docgate serve --bind 0.0.0.0:9000
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docgate::config;
use docgate::dispatch::{Dispatcher, Invocation};
use docgate::handlers::builtin_registry;
use docgate::server;
use docgate::services::Services;

/// docgate: a single-entrypoint document API dispatcher.
#[derive(Parser)]
#[command(name = "docgate", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the local HTTP front.
    Serve {
        /// Overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Dispatch one raw event and print the envelope.
    ///
    /// Batches print the number of dispatched messages instead.
    Invoke {
        /// Event file, or `-` for stdin.
        input: String,
    },

    /// List registered resource templates.
    Routes,
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read event file: {}", input))
    }
}

fn build_dispatcher(cfg: config::Config) -> anyhow::Result<Arc<Dispatcher>> {
    let services = Arc::new(Services::from_config(cfg)?);
    Ok(Arc::new(Dispatcher::new(builtin_registry()?, services)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Routes => {
            for resource in builtin_registry()?.resources() {
                println!("{}", resource);
            }
        }
        Commands::Serve { bind } => {
            let cfg = config::load_config(&cli.config)?;
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            server::run_server(build_dispatcher(cfg)?, &bind).await?;
        }
        Commands::Invoke { input } => {
            let cfg = config::load_config(&cli.config)?;
            let raw = read_input(&input)?;
            match build_dispatcher(cfg)?.handle(&raw).await? {
                Invocation::Response(envelope) => {
                    println!("{}", serde_json::to_string_pretty(&envelope)?);
                }
                Invocation::Batch { dispatched } => {
                    println!("dispatched {} queued message(s)", dispatched);
                }
            }
        }
    }

    Ok(())
}
