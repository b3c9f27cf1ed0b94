//! # repolicy
//!
//! Command-line interface for repolicy.
//!
//! Loads a policy catalog (`repolicy.toml`) and evaluates it against one or
//! more repositories:
//! - `repolicy run` — check one repository, optionally enforce the fixes
//! - `repolicy run-all` — the same over several repositories, with a summary

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use repolicy_engine::PolicyConfig;
use tracing_subscriber::EnvFilter;

/// repolicy — keep repositories in line with shared conventions.
#[derive(Parser)]
#[command(name = "repolicy", version, about)]
struct Cli {
    /// Policy catalog to load (missing file means no policies).
    #[arg(long, global = true, default_value = "repolicy.toml")]
    config: PathBuf,

    /// Colorize the report with ANSI escapes.
    #[arg(long, global = true)]
    color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the catalog against one repository.
    Run {
        /// Repository directory (defaults to current directory).
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Write staged changes to disk instead of listing them.
        #[arg(long)]
        enforce: bool,
    },
    /// Evaluate the catalog against several repositories.
    RunAll {
        /// Repository directories, in report order.
        #[arg(long = "repo", required = true, num_args = 1..)]
        repos: Vec<PathBuf>,
        /// Write staged changes to disk instead of listing them.
        #[arg(long)]
        enforce: bool,
        /// Print the summary as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't mix with the report on stdout.
    // RUST_LOG wins when set; flushed changes are logged at info.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repolicy_engine=warn,repolicy_workspace=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = PolicyConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let options = commands::ReportOptions { color: cli.color };

    match &cli.command {
        Commands::Run { repo, enforce } => {
            commands::run::execute(&config, repo, *enforce, options).await?;
            Ok(())
        }
        Commands::RunAll {
            repos,
            enforce,
            json,
        } => commands::run_all::execute(&config, repos, *enforce, *json, options).await,
    }
}
