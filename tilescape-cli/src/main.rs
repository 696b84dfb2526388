//! Tilescape CLI - drive the tile engine from the command line.
//!
//! `tilescape snapshot` renders a viewport into a PNG using the built-in
//! debug rasterizer and reports cache statistics; `tilescape cache`
//! inspects or clears the persistent tile cache.

mod commands;
mod error;
mod renderer;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::cache::CacheAction;
use commands::snapshot::SnapshotArgs;

#[derive(Debug, Parser)]
#[command(name = "tilescape", about = "Tile cache and render scheduler demo")]
struct Cli {
    /// Path to an INI configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a viewport snapshot to a PNG file
    Snapshot(SnapshotArgs),

    /// Inspect or clear the persistent tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Snapshot(args) => commands::snapshot::run(cli.config.as_deref(), args).await,
        Command::Cache { action } => commands::cache::run(cli.config.as_deref(), action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
