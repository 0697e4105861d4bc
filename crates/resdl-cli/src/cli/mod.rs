//! CLI for the resdl resumable download engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use resdl_core::chunk_store::SqliteChunkStore;
use resdl_core::config;
use std::path::PathBuf;

use commands::{run_cancel, run_get, run_status};

/// Top-level CLI for resdl.
#[derive(Debug, Parser)]
#[command(name = "resdl")]
#[command(about = "resdl: resumable, pausable chunked downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download (or resume) files from the server. Ctrl-C pauses.
    Get {
        /// File names under `<server>/files/`.
        #[arg(required = true)]
        names: Vec<String>,

        /// Server base URL (overrides `server_url` in config.toml).
        #[arg(long, value_name = "URL")]
        server: Option<String>,

        /// Directory for finished files (default: `download_dir` or the current directory).
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// List partially downloaded files.
    Status,

    /// Discard stored data for the given files.
    Cancel {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let store = SqliteChunkStore::open_default().await?;

        let result = match cli.command {
            CliCommand::Get { names, server, out } => {
                run_get(&cfg, store.clone(), &names, server, out).await
            }
            CliCommand::Status => run_status(&store).await,
            CliCommand::Cancel { names } => run_cancel(&store, &names).await,
        };
        store.close().await;
        result
    }
}
