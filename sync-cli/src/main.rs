//! # pufftrack
//!
//! CLI for logging puffs and syncing them with the PuffTrack server.
//!
//! ## Commands
//!
//! - `puff`: Record a puff
//! - `status`: Show today's numbers and sync state
//! - `sync`: Reconcile local puffs with the server
//! - `login`: Store a session token
//! - `logout`: Forget the session token
//! - `reset`: Delete all local puffs
//!
//! ## Example
//!
//! ```bash
//! # Record a puff now, and one from this morning
//! pufftrack puff
//! pufftrack puff --at 2024-03-01T08:30:00+01:00 --mode cigarettes
//!
//! # Sign in and sync
//! pufftrack login --token "$PUFFTRACK_TOKEN"
//! pufftrack sync
//!
//! # Try it without a server
//! pufftrack --mock sync
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{login, logout, puff, reset, status, sync};
use config::CliConfig;

/// CLI for logging puffs and syncing them with the PuffTrack server.
#[derive(Parser, Debug)]
#[command(name = "pufftrack")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the puff ledger and credential
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to pufftrack.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-process mock server instead of the network
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a puff
    Puff {
        /// When the puff happened (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<String>,

        /// Tracking mode: vaping or cigarettes
        #[arg(long, short)]
        mode: Option<String>,
    },

    /// Show today's numbers and sync state
    Status,

    /// Reconcile local puffs with the server
    Sync {
        /// Keep syncing in the background until Ctrl-C
        #[arg(long, short)]
        watch: bool,
    },

    /// Store a session token for the next sync
    Login {
        /// Session token issued by the server
        #[arg(long, short)]
        token: String,
    },

    /// Forget the session token (local puffs are kept)
    Logout,

    /// Delete all local puffs
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    let config = CliConfig::load(cli.config.as_deref(), &data_dir).await?;

    match cli.command {
        Commands::Puff { at, mode } => {
            puff::run(&data_dir, &config, at.as_deref(), mode.as_deref()).await?;
        }
        Commands::Status => {
            status::run(&data_dir, &config).await?;
        }
        Commands::Sync { watch } => {
            sync::run(&data_dir, &config, cli.mock, watch).await?;
        }
        Commands::Login { token } => {
            login::run(&data_dir, &token).await?;
        }
        Commands::Logout => {
            logout::run(&data_dir).await?;
        }
        Commands::Reset { yes } => {
            reset::run(&data_dir, &config, yes).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for pufftrack.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("app", "pufftrack", "pufftrack")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
