//! draftsync CLI - Command-line interface for draftsync
//!
//! Provides commands for:
//! - Viewing queue and connectivity status
//! - Running a one-shot sync (whole queue or one instance)
//! - Pulling data updates or metadata
//! - Adding, listing and discarding queued drafts
//! - Inspecting configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand,
    pull::{DownloadCommand, MetadataCommand},
    queue::QueueCommand,
    status::StatusCommand,
    sync::SyncCommand,
    CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "draftsync", version, about = "Offline-first draft synchronization")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show queue, connectivity and last run
    Status(StatusCommand),
    /// Upload queued drafts now
    Sync(SyncCommand),
    /// Pull data updates without uploading
    Download(DownloadCommand),
    /// Pull metadata
    Metadata(MetadataCommand),
    /// Manage queued drafts
    #[command(subcommand)]
    Queue(QueueCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext::load(cli.config, format);

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Download(cmd) => cmd.execute(&ctx).await,
        Commands::Metadata(cmd) => cmd.execute(&ctx).await,
        Commands::Queue(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
