//! CLI subcommands and the wiring they share
//!
//! Every command receives a [`CliContext`] holding the loaded configuration
//! and the output format. Commands that talk to the remote build a
//! short-lived [`Engine`]: the SQLite store, the HTTP client and a
//! connectivity signal seeded by one TCP probe.

pub mod config;
pub mod pull;
pub mod queue;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use draftsync_cache::{DatabasePool, SqliteDraftStore};
use draftsync_core::config::Config;
use draftsync_core::ports::{IConnectivityObserver, IDraftStore, IRemoteSyncClient};
use draftsync_remote::{HttpRemoteSyncClient, RemoteClient};
use draftsync_sync::connectivity::{ManualConnectivity, TcpProbeConnectivity};
use draftsync_sync::{DetailedSyncProgress, RunError, SyncOrchestrator, SyncOutcome, SyncSettings};

use crate::output::{self, get_formatter, OutputFormat, OutputFormatter};

/// Exit status used when a run fails
const EXIT_RUN_FAILED: i32 = 2;

// ============================================================================
// CliContext
// ============================================================================

/// Configuration and output settings shared by all commands
pub struct CliContext {
    pub config_path: PathBuf,
    pub config: Config,
    /// False when the file was missing or unreadable and defaults are in use
    pub config_loaded: bool,
    pub format: OutputFormat,
}

impl CliContext {
    pub fn load(path: Option<PathBuf>, format: OutputFormat) -> Self {
        let config_path = path.unwrap_or_else(Config::default_path);
        let (config, config_loaded) = match Config::load(&config_path) {
            Ok(config) => (config, true),
            Err(e) => {
                debug!(path = %config_path.display(), error = %e, "Using default configuration");
                (Config::default(), false)
            }
        };
        Self {
            config_path,
            config,
            config_loaded,
            format,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    /// Opens the draft store named in the configuration
    pub async fn open_store(&self) -> Result<(DatabasePool, Arc<SqliteDraftStore>)> {
        let pool = DatabasePool::from_config(&self.config.store)
            .await
            .context("Failed to open draft database")?;
        let store = SqliteDraftStore::new(pool.pool().clone())
            .await
            .context("Failed to read draft queue")?;
        Ok((pool, Arc::new(store)))
    }

    /// Builds the store, remote client and orchestrator
    pub async fn engine(&self) -> Result<Engine> {
        let (pool, store) = self.open_store().await?;
        let remote = Arc::new(HttpRemoteSyncClient::new(
            RemoteClient::from_config(&self.config.remote)
                .context("Invalid remote configuration")?,
        ));
        let connectivity = self.probe_connectivity().await;

        let orchestrator = SyncOrchestrator::new(
            store as Arc<dyn IDraftStore>,
            remote as Arc<dyn IRemoteSyncClient>,
            connectivity,
            SyncSettings::from_config(&self.config.sync),
        );

        Ok(Engine { pool, orchestrator })
    }

    /// Probes once and returns a signal holding the result
    pub async fn probe_connectivity(&self) -> Arc<dyn IConnectivityObserver> {
        match TcpProbeConnectivity::from_config(&self.config.connectivity, &self.config.remote) {
            Some(probe) => {
                let status = probe.probe_once().await;
                let (host, port) = probe.target();
                info!(host, port, online = status.is_online(), "Connectivity probed");
                Arc::new(probe)
            }
            None => Arc::new(ManualConnectivity::online()),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Orchestrator for one CLI invocation, plus the pool to close afterwards
pub struct Engine {
    pool: DatabasePool,
    orchestrator: SyncOrchestrator,
}

impl Engine {
    /// Drives a run to completion, printing progress and the result
    ///
    /// Ctrl+C cancels the run; drafts already confirmed stay deleted.
    /// A failed or cancelled run exits the process with a non-zero status.
    pub async fn drive<S, F>(self, ctx: &CliContext, start: S) -> Result<()>
    where
        S: FnOnce(SyncOrchestrator) -> F,
        F: Future<Output = Result<SyncOutcome, RunError>>,
    {
        let formatter = ctx.formatter();
        let printer = (!ctx.format.is_json())
            .then(|| spawn_progress_printer(self.orchestrator.subscribe_progress()));

        let run = start(self.orchestrator.clone());
        tokio::pin!(run);
        let result = tokio::select! {
            result = &mut run => result,
            Ok(()) = tokio::signal::ctrl_c() => {
                formatter.warn("Interrupted, cancelling sync...");
                self.orchestrator.cancel_sync().await;
                run.await
            }
        };

        if let Some(printer) = printer {
            printer.abort();
        }

        match result {
            Ok(outcome) => {
                if ctx.format.is_json() {
                    formatter.print_json(&output::outcome_json(&outcome));
                } else {
                    formatter.success(&format!("Sync completed ({})", outcome.kind));
                    for line in output::outcome_lines(&outcome) {
                        formatter.info(&line);
                    }
                }
                self.pool.close().await;
                Ok(())
            }
            Err(err) => {
                report_failure(ctx, &*formatter, &err, self.orchestrator.state().queue_size);
                self.pool.close().await;
                std::process::exit(EXIT_RUN_FAILED);
            }
        }
    }
}

fn report_failure(ctx: &CliContext, formatter: &dyn OutputFormatter, err: &RunError, queued: usize) {
    if ctx.format.is_json() {
        let sync_error = err.sync_error();
        formatter.print_json(&serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "kind": sync_error.map(|e| e.kind()),
            "can_retry": sync_error.map(|e| e.allows_manual_retry()).unwrap_or(true),
            "queued": queued,
        }));
        return;
    }

    formatter.error(&err.to_string());
    if let Some(sync_error) = err.sync_error() {
        if sync_error.requires_reauthentication() {
            formatter.info(&format!(
                "Set a valid token in ${} and try again",
                ctx.config.remote.token_env
            ));
        }
    }
    formatter.info(&format!("{} draft(s) remain queued", queued));
}

fn spawn_progress_printer(
    mut rx: watch::Receiver<Option<DetailedSyncProgress>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = String::new();
        while rx.changed().await.is_ok() {
            let line = match rx.borrow_and_update().as_ref() {
                Some(progress) => output::progress_line(progress),
                None => continue,
            };
            if line != last {
                println!("  {}", line);
                last = line;
            }
        }
    })
}
