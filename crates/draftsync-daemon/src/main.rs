//! draftsync Daemon - Background draft synchronization service
//!
//! This binary runs as a user service and handles:
//! - Uploading queued drafts whenever the remote is reachable
//! - Resuming automatically when connectivity returns
//! - Periodic polling of the queue
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the SQLite draft store, the HTTP remote client and a
//! TCP connectivity probe into a `SyncOrchestrator`, then hands control to
//! the `ConnectivityWatcher` (or a plain polling loop when auto-resume is
//! disabled). Everything is stopped by one `CancellationToken` triggered on
//! SIGTERM or SIGINT; an active run is cancelled before the store closes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use draftsync_cache::{DatabasePool, SqliteDraftStore};
use draftsync_core::config::{Config, LoggingConfig};
use draftsync_core::ports::{IConnectivityObserver, IDraftStore, IRemoteSyncClient};
use draftsync_remote::{HttpRemoteSyncClient, RemoteClient};
use draftsync_sync::connectivity::{ManualConnectivity, TcpProbeConnectivity};
use draftsync_sync::watcher::ConnectivityWatcher;
use draftsync_sync::{SyncError, SyncOrchestrator, SyncSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "DRAFTSYNC_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service owning the orchestrator and its adapters
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    store: Arc<SqliteDraftStore>,
    connectivity: Arc<dyn IConnectivityObserver>,
    /// Present when a probe target could be resolved
    probe: Option<Arc<TcpProbeConnectivity>>,
    orchestrator: SyncOrchestrator,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the store and builds every adapter from `config`
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::from_config(&config.store)
            .await
            .context("Failed to open draft database")?;
        let store = Arc::new(
            SqliteDraftStore::new(db_pool.pool().clone())
                .await
                .context("Failed to read draft queue")?,
        );

        let remote_client =
            RemoteClient::from_config(&config.remote).context("Invalid remote configuration")?;
        if !remote_client.has_token() {
            warn!(
                var = %config.remote.token_env,
                "No bearer token set; runs will fail until one is provided"
            );
        }
        let remote = Arc::new(HttpRemoteSyncClient::new(remote_client));

        let probe = TcpProbeConnectivity::from_config(&config.connectivity, &config.remote)
            .map(Arc::new);
        let connectivity: Arc<dyn IConnectivityObserver> = match &probe {
            Some(probe) => {
                let (host, port) = probe.target();
                info!(host, port, "Connectivity probe configured");
                Arc::clone(probe) as Arc<dyn IConnectivityObserver>
            }
            None => {
                warn!("No probe target could be derived; assuming the network is up");
                Arc::new(ManualConnectivity::online())
            }
        };

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store) as Arc<dyn IDraftStore>,
            remote as Arc<dyn IRemoteSyncClient>,
            Arc::clone(&connectivity),
            SyncSettings::from_config(&config.sync),
        );

        Ok(Self {
            config,
            db_pool,
            store,
            connectivity,
            probe,
            orchestrator,
            shutdown,
        })
    }

    /// Runs until the shutdown token is cancelled
    async fn run(&self) -> Result<()> {
        let queued = self.store.count().await.context("Failed to count drafts")?;
        info!(queued, "Draft queue loaded");

        let probe_task = self
            .probe
            .as_ref()
            .map(|probe| Arc::clone(probe).spawn(self.shutdown.clone()));
        let progress_task = self.spawn_progress_logger();

        if self.config.sync.auto_resume {
            let watcher = ConnectivityWatcher::new(
                self.orchestrator.clone(),
                self.connectivity.as_ref(),
                self.store.as_ref(),
            )
            .with_poll_interval(self.config.sync.poll_interval())
            .spawn(self.shutdown.clone());
            self.shutdown.cancelled().await;
            join_quietly("watcher", watcher).await;
        } else {
            self.poll_loop().await;
        }

        if self.orchestrator.cancel_sync().await {
            info!("Cancelled active sync run");
        }
        if let Some(task) = probe_task {
            join_quietly("connectivity probe", task).await;
        }
        progress_task.abort();

        let state = self.orchestrator.state();
        info!(
            queued = state.queue_size,
            failed_attempts = state.failed_attempts,
            last_success = ?state.last_successful_sync,
            "Daemon stopping"
        );
        self.db_pool.close().await;
        Ok(())
    }

    /// Polls the queue on a fixed interval; used when auto-resume is off
    async fn poll_loop(&self) {
        let poll = self.config.sync.poll_interval();
        info!(poll_interval_secs = poll.as_secs(), "Starting poll loop");

        let mut interval = tokio::time::interval(poll.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.orchestrator.queue_for_sync().await {
                        Ok(true) => info!("Sync run started by poll"),
                        Ok(false) => {}
                        Err(e) => error!(error = %format!("{e:#}"), "Failed to check queue"),
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    /// Logs phase transitions and run results as they are published
    fn spawn_progress_logger(&self) -> JoinHandle<()> {
        let mut progress_rx = self.orchestrator.subscribe_progress();
        let mut state_rx = self.orchestrator.subscribe_state();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut last_phase = None;
            loop {
                tokio::select! {
                    changed = progress_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = progress_rx.borrow_and_update().clone();
                        let Some(progress) = snapshot else {
                            last_phase = None;
                            continue;
                        };
                        if last_phase != Some(progress.phase) {
                            last_phase = Some(progress.phase);
                            info!(
                                run_id = %progress.run_id,
                                phase = %progress.phase,
                                percent = progress.overall_percentage,
                                "Sync phase"
                            );
                        }
                        if let Some(delay) = progress.auto_retry_in {
                            warn!(
                                run_id = %progress.run_id,
                                retry_in_ms = delay.as_millis() as u64,
                                error = retry_reason(progress.error.as_ref()),
                                "Retrying chunk"
                            );
                        }
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = state_rx.borrow_and_update().clone();
                        if !state.is_running {
                            if let Some(err) = &state.error {
                                warn!(
                                    error = %err,
                                    failed_attempts = state.failed_attempts,
                                    queued = state.queue_size,
                                    "Sync run ended with error"
                                );
                            }
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

/// Message of the fault being retried, empty when none is attached
fn retry_reason(error: Option<&SyncError>) -> &str {
    error.map(SyncError::message).unwrap_or("")
}

async fn join_quietly(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(task = name, error = %e, "Background task ended abnormally");
    }
}

// ============================================================================
// Configuration and logging
// ============================================================================

/// Config file location: `$DRAFTSYNC_CONFIG` or the platform default
fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Builds the log filter; `RUST_LOG` wins over the configured level
fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

fn init_tracing(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(logging))
        .with_target(true);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let config = Config::load_or_default(&path);
    init_tracing(&config.logging);

    info!(config_path = %path.display(), "draftsync daemon starting (draftsyncd)");

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!(%problem, "Invalid configuration");
        }
        anyhow::bail!("Configuration has {} error(s)", problems.len());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let service = DaemonService::new(config, shutdown).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("draftsync daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "draftsync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
