//! Connectivity watcher - resumes syncing when the network comes back
//!
//! The [`ConnectivityWatcher`] is the long-lived companion of the
//! [`SyncOrchestrator`]. It never writes sync state itself; it only calls
//! [`SyncOrchestrator::queue_for_sync`], which decides whether a run can
//! start.
//!
//! ## Triggers
//!
//! ```text
//! connectivity: offline ──→ online ──┐
//! draft store:  count 0 ──→ n > 0 ───┼──→ queue_for_sync()
//! poll interval elapsed ─────────────┘
//! ```

use std::future::pending;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use draftsync_core::ports::{ConnectivityStatus, IConnectivityObserver, IDraftStore};

use crate::orchestrator::SyncOrchestrator;

/// Watches connectivity and the queue, triggering sync runs
pub struct ConnectivityWatcher {
    orchestrator: SyncOrchestrator,
    connectivity_rx: watch::Receiver<ConnectivityStatus>,
    queue_rx: Option<watch::Receiver<usize>>,
    poll_interval: Option<Duration>,
}

impl ConnectivityWatcher {
    /// Creates a watcher over the given signals
    ///
    /// The store's count signal is used when the store offers one.
    pub fn new(
        orchestrator: SyncOrchestrator,
        connectivity: &dyn IConnectivityObserver,
        store: &dyn IDraftStore,
    ) -> Self {
        Self {
            orchestrator,
            connectivity_rx: connectivity.subscribe(),
            queue_rx: store.watch_count(),
            poll_interval: None,
        }
    }

    /// Also calls `queue_for_sync` every `interval`
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval).filter(|i| !i.is_zero());
        self
    }

    /// Spawns [`run`](Self::run) on the current runtime
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` is cancelled or the connectivity signal closes
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut online = self.connectivity_rx.borrow_and_update().is_online();
        info!(online, poll = ?self.poll_interval, "Connectivity watcher started");

        if online {
            self.trigger("startup").await;
        }

        let mut ticker = self.poll_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Connectivity watcher shutting down");
                    break;
                }
                changed = self.connectivity_rx.changed() => {
                    if changed.is_err() {
                        warn!("Connectivity signal closed; watcher stopping");
                        break;
                    }
                    let now_online = self.connectivity_rx.borrow_and_update().is_online();
                    if now_online && !online {
                        info!("Connectivity restored");
                        online = true;
                        self.trigger("connectivity restored").await;
                    } else if !now_online && online {
                        info!("Connectivity lost; drafts stay queued");
                        online = false;
                    }
                }
                count = next_count(&mut self.queue_rx) => {
                    match count {
                        Some(count) if count > 0 && online => {
                            self.trigger("queue changed").await;
                        }
                        Some(_) => {}
                        None => {
                            debug!("Queue signal closed");
                            self.queue_rx = None;
                        }
                    }
                }
                _ = next_tick(&mut ticker) => {
                    if online {
                        self.trigger("poll interval").await;
                    }
                }
            }
        }
    }

    async fn trigger(&self, reason: &'static str) {
        match self.orchestrator.queue_for_sync().await {
            Ok(true) => info!(reason, "Sync run launched"),
            Ok(false) => debug!(reason, "No sync run needed"),
            Err(err) => warn!(reason, error = %format!("{err:#}"), "Failed to queue sync"),
        }
    }
}

/// Next value of the optional count signal; `None` once it closes
async fn next_count(rx: &mut Option<watch::Receiver<usize>>) -> Option<usize> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => pending().await,
    }
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}
