//! Connectivity observer adapters
//!
//! - [`TcpProbeConnectivity`] periodically opens a TCP connection to the
//!   remote host; a completed handshake counts as validated internet.
//! - [`ManualConnectivity`] is driven by the caller (tests, one-shot CLI).

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use draftsync_core::config::{ConnectivityConfig, RemoteConfig};
use draftsync_core::ports::{ConnectivityStatus, IConnectivityObserver, LinkType};

// ============================================================================
// ManualConnectivity
// ============================================================================

/// Connectivity signal set explicitly by the caller
pub struct ManualConnectivity {
    tx: watch::Sender<ConnectivityStatus>,
}

impl ManualConnectivity {
    pub fn new(initial: ConnectivityStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn online() -> Self {
        Self::new(ConnectivityStatus::online(LinkType::Other))
    }

    pub fn offline() -> Self {
        Self::new(ConnectivityStatus::offline())
    }

    /// Publishes `status` if it differs from the current one
    pub fn set_status(&self, status: ConnectivityStatus) {
        self.tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    pub fn set_online(&self, online: bool) {
        let status = if online {
            ConnectivityStatus::online(LinkType::Other)
        } else {
            ConnectivityStatus::offline()
        };
        self.set_status(status);
    }
}

impl IConnectivityObserver for ManualConnectivity {
    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}

// ============================================================================
// TcpProbeConnectivity
// ============================================================================

/// Connectivity signal derived from periodic TCP probes
pub struct TcpProbeConnectivity {
    host: String,
    port: u16,
    interval: Duration,
    timeout: Duration,
    tx: watch::Sender<ConnectivityStatus>,
}

impl TcpProbeConnectivity {
    /// Creates a probe that starts out offline until the first probe succeeds
    pub fn new(host: impl Into<String>, port: u16, interval: Duration, timeout: Duration) -> Self {
        let (tx, _) = watch::channel(ConnectivityStatus::offline());
        Self {
            host: host.into(),
            port,
            interval,
            timeout,
            tx,
        }
    }

    /// Builds a probe from configuration
    ///
    /// Returns `None` if no probe host is configured and none can be derived
    /// from the remote base URL.
    pub fn from_config(config: &ConnectivityConfig, remote: &RemoteConfig) -> Option<Self> {
        let host = config.resolved_host(remote)?;
        Some(Self::new(
            host,
            config.probe_port,
            Duration::from_secs(config.probe_interval_secs),
            Duration::from_secs(config.probe_timeout_secs),
        ))
    }

    pub fn target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Runs one probe and publishes the result
    pub async fn probe_once(&self) -> ConnectivityStatus {
        let target = (self.host.as_str(), self.port);
        let status = match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => ConnectivityStatus::online(LinkType::Other),
            Ok(Err(err)) => {
                debug!(host = %self.host, port = self.port, error = %err, "Probe failed");
                ConnectivityStatus::offline()
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "Probe timed out");
                ConnectivityStatus::offline()
            }
        };

        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
        if changed {
            info!(
                host = %self.host,
                online = status.is_online(),
                "Connectivity changed"
            );
        }
        status
    }

    /// Probes every interval until `shutdown` is cancelled
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.probe_once().await;
                    }
                }
            }
        })
    }
}

impl IConnectivityObserver for TcpProbeConnectivity {
    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}
