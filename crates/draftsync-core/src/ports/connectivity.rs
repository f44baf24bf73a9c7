//! Connectivity observer port (driven/secondary port)
//!
//! Exposes the current network reachability as a continuously-updated
//! `watch` value. Only [`ConnectivityStatus::has_internet_validated`] is
//! authoritative for "online"; a connected link without validated internet
//! (captive portal, dead uplink) counts as offline.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Kind of network link currently in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    #[default]
    None,
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkType::None => "none",
            LinkType::Wifi => "wifi",
            LinkType::Cellular => "cellular",
            LinkType::Ethernet => "ethernet",
            LinkType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of network reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    /// A network interface is up
    pub is_connected: bool,
    /// Internet reachability has been validated end to end
    pub has_internet_validated: bool,
    /// Kind of link carrying traffic
    pub link_type: LinkType,
}

impl ConnectivityStatus {
    /// Status for a validated connection over the given link
    pub fn online(link_type: LinkType) -> Self {
        Self {
            is_connected: true,
            has_internet_validated: true,
            link_type,
        }
    }

    /// Status with no usable connection
    pub fn offline() -> Self {
        Self::default()
    }

    /// Returns true when the orchestrator may talk to the remote system
    pub fn is_online(&self) -> bool {
        self.has_internet_validated
    }
}

/// Port trait for the connectivity signal
pub trait IConnectivityObserver: Send + Sync {
    /// Subscribes to the reachability signal
    ///
    /// The returned receiver always holds the latest status.
    fn subscribe(&self) -> watch::Receiver<ConnectivityStatus>;

    /// Returns the latest status without subscribing
    fn current(&self) -> ConnectivityStatus {
        let rx = self.subscribe();
        let status = *rx.borrow();
        status
    }
}
