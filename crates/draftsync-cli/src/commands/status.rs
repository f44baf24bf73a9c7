//! Status command - Display queue and connectivity status
//!
//! Provides the `draftsync status` CLI command which:
//! 1. Counts queued drafts, grouped by instance
//! 2. Probes connectivity to the remote
//! 3. Checks the remote session when online (skipped with `--offline`)

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use tracing::{info, warn};

use draftsync_core::ports::{IDraftStore, IRemoteSyncClient};
use draftsync_remote::{HttpRemoteSyncClient, RemoteClient};

use crate::output::format_age;

use super::queue::{group_by_instance, list_drafts};
use super::CliContext;

/// Status command options
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Do not contact the network
    #[arg(long)]
    pub offline: bool,
}

/// Result of the remote session check
#[derive(Debug, Clone, Copy, PartialEq)]
enum Session {
    Valid,
    Rejected,
    Unknown,
    Skipped,
}

impl Session {
    fn as_str(self) -> &'static str {
        match self {
            Session::Valid => "valid",
            Session::Rejected => "rejected",
            Session::Unknown => "unknown",
            Session::Skipped => "not checked",
        }
    }
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let (pool, store) = ctx.open_store().await?;

        let drafts = list_drafts(store.as_ref(), None).await?;
        let groups = group_by_instance(&drafts);
        let oldest = drafts.iter().map(|d| d.last_updated()).min();
        let queued = store.count().await?;

        let (online, session) = if self.offline {
            (None, Session::Skipped)
        } else {
            let online = ctx.probe_connectivity().await.current().is_online();
            let session = if online {
                check_session(ctx).await
            } else {
                Session::Skipped
            };
            (Some(online), session)
        };

        if ctx.format.is_json() {
            let instances: Vec<serde_json::Value> = groups
                .iter()
                .map(|(key, group)| {
                    serde_json::json!({"instance": key.to_string(), "drafts": group.len()})
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "queued": queued,
                "instances": instances,
                "oldest_draft": oldest.map(|t| t.to_rfc3339()),
                "remote": ctx.config.remote.base_url,
                "online": online,
                "session": session.as_str(),
            }));
        } else {
            formatter.success(&format!("{} draft(s) queued", queued));
            if let Some(oldest) = oldest {
                formatter.info(&format!(
                    "Oldest change: {} ({})",
                    oldest.format("%Y-%m-%d %H:%M:%S UTC"),
                    format_age(oldest, Utc::now())
                ));
            }
            for (key, group) in &groups {
                formatter.info(&format!("  {:<48} {:>5}", key.to_string(), group.len()));
            }
            formatter.info("");
            formatter.info(&format!("Remote:       {}", ctx.config.remote.base_url));
            if let Some(user) = &ctx.config.remote.username {
                formatter.info(&format!("Account:      {}", user));
            }
            let network = match online {
                Some(true) => "online",
                Some(false) => "offline",
                None => "not checked",
            };
            formatter.info(&format!("Connectivity: {}", network));
            formatter.info(&format!("Session:      {}", session.as_str()));
            if session == Session::Rejected {
                formatter.warn(&format!(
                    "Remote rejected the token; check ${}",
                    ctx.config.remote.token_env
                ));
            }
        }

        pool.close().await;
        Ok(())
    }
}

async fn check_session(ctx: &CliContext) -> Session {
    let client = match RemoteClient::from_config(&ctx.config.remote) {
        Ok(client) => HttpRemoteSyncClient::new(client),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Cannot build remote client");
            return Session::Unknown;
        }
    };
    match client.is_authenticated().await {
        Ok(true) => Session::Valid,
        Ok(false) => Session::Rejected,
        Err(e) => {
            info!(error = %format!("{e:#}"), "Session check failed");
            Session::Unknown
        }
    }
}
