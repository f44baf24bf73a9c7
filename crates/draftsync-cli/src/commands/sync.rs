//! Sync command - Upload queued drafts now
//!
//! Provides the `draftsync sync` CLI command which:
//! 1. Opens the draft store and builds the remote client
//! 2. Probes connectivity once
//! 3. Runs the whole queue, or a single instance with `--instance`
//! 4. Prints progress while the run is active and a summary at the end

use anyhow::Result;
use clap::Args;
use tracing::info;

use draftsync_core::domain::InstanceKey;

use super::CliContext;

/// Upload queued drafts
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Cancel a run already in progress in this process before starting
    #[arg(long)]
    pub force: bool,

    /// Only upload drafts of this instance (data_set/period/org_unit/attribute_option_combo)
    #[arg(long)]
    pub instance: Option<InstanceKey>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let engine = ctx.engine().await?;
        let force = self.force;

        match self.instance.clone() {
            Some(key) => {
                info!(instance = %key, "Starting instance sync");
                engine
                    .drive(ctx, move |orchestrator| async move {
                        orchestrator.start_sync_for_instance(key, force).await
                    })
                    .await
            }
            None => {
                info!("Starting queue sync");
                engine
                    .drive(ctx, move |orchestrator| async move {
                        orchestrator.start_sync(force).await
                    })
                    .await
            }
        }
    }
}
