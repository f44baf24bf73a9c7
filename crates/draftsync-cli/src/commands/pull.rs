//! Download and metadata commands - Pull from the remote without uploading

use anyhow::Result;
use clap::Args;

use super::CliContext;

/// Pull data updates
#[derive(Debug, Args)]
pub struct DownloadCommand {
    /// Cancel a run already in progress in this process before starting
    #[arg(long)]
    pub force: bool,
}

impl DownloadCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let force = self.force;
        ctx.engine()
            .await?
            .drive(ctx, move |orchestrator| async move {
                orchestrator.start_download_only(force).await
            })
            .await
    }
}

/// Pull metadata
#[derive(Debug, Args)]
pub struct MetadataCommand {
    /// Cancel a run already in progress in this process before starting
    #[arg(long)]
    pub force: bool,
}

impl MetadataCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let force = self.force;
        ctx.engine()
            .await?
            .drive(ctx, move |orchestrator| async move {
                orchestrator.start_metadata_sync(force).await
            })
            .await
    }
}
