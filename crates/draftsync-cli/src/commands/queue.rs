//! Queue command - Add, list and discard queued drafts
//!
//! Drafts are written straight to the SQLite store; a running daemon picks
//! new ones up through the store's count watch or its next poll.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use draftsync_core::domain::{DraftRecord, FieldKey, InstanceKey};
use draftsync_core::ports::IDraftStore;

use super::CliContext;

/// Queue subcommands
#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Record a draft value
    Add {
        /// Instance (data_set/period/org_unit/attribute_option_combo)
        instance: InstanceKey,
        /// Field (data_element.category_option_combo)
        field: FieldKey,
        /// New value
        value: String,
    },
    /// List queued drafts
    List {
        /// Only show drafts of this instance
        #[arg(long)]
        instance: Option<InstanceKey>,
    },
    /// Discard every queued draft
    Discard {
        /// Confirm discarding; without it nothing is deleted
        #[arg(long)]
        yes: bool,
    },
}

impl QueueCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let (pool, store) = ctx.open_store().await?;

        match self {
            QueueCommand::Add {
                instance,
                field,
                value,
            } => {
                let draft = add_draft(store.as_ref(), instance, field, value).await?;
                let queued = store.count().await?;
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "draft": draft_json(&draft),
                        "queued": queued,
                    }));
                } else {
                    formatter.success(&format!("Queued {}", draft.identity()));
                    formatter.info(&format!("{} draft(s) waiting for upload", queued));
                }
            }
            QueueCommand::List { instance } => {
                let drafts = list_drafts(store.as_ref(), instance.as_ref()).await?;
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "count": drafts.len(),
                        "drafts": drafts.iter().map(draft_json).collect::<Vec<_>>(),
                    }));
                } else if drafts.is_empty() {
                    formatter.success("Queue is empty");
                } else {
                    formatter.success(&format!("{} queued draft(s)", drafts.len()));
                    for (key, group) in group_by_instance(&drafts) {
                        formatter.info("");
                        formatter.info(&format!("{} ({})", key, group.len()));
                        for draft in group {
                            formatter.info(&format!(
                                "  {} = {:<20} {}",
                                draft.field(),
                                draft.value(),
                                draft.last_updated().format("%Y-%m-%d %H:%M:%S")
                            ));
                        }
                    }
                }
            }
            QueueCommand::Discard { yes } => {
                if !yes {
                    let queued = store.count().await?;
                    formatter.warn(&format!(
                        "This would discard {} draft(s); re-run with --yes to confirm",
                        queued
                    ));
                } else {
                    let removed = store.delete_all().await.context("Failed to clear queue")?;
                    info!(removed, "Queue discarded");
                    if ctx.format.is_json() {
                        formatter.print_json(&serde_json::json!({
                            "success": true,
                            "discarded": removed,
                        }));
                    } else {
                        formatter.success(&format!("Discarded {} draft(s)", removed));
                    }
                }
            }
        }

        pool.close().await;
        Ok(())
    }
}

/// Upserts a new draft stamped with the current time
pub async fn add_draft(
    store: &dyn IDraftStore,
    instance: &InstanceKey,
    field: &FieldKey,
    value: &str,
) -> Result<DraftRecord> {
    let draft = DraftRecord::new(instance.clone(), field.clone(), value);
    store.upsert(&draft).await.context("Failed to queue draft")?;
    Ok(draft)
}

pub async fn list_drafts(
    store: &dyn IDraftStore,
    instance: Option<&InstanceKey>,
) -> Result<Vec<DraftRecord>> {
    match instance {
        Some(key) => store.list_for_instance(key).await,
        None => store.list_all().await,
    }
}

/// Groups drafts by instance, keeping queue order inside each group
pub fn group_by_instance(drafts: &[DraftRecord]) -> BTreeMap<&InstanceKey, Vec<&DraftRecord>> {
    let mut groups: BTreeMap<&InstanceKey, Vec<&DraftRecord>> = BTreeMap::new();
    for draft in drafts {
        groups.entry(draft.instance()).or_default().push(draft);
    }
    groups
}

fn draft_json(draft: &DraftRecord) -> serde_json::Value {
    serde_json::json!({
        "instance": draft.instance().to_string(),
        "field": draft.field().to_string(),
        "value": draft.value(),
        "last_updated": draft.last_updated().to_rfc3339(),
    })
}
