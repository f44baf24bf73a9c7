//! HttpRemoteSyncClient - IRemoteSyncClient implementation over HTTP
//!
//! ## Design Notes
//!
//! - Staged drafts live in an in-memory working set keyed by identity; a
//!   later stage of the same identity replaces the earlier one. The set is
//!   emptied at the start of every run and after each accepted batch.
//! - `upload_staged` posts the staged copies of the chunk it is given and
//!   refuses the chunk if any draft is missing from the working set or
//!   differs from its staged copy. Rejections are reported by position in
//!   the posted batch and mapped back to identities.
//! - A batch the remote refuses outright (status `ERROR` with no per-value
//!   positions) is a fault, not a rejection, so the run fails instead of
//!   silently keeping the whole chunk queued.
//! - Pulls are incremental: each kind keeps a watermark set to the time the
//!   last successful pull started.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use tracing::{debug, info, instrument, warn};

use draftsync_core::domain::{DraftIdentity, DraftRecord};
use draftsync_core::ports::{IRemoteSyncClient, PullSummary, RemoteFault, UploadOutcome};

use crate::client::{fault_from_response, RemoteClient};
use crate::wire::{count_metadata_objects, DataValueSet, DataValuesPage, ImportSummary};

/// Longest value the remote accepts for a single data value
pub const MAX_VALUE_LENGTH: usize = 50_000;

const DATA_VALUE_SETS: &str = "api/dataValueSets";
const PING: &str = "api/system/ping";
const ME: &str = "api/me";
const METADATA: &str = "api/metadata";

/// Watermark used before the first successful pull
const EPOCH: &str = "1970-01-01T00:00:00.000Z";

/// Remote sync client speaking the data value set HTTP API
pub struct HttpRemoteSyncClient {
    client: RemoteClient,
    staged: Mutex<HashMap<DraftIdentity, DraftRecord>>,
    data_watermark: Mutex<Option<DateTime<Utc>>>,
    metadata_watermark: Mutex<Option<DateTime<Utc>>>,
}

impl HttpRemoteSyncClient {
    pub fn new(client: RemoteClient) -> Self {
        Self {
            client,
            staged: Mutex::new(HashMap::new()),
            data_watermark: Mutex::new(None),
            metadata_watermark: Mutex::new(None),
        }
    }

    /// Returns the underlying HTTP client
    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    /// Number of drafts currently held in the staging buffer
    pub fn staged_count(&self) -> usize {
        self.staged.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Staged copies of `drafts`, in batch order
    fn staged_batch(&self, drafts: &[DraftRecord]) -> Result<Vec<DraftRecord>> {
        let staged = self
            .staged
            .lock()
            .map_err(|_| anyhow::anyhow!("Staging buffer poisoned"))?;
        drafts
            .iter()
            .map(|draft| match staged.get(&draft.identity()) {
                Some(copy) if copy == draft => Ok(copy.clone()),
                Some(_) => Err(anyhow::anyhow!(
                    "Draft {} changed after it was staged",
                    draft.identity()
                )),
                None => Err(anyhow::anyhow!("Draft {} was not staged", draft.identity())),
            })
            .collect()
    }

    fn unstage(&self, drafts: &[DraftRecord]) {
        if let Ok(mut staged) = self.staged.lock() {
            for draft in drafts {
                staged.remove(&draft.identity());
            }
        }
    }

    fn watermark_param(slot: &Mutex<Option<DateTime<Utc>>>) -> String {
        slot.lock()
            .ok()
            .and_then(|w| *w)
            .map(|w| w.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| EPOCH.to_string())
    }

    fn advance_watermark(slot: &Mutex<Option<DateTime<Utc>>>, started: DateTime<Utc>) {
        if let Ok(mut watermark) = slot.lock() {
            *watermark = Some(started);
        }
    }

    fn outcome_from_summary(
        summary: &ImportSummary,
        drafts: &[DraftRecord],
    ) -> UploadOutcome {
        let rejected: Vec<DraftIdentity> = summary
            .rejected_positions()
            .into_iter()
            .filter_map(|i| drafts.get(i))
            .map(DraftRecord::identity)
            .collect();
        UploadOutcome {
            imported: summary.import_count.imported,
            updated: summary.import_count.updated,
            ignored: summary.import_count.ignored,
            rejected,
        }
    }
}

impl std::fmt::Debug for HttpRemoteSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteSyncClient")
            .field("client", &self.client)
            .field("staged", &self.staged_count())
            .finish()
    }
}

#[async_trait]
impl IRemoteSyncClient for HttpRemoteSyncClient {
    async fn is_authenticated(&self) -> Result<bool> {
        if !self.client.has_token() {
            return Ok(false);
        }
        let request = self.client.request(Method::GET, ME)?;
        let response = self.client.send(request, "GET /api/me").await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(status = %response.status(), "Session rejected by remote");
                Ok(false)
            }
            _ => {
                let fault = fault_from_response(response).await;
                Err(anyhow::Error::new(fault)).context("GET /api/me failed")
            }
        }
    }

    async fn probe_liveness(&self) -> Result<()> {
        self.client.get(PING, &[]).await?;
        debug!("Remote answered ping");
        Ok(())
    }

    async fn discard_staged(&self) -> Result<()> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| anyhow::anyhow!("Staging buffer poisoned"))?;
        if !staged.is_empty() {
            debug!(discarded = staged.len(), "Discarding leftover staged drafts");
            staged.clear();
        }
        Ok(())
    }

    async fn stage_locally(&self, draft: &DraftRecord) -> Result<()> {
        if draft.value().chars().count() > MAX_VALUE_LENGTH {
            anyhow::bail!(
                "Value for {} exceeds {} characters",
                draft.identity(),
                MAX_VALUE_LENGTH
            );
        }
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| anyhow::anyhow!("Staging buffer poisoned"))?;
        staged.insert(draft.identity(), draft.clone());
        Ok(())
    }

    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    async fn upload_staged(&self, drafts: &[DraftRecord]) -> Result<UploadOutcome> {
        if drafts.is_empty() {
            return Ok(UploadOutcome::default());
        }

        let batch = self.staged_batch(drafts)?;
        let body = DataValueSet::from_drafts(&batch);
        let response = self.client.post_json(DATA_VALUE_SETS, &body).await?;
        let status = response.status();

        // Conflicts come back as 409 with a summary body on newer servers
        if !status.is_success() && status != StatusCode::CONFLICT {
            let fault = fault_from_response(response).await;
            return Err(anyhow::Error::new(fault)).context("POST /api/dataValueSets failed");
        }

        let text = response
            .text()
            .await
            .map_err(|e| anyhow::Error::new(crate::client::fault_from_reqwest(&e)))
            .context("Failed to read import summary")?;
        let summary = match ImportSummary::parse(&text) {
            Ok(summary) => summary,
            Err(e) if status.is_success() => {
                return Err(e).context("Failed to parse import summary");
            }
            Err(_) => {
                return Err(anyhow::Error::new(RemoteFault::Http {
                    status: status.as_u16(),
                    message: text.chars().take(200).collect(),
                }))
                .context("POST /api/dataValueSets failed");
            }
        };

        let outcome = Self::outcome_from_summary(&summary, &batch);
        if summary.is_error() && outcome.rejected.is_empty() {
            let code = if status.is_success() {
                StatusCode::CONFLICT.as_u16()
            } else {
                status.as_u16()
            };
            return Err(anyhow::Error::new(RemoteFault::Http {
                status: code,
                message: summary.reason(),
            }))
            .context("Remote refused the batch");
        }

        self.unstage(&batch);
        info!(
            imported = outcome.imported,
            updated = outcome.updated,
            ignored = outcome.ignored,
            rejected = outcome.rejected.len(),
            "Chunk imported"
        );
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn pull_updates(&self) -> Result<PullSummary> {
        let started = Utc::now();
        let since = Self::watermark_param(&self.data_watermark);
        let page: DataValuesPage = self
            .client
            .get(DATA_VALUE_SETS, &[("lastUpdated", since)])
            .await?
            .json()
            .await
            .context("Failed to parse data values")?;
        Self::advance_watermark(&self.data_watermark, started);

        let received = page.data_values.len() as u64;
        info!(received, "Pulled data updates");
        Ok(PullSummary { received })
    }

    #[instrument(skip(self))]
    async fn pull_metadata(&self) -> Result<PullSummary> {
        let started = Utc::now();
        let since = Self::watermark_param(&self.metadata_watermark);
        let body: serde_json::Map<String, serde_json::Value> = self
            .client
            .get(METADATA, &[("lastUpdated", since)])
            .await?
            .json()
            .await
            .context("Failed to parse metadata")?;
        Self::advance_watermark(&self.metadata_watermark, started);

        let received = count_metadata_objects(&body);
        info!(received, "Pulled metadata");
        Ok(PullSummary { received })
    }
}
