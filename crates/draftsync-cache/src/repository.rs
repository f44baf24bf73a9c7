//! SQLite implementation of the draft store port
//!
//! ## Design Notes
//!
//! - Upserts use `ON CONFLICT ... DO UPDATE` so a superseded draft keeps its
//!   original `seq`; listing order is `last_updated` then `seq`.
//! - Timestamps are stored as fixed-width RFC 3339 strings (microseconds,
//!   `Z` suffix) so lexical order equals chronological order.
//! - Every write republishes the outstanding count on a `watch` channel,
//!   which backs [`IDraftStore::watch_count`].
//! - `delete` matches value and stored timestamp as well as the key.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::watch;
use tracing::{debug, instrument};

use draftsync_core::domain::{DraftRecord, FieldKey, InstanceKey};
use draftsync_core::ports::IDraftStore;

use crate::CacheError;

const SELECT_COLUMNS: &str = "SELECT data_set, period, org_unit, attribute_option_combo, \
     data_element, category_option_combo, value, last_updated FROM drafts";

const ORDER: &str = "ORDER BY last_updated ASC, seq ASC";

/// Draft queue persisted in SQLite
pub struct SqliteDraftStore {
    pool: SqlitePool,
    count_tx: watch::Sender<usize>,
}

impl SqliteDraftStore {
    /// Wraps an already migrated pool and reads the initial count
    pub async fn new(pool: SqlitePool) -> Result<Self, CacheError> {
        let initial = count_rows(&pool).await?;
        let (count_tx, _) = watch::channel(initial);
        Ok(Self { pool, count_tx })
    }

    /// Re-reads the count and publishes it to watchers
    async fn publish_count(&self) -> anyhow::Result<usize> {
        let count = count_rows(&self.pool).await?;
        self.count_tx.send_replace(count);
        Ok(count)
    }
}

impl std::fmt::Debug for SqliteDraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDraftStore")
            .field("count", &*self.count_tx.borrow())
            .finish()
    }
}

async fn count_rows(pool: &SqlitePool) -> Result<usize, CacheError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM drafts")
        .fetch_one(pool)
        .await?;
    usize::try_from(n).map_err(|_| CacheError::CorruptRow(format!("negative count {n}")))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp, tolerating rows written by hand without offset
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CacheError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| CacheError::CorruptRow(format!("bad timestamp '{s}': {e}")))
}

fn draft_from_row(row: &SqliteRow) -> Result<DraftRecord, CacheError> {
    let instance = InstanceKey::new(
        row.get::<String, _>("data_set"),
        row.get::<String, _>("period"),
        row.get::<String, _>("org_unit"),
        row.get::<String, _>("attribute_option_combo"),
    )
    .map_err(|e| CacheError::CorruptRow(e.to_string()))?;
    let field = FieldKey::new(
        row.get::<String, _>("data_element"),
        row.get::<String, _>("category_option_combo"),
    )
    .map_err(|e| CacheError::CorruptRow(e.to_string()))?;
    let last_updated = parse_timestamp(&row.get::<String, _>("last_updated"))?;

    Ok(DraftRecord::with_timestamp(
        instance,
        field,
        row.get::<String, _>("value"),
        last_updated,
    ))
}

fn drafts_from_rows(rows: &[SqliteRow]) -> Result<Vec<DraftRecord>, CacheError> {
    rows.iter().map(draft_from_row).collect()
}

#[async_trait]
impl IDraftStore for SqliteDraftStore {
    #[instrument(skip(self, draft), fields(instance = %draft.instance()))]
    async fn upsert(&self, draft: &DraftRecord) -> anyhow::Result<()> {
        let instance = draft.instance();
        let field = draft.field();
        sqlx::query(
            r#"
            INSERT INTO drafts (data_set, period, org_unit, attribute_option_combo,
                                data_element, category_option_combo, value, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (data_set, period, org_unit, attribute_option_combo,
                         data_element, category_option_combo)
            DO UPDATE SET value = excluded.value, last_updated = excluded.last_updated
            "#,
        )
        .bind(instance.data_set())
        .bind(instance.period())
        .bind(instance.org_unit())
        .bind(instance.attribute_option_combo())
        .bind(field.data_element())
        .bind(field.category_option_combo())
        .bind(draft.value())
        .bind(format_timestamp(draft.last_updated()))
        .execute(&self.pool)
        .await
        .context("Failed to upsert draft")?;

        let count = self.publish_count().await?;
        debug!(queued = count, "Draft stored");
        Ok(())
    }

    async fn list_all(&self) -> anyhow::Result<Vec<DraftRecord>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} {ORDER}"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list drafts")?;
        Ok(drafts_from_rows(&rows)?)
    }

    async fn list_for_instance(&self, key: &InstanceKey) -> anyhow::Result<Vec<DraftRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE data_set = ? AND period = ? AND org_unit = ? \
             AND attribute_option_combo = ? {ORDER}"
        ))
        .bind(key.data_set())
        .bind(key.period())
        .bind(key.org_unit())
        .bind(key.attribute_option_combo())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list drafts for {key}"))?;
        Ok(drafts_from_rows(&rows)?)
    }

    async fn delete(&self, draft: &DraftRecord) -> anyhow::Result<bool> {
        let instance = draft.instance();
        let field = draft.field();
        let result = sqlx::query(
            r#"
            DELETE FROM drafts
            WHERE data_set = ? AND period = ? AND org_unit = ? AND attribute_option_combo = ?
              AND data_element = ? AND category_option_combo = ?
              AND value = ? AND last_updated = ?
            "#,
        )
        .bind(instance.data_set())
        .bind(instance.period())
        .bind(instance.org_unit())
        .bind(instance.attribute_option_combo())
        .bind(field.data_element())
        .bind(field.category_option_combo())
        .bind(draft.value())
        .bind(format_timestamp(draft.last_updated()))
        .execute(&self.pool)
        .await
        .context("Failed to delete draft")?;

        let removed = result.rows_affected() > 0;
        if removed {
            self.publish_count().await?;
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM drafts")
            .execute(&self.pool)
            .await
            .context("Failed to clear drafts")?;
        self.publish_count().await?;
        debug!(removed = result.rows_affected(), "Draft queue cleared");
        Ok(result.rows_affected())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(count_rows(&self.pool).await?)
    }

    fn watch_count(&self) -> Option<watch::Receiver<usize>> {
        Some(self.count_tx.subscribe())
    }
}
