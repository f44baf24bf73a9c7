//! JSON payloads exchanged with the remote
//!
//! Data values travel in a `{"dataValues": [...]}` envelope. Upload responses
//! are import summaries, sometimes wrapped in a `{"response": ...}` envelope
//! depending on the server version.

use std::collections::BTreeSet;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use draftsync_core::domain::DraftRecord;

// ============================================================================
// Upload payload
// ============================================================================

/// One data value as posted to the remote
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue<'a> {
    pub data_set: &'a str,
    pub period: &'a str,
    pub org_unit: &'a str,
    pub attribute_option_combo: &'a str,
    pub data_element: &'a str,
    pub category_option_combo: &'a str,
    pub value: &'a str,
    pub last_updated: String,
}

impl<'a> From<&'a DraftRecord> for DataValue<'a> {
    fn from(draft: &'a DraftRecord) -> Self {
        let instance = draft.instance();
        let field = draft.field();
        Self {
            data_set: instance.data_set(),
            period: instance.period(),
            org_unit: instance.org_unit(),
            attribute_option_combo: instance.attribute_option_combo(),
            data_element: field.data_element(),
            category_option_combo: field.category_option_combo(),
            value: draft.value(),
            last_updated: draft
                .last_updated()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Batch of data values
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValueSet<'a> {
    pub data_values: Vec<DataValue<'a>>,
}

impl<'a> DataValueSet<'a> {
    pub fn from_drafts(drafts: &'a [DraftRecord]) -> Self {
        Self {
            data_values: drafts.iter().map(DataValue::from).collect(),
        }
    }
}

// ============================================================================
// Import summary
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportCount {
    pub imported: u32,
    pub updated: u32,
    pub ignored: u32,
    pub deleted: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportConflict {
    pub object: Option<String>,
    pub value: Option<String>,
    pub indexes: Vec<usize>,
}

/// Result of importing one batch
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportSummary {
    pub status: Option<String>,
    pub description: Option<String>,
    pub import_count: ImportCount,
    pub conflicts: Vec<ImportConflict>,
    pub rejected_indexes: Vec<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SummaryEnvelope {
    Wrapped { response: ImportSummary },
    Bare(ImportSummary),
}

impl ImportSummary {
    /// Parses a summary, accepting both the wrapped and bare layouts
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        Ok(match serde_json::from_str::<SummaryEnvelope>(body)? {
            SummaryEnvelope::Wrapped { response } => response,
            SummaryEnvelope::Bare(summary) => summary,
        })
    }

    /// Positions (within the posted batch) the remote refused
    pub fn rejected_positions(&self) -> BTreeSet<usize> {
        self.rejected_indexes
            .iter()
            .chain(self.conflicts.iter().flat_map(|c| c.indexes.iter()))
            .copied()
            .collect()
    }

    pub fn is_error(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("ERROR"))
    }

    /// Human-readable reason, for faults raised on an all-out failure
    pub fn reason(&self) -> String {
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            return description.to_string();
        }
        self.conflicts
            .iter()
            .filter_map(|c| c.value.as_deref())
            .next()
            .unwrap_or("import failed")
            .to_string()
    }
}

// ============================================================================
// Pull responses
// ============================================================================

/// Page of data values returned by a pull
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataValuesPage {
    pub data_values: Vec<serde_json::Value>,
}

/// Counts metadata objects: every top-level array except `system`
pub fn count_metadata_objects(body: &serde_json::Map<String, serde_json::Value>) -> u64 {
    body.iter()
        .filter(|(key, _)| key.as_str() != "system")
        .filter_map(|(_, value)| value.as_array())
        .map(|items| items.len() as u64)
        .sum()
}
