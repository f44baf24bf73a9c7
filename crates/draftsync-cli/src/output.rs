//! Output formatting for human and JSON modes

use std::time::Duration;

use chrono::{DateTime, Utc};
use draftsync_sync::{DetailedSyncProgress, SyncOutcome};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// Machine-readable output; informational lines are suppressed
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    if format.is_json() {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

// ============================================================================
// Rendering helpers
// ============================================================================

/// `850ms`, `1.5s`, `2m 05s`
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = d.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Age of a timestamp relative to `now`: `just now`, `5m ago`, `3h ago`, `2d ago`
pub fn format_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(since);
    if age.num_minutes() < 1 {
        "just now".to_string()
    } else if age.num_hours() < 1 {
        format!("{}m ago", age.num_minutes())
    } else if age.num_days() < 1 {
        format!("{}h ago", age.num_hours())
    } else {
        format!("{}d ago", age.num_days())
    }
}

/// One progress line: `[ 42%] Uploading drafts: chunk 2 of 4`
pub fn progress_line(progress: &DetailedSyncProgress) -> String {
    let mut line = format!(
        "[{:>3}%] {}: {}",
        progress.overall_percentage, progress.phase_title, progress.phase_detail
    );
    if let Some(delay) = progress.auto_retry_in {
        line.push_str(&format!(" (retrying in {})", format_duration(delay)));
    }
    line
}

/// JSON view of a finished run
pub fn outcome_json(outcome: &SyncOutcome) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "run_id": outcome.run_id.to_string(),
        "kind": outcome.kind.to_string(),
        "phases": outcome.phases.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
        "uploaded": outcome.uploaded,
        "rejected": outcome.rejected,
        "skipped_staging": outcome.skipped_staging,
        "superseded": outcome.superseded,
        "chunks": outcome.chunks,
        "retries": outcome.retries,
        "received": outcome.received,
        "download_note": outcome.download_note,
        "duration_ms": outcome.duration_ms,
    })
}

/// Human summary lines for a finished run
pub fn outcome_lines(outcome: &SyncOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    if outcome.chunks > 0 || outcome.uploaded > 0 {
        lines.push(format!(
            "Uploaded {} draft(s) in {} chunk(s)",
            outcome.uploaded, outcome.chunks
        ));
    }
    if outcome.rejected > 0 {
        lines.push(format!(
            "{} draft(s) rejected by the server and kept in the queue",
            outcome.rejected
        ));
    }
    if outcome.skipped_staging > 0 {
        lines.push(format!(
            "{} draft(s) could not be staged and were skipped",
            outcome.skipped_staging
        ));
    }
    if outcome.superseded > 0 {
        lines.push(format!(
            "{} draft(s) edited during upload and queued again",
            outcome.superseded
        ));
    }
    if outcome.retries > 0 {
        lines.push(format!("{} retry attempt(s)", outcome.retries));
    }
    if outcome.received > 0 {
        lines.push(format!("Received {} record(s)", outcome.received));
    }
    if let Some(note) = &outcome.download_note {
        lines.push(note.clone());
    }
    lines.push(format!(
        "Finished in {}",
        format_duration(Duration::from_millis(outcome.duration_ms))
    ));
    lines
}
