use serde_json::json;
use anyhow::{Result, Context};

use crate::models::CollectionReport;

/// Create a JSON summary of the collection.
///
/// Records which items were collected, which failed and why, together with
/// the time window and the collector build that produced the archive.
///
/// # Example Output
///
/// ```json
/// {
///   "collection_id": "550e8400-e29b-41d4-a716-446655440000",
///   "label": "logs-collector",
///   "hostname": "workstation-01",
///   "collection_time": "2024-01-15 14:30:52 +0000",
///   "window": { "start": "...", "end": "..." },
///   "items": [...]
/// }
/// ```
pub fn create_collection_summary(report: &CollectionReport) -> Result<String> {
    let item_list: Vec<_> = report.items.iter()
        .map(|item| {
            json!({
                "item": item.item,
                "status": item.status,
                "error": item.error,
                "timed_out": item.timed_out,
                "elapsed_ms": item.elapsed_ms
            })
        })
        .collect();

    let summary = json!({
        "collection_id": report.collection_id,
        "label": report.label,
        "hostname": report.hostname,
        "collection_time": report.started,
        "window": {
            "start": report.window_start,
            "end": report.window_end
        },
        "os": std::env::consts::OS,
        "collector_version": env!("CARGO_PKG_VERSION"),
        "item_count": report.items.len(),
        "failed_count": report.failed().count(),
        "items": item_list
    });

    serde_json::to_string_pretty(&summary).context("Failed to serialize collection summary to JSON")
}
