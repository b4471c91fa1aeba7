//! Inspect command implementation.

use super::open_existing;
use crate::Format;
use replica_core::RecordStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Record log size in bytes.
    pub log_bytes: u64,
    /// Frames in the record log.
    pub frames: u64,
    /// Records, tombstones included.
    pub records: usize,
    /// Live records.
    pub live: usize,
    /// Tombstones.
    pub tombstones: usize,
    /// Records waiting to be pushed.
    pub pending: usize,
    /// Record count per content type.
    pub content_types: BTreeMap<String, usize>,
    /// Continuation token, if a cycle has completed.
    pub token: Option<String>,
    /// Pending record ids (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_ids: Option<Vec<String>>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_pending: bool,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let result = inspect(&store, path, show_pending)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Collects the inspection result for an open store.
pub fn inspect(
    store: &RecordStore,
    path: &Path,
    show_pending: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let stats = store.stats()?;

    let mut content_types = BTreeMap::new();
    for record in store.all() {
        *content_types.entry(record.content_type.clone()).or_insert(0) += 1;
    }

    let pending_ids = if show_pending {
        Some(
            store
                .get_pending()?
                .into_iter()
                .map(|r| r.id.to_string())
                .collect(),
        )
    } else {
        None
    };

    Ok(InspectResult {
        path: path.display().to_string(),
        log_bytes: stats.log_bytes,
        frames: stats.frames,
        records: stats.records,
        live: stats.records - stats.tombstones,
        tombstones: stats.tombstones,
        pending: stats.pending,
        content_types,
        token: store.get_token()?.map(|t| t.to_string()),
        pending_ids,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Replica Store Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:   {}", format_size(result.log_bytes));
    println!("  Frames: {}", result.frames);
    println!();
    println!("Records:");
    println!("  Total:      {}", result.records);
    println!("  Live:       {}", result.live);
    println!("  Tombstones: {}", result.tombstones);
    println!("  Pending:    {}", result.pending);

    if !result.content_types.is_empty() {
        println!();
        println!("Content types:");
        for (content_type, count) in &result.content_types {
            println!("  {content_type}: {count}");
        }
    }

    println!();
    match &result.token {
        Some(token) => println!("Continuation token: {token}"),
        None => println!("Continuation token: (none, never synced)"),
    }

    if let Some(ids) = &result.pending_ids {
        println!();
        println!("Pending records:");
        for id in ids {
            println!("  {id}");
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}
