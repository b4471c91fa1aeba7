//! Compact command implementation.

use super::open_existing;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting record log at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let mut store = open_existing(path)?;
    let stats = store.stats()?;

    println!("Compaction Analysis:");
    println!("  Frames:  {}", stats.frames);
    println!("  Records: {} ({} pending)", stats.records, stats.pending);
    println!("  Size before: {} bytes", stats.log_bytes);

    if dry_run {
        return Ok(());
    }
    if stats.frames <= 1 {
        println!();
        println!("No compaction needed - log is already a single snapshot");
        return Ok(());
    }

    println!();
    println!("Performing compaction...");
    let outcome = store.compact()?;
    let saved = outcome.bytes_before.saturating_sub(outcome.bytes_after);
    println!("  Size after:  {} bytes", outcome.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        saved,
        if outcome.bytes_before > 0 {
            saved as f64 / outcome.bytes_before as f64 * 100.0
        } else {
            0.0
        }
    );
    println!("✓ Compaction complete");
    Ok(())
}
