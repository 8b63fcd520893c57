//! Crawl statistics from the checkpoint directory
//!
//! This module reads the persisted progress next to the snapshot it belongs
//! to and prints where the crawl stands.

use crate::output::traits::CrawlStatistics;
use crate::snapshot::Snapshot;
use crate::storage::CheckpointStore;
use crate::CrawlError;
use std::path::Path;

/// Loads statistics for `snapshot` from the checkpoint store
///
/// # Arguments
///
/// * `store` - The checkpoint store to read progress and shards from
/// * `snapshot` - The snapshot the crawl is walking
/// * `pause_file` - The sentinel file checked for a pending pause request
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Statistics, zeroed when no progress exists yet
/// * `Err(CrawlError)` - Progress is unreadable or belongs to another snapshot
pub fn load_statistics(
    store: &dyn CheckpointStore,
    snapshot: &Snapshot,
    pause_file: &Path,
) -> Result<CrawlStatistics, CrawlError> {
    let progress = store.read_progress()?;
    let shards_on_disk = store.list_shards()?.len();

    if let Some(progress) = &progress {
        if progress.snapshot_digest != snapshot.digest() {
            return Err(CrawlError::SnapshotMismatch {
                expected: snapshot.digest().to_string(),
                found: progress.snapshot_digest.clone(),
            });
        }
    }

    let mut stats = CrawlStatistics {
        snapshot_digest: snapshot.digest().to_string(),
        snapshot_items: snapshot.len(),
        snapshot_created_at: snapshot.metadata.created_at,
        status: None,
        started_at: None,
        last_updated_at: None,
        items_completed: 0,
        items_skipped: 0,
        items_failed: 0,
        pending_records: 0,
        resume_position: 0,
        shards_written: 0,
        shards_on_disk,
        paused: false,
        pause_file_present: pause_file.exists(),
        failed_item_ids: Vec::new(),
        skipped_item_ids: Vec::new(),
    };

    if let Some(progress) = progress {
        stats.status = Some(progress.status);
        stats.started_at = Some(progress.started_at);
        stats.last_updated_at = Some(progress.last_updated_at);
        stats.items_completed = progress.items_completed;
        stats.items_skipped = progress.items_skipped;
        stats.items_failed = progress.items_failed;
        stats.pending_records = progress.pending.len();
        stats.resume_position = progress.resume_position();
        stats.shards_written = progress.shards_written;
        stats.paused = progress.paused;
        stats.failed_item_ids = progress.failed_item_ids;
        stats.skipped_item_ids = progress.skipped_item_ids;
    }

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Snapshot:");
    println!("  Digest: {}", stats.snapshot_digest);
    println!("  Items: {}", stats.snapshot_items);
    println!("  Created: {}", stats.snapshot_created_at.to_rfc3339());
    println!();

    println!("Run:");
    match stats.status {
        Some(status) => println!("  Status: {}", status),
        None => println!("  Status: not started"),
    }
    if let Some(started) = stats.started_at {
        println!("  Started: {}", started.to_rfc3339());
    }
    if let Some(updated) = stats.last_updated_at {
        println!("  Last update: {}", updated.to_rfc3339());
    }
    if stats.pause_file_present {
        println!("  Pause requested (pause file present)");
    }
    println!();

    println!("Items:");
    let processed = stats.items_processed();
    for (label, count) in [
        ("Completed", stats.items_completed),
        ("Skipped", stats.items_skipped),
        ("Failed", stats.items_failed),
    ] {
        let percentage = if processed > 0 {
            (count as f64 / processed as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!("  Remaining: {}", stats.items_remaining());
    println!("  Resume position: {}", stats.resume_position);
    println!();

    println!("Checkpoints:");
    println!("  Shards written this run: {}", stats.shards_written);
    println!("  Shards on disk: {}", stats.shards_on_disk);
    println!("  Records awaiting a shard: {}", stats.pending_records);
    println!();

    if !stats.failed_item_ids.is_empty() {
        println!("Failed Items ({}):", stats.failed_item_ids.len());
        for id in stats.failed_item_ids.iter().take(20) {
            println!("  - {}", id);
        }
        if stats.failed_item_ids.len() > 20 {
            println!("  ... and {} more", stats.failed_item_ids.len() - 20);
        }
        println!();
    }

    println!(
        "Progress: {:.1}% ({} / {} items processed, {:.1}% successful)",
        stats.completion_rate(),
        processed,
        stats.snapshot_items,
        stats.success_rate()
    );
}
