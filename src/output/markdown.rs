//! Markdown summary generation
//!
//! This module renders a human-readable report of a crawl: run state, item
//! outcomes, checkpoint counts and, when available, the last merge.

use crate::output::traits::{CrawlSummary, OutputResult};
use crate::storage::atomic_write;
use std::path::Path;

/// Writes the markdown summary to `output_path`
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);
    atomic_write(output_path, markdown.as_bytes())?;
    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let stats = &summary.statistics;
    let mut md = String::new();

    md.push_str("# Snapcrawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!(
        "- **Generated**: {}\n",
        summary.generated_at.to_rfc3339()
    ));
    md.push_str(&format!(
        "- **Status**: {}\n",
        stats
            .status
            .map(|s| s.as_str())
            .unwrap_or("not started")
    ));
    if let Some(started) = stats.started_at {
        md.push_str(&format!("- **Started**: {}\n", started.to_rfc3339()));
    }
    if let Some(updated) = stats.last_updated_at {
        md.push_str(&format!("- **Last Update**: {}\n", updated.to_rfc3339()));
    }
    if let (Some(started), Some(updated)) = (stats.started_at, stats.last_updated_at) {
        let seconds = (updated - started).num_seconds().max(0);
        md.push_str(&format!(
            "- **Elapsed**: {} seconds ({:.2} hours)\n",
            seconds,
            seconds as f64 / 3600.0
        ));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Snapshot\n\n");
    md.push_str(&format!("- **Digest**: {}\n", stats.snapshot_digest));
    md.push_str(&format!("- **Items**: {}\n", stats.snapshot_items));
    md.push_str(&format!(
        "- **Created**: {}\n\n",
        stats.snapshot_created_at.to_rfc3339()
    ));

    md.push_str("## Progress\n\n");
    md.push_str(&format!(
        "- **Processed**: {} / {} ({:.2}%)\n",
        stats.items_processed(),
        stats.snapshot_items,
        stats.completion_rate()
    ));
    md.push_str(&format!(
        "- **Resume Position**: {}\n",
        stats.resume_position
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        stats.success_rate()
    ));

    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Completed | {} |\n", stats.items_completed));
    md.push_str(&format!("| Skipped | {} |\n", stats.items_skipped));
    md.push_str(&format!("| Failed | {} |\n", stats.items_failed));
    md.push_str(&format!("| Remaining | {} |\n\n", stats.items_remaining()));

    md.push_str("## Checkpoints\n\n");
    md.push_str(&format!("- **Shards on Disk**: {}\n", stats.shards_on_disk));
    md.push_str(&format!(
        "- **Shards Written (current run)**: {}\n",
        stats.shards_written
    ));
    md.push_str(&format!(
        "- **Records Awaiting a Shard**: {}\n\n",
        stats.pending_records
    ));

    if let Some(merge) = &summary.merge {
        md.push_str("## Merge\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Shards Found | {} |\n", merge.shards_found));
        md.push_str(&format!("| Shards Loaded | {} |\n", merge.shards_loaded));
        md.push_str(&format!("| Shards Skipped | {} |\n", merge.skipped_shards));
        md.push_str(&format!("| Records Read | {} |\n", merge.records_read));
        md.push_str(&format!(
            "| Duplicates Removed | {} |\n",
            merge.duplicates_removed
        ));
        md.push_str(&format!("| Unique Records | {} |\n\n", merge.unique_records));

        if !merge.skipped_paths.is_empty() {
            md.push_str("### Skipped Shards\n\n");
            for path in &merge.skipped_paths {
                md.push_str(&format!("- {}\n", path.display()));
            }
            md.push('\n');
        }
    }

    if !stats.failed_item_ids.is_empty() {
        md.push_str("## Failed Items\n\n");
        md.push_str(&format!(
            "Total: {} (rebuild a snapshot from these with `--snapshot-from-failed`)\n\n",
            stats.failed_item_ids.len()
        ));
        for id in stats.failed_item_ids.iter().take(50) {
            md.push_str(&format!("- {}\n", id));
        }
        if stats.failed_item_ids.len() > 50 {
            md.push_str(&format!(
                "\n... and {} more\n\n",
                stats.failed_item_ids.len() - 50
            ));
        } else {
            md.push('\n');
        }
    }

    md
}
