//! Output traits and types
//!
//! This module defines the trait interface for dataset exporters and the
//! summary data the reports are rendered from.

use crate::merge::MergeReport;
use crate::record::MatchRecord;
use crate::state::RunState;
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Writes the canonical dataset in one format
///
/// Implementations must be deterministic: identical records produce
/// byte-identical files.
pub trait DatasetExporter {
    /// Short format name used in logs
    fn name(&self) -> &'static str;

    /// Writes `records` to `path`, replacing any previous export
    ///
    /// # Returns
    ///
    /// The number of records written
    fn export(&self, records: &[MatchRecord], path: &Path) -> OutputResult<usize>;
}

/// Where a crawl stands, as reported by `--status` and the markdown summary
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    pub snapshot_digest: String,
    pub snapshot_items: usize,
    pub snapshot_created_at: DateTime<Utc>,

    /// `None` when no progress has been written yet
    pub status: Option<RunState>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,

    pub items_completed: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub pending_records: usize,
    pub resume_position: usize,
    pub shards_written: usize,
    pub shards_on_disk: usize,
    pub paused: bool,
    pub pause_file_present: bool,

    pub failed_item_ids: Vec<u64>,
    pub skipped_item_ids: Vec<u64>,
}

impl CrawlStatistics {
    pub fn items_processed(&self) -> usize {
        self.items_completed + self.items_skipped + self.items_failed
    }

    pub fn items_remaining(&self) -> usize {
        self.snapshot_items.saturating_sub(self.resume_position)
    }

    /// Share of the snapshot with a terminal outcome, in percent
    pub fn completion_rate(&self) -> f64 {
        percentage(self.items_processed(), self.snapshot_items)
    }

    /// Share of processed items that produced a record, in percent
    pub fn success_rate(&self) -> f64 {
        percentage(self.items_completed, self.items_processed())
    }
}

/// Everything the markdown summary shows
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSummary {
    pub generated_at: DateTime<Utc>,
    pub config_hash: String,
    pub statistics: CrawlStatistics,
    pub merge: Option<MergeReport>,
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
