//! Output module for exports, summaries and status reports
//!
//! This module handles:
//! - Exporting the merged dataset as CSV, JSON and SQLite
//! - Generating markdown summaries of a crawl
//! - Printing crawl statistics

mod csv_output;
mod json_output;
mod markdown;
mod sqlite_output;
pub mod stats;
mod traits;

pub use csv_output::CsvExporter;
pub use json_output::JsonExporter;
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use sqlite_output::{initialize_schema, SqliteExporter, SCHEMA_SQL};
pub use stats::{load_statistics, print_statistics};
pub use traits::{CrawlStatistics, CrawlSummary, DatasetExporter, OutputError, OutputResult};

use crate::config::OutputConfig;
use crate::merge::CanonicalDataset;
use std::path::PathBuf;

/// One written export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub format: &'static str,
    pub path: PathBuf,
    pub records: usize,
}

/// Writes the dataset to every configured export target
///
/// CSV and JSON are always written; SQLite only when `database-path` is set.
pub fn export_dataset(
    dataset: &CanonicalDataset,
    config: &OutputConfig,
) -> OutputResult<Vec<ExportedFile>> {
    let mut targets: Vec<(Box<dyn DatasetExporter>, PathBuf)> = vec![
        (Box::new(CsvExporter), config.merged_csv.clone()),
        (Box::new(JsonExporter), config.merged_json.clone()),
    ];
    if let Some(db) = &config.database_path {
        targets.push((Box::new(SqliteExporter), db.clone()));
    }

    let mut written = Vec::with_capacity(targets.len());
    for (exporter, path) in targets {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let records = exporter.export(&dataset.records, &path)?;
        tracing::info!(
            "Exported {} records as {} to {}",
            records,
            exporter.name(),
            path.display()
        );
        written.push(ExportedFile {
            format: exporter.name(),
            path,
            records,
        });
    }

    Ok(written)
}
