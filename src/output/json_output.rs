//! Nested JSON export

use crate::output::traits::{DatasetExporter, OutputResult};
use crate::record::MatchRecord;
use crate::storage::atomic_write;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct JsonDocument<'a> {
    total_matches: usize,
    matches: &'a [MatchRecord],
}

/// Writes the dataset as one pretty-printed JSON document
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExporter;

impl DatasetExporter for JsonExporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn export(&self, records: &[MatchRecord], path: &Path) -> OutputResult<usize> {
        let document = JsonDocument {
            total_matches: records.len(),
            matches: records,
        };
        let mut json = serde_json::to_string_pretty(&document)?;
        json.push('\n');
        atomic_write(path, json.as_bytes())?;
        Ok(records.len())
    }
}
