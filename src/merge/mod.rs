//! Checkpoint merger
//!
//! Reconciles the shards of any number of runs into one canonical dataset:
//! one record per `match_id`, the most recently written copy winning, ordered
//! by snapshot position.

use crate::record::MatchRecord;
use crate::snapshot::Snapshot;
use crate::storage::{CheckpointStore, FsCheckpointStore, StorageResult};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Counts describing one merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub shards_found: usize,
    pub shards_loaded: usize,
    pub skipped_shards: usize,
    pub records_read: usize,
    pub duplicates_removed: usize,
    pub unique_records: usize,
    /// Shards that could not be read or were incomplete
    pub skipped_paths: Vec<PathBuf>,
}

/// The deduplicated, ordered union of all shards
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalDataset {
    pub records: Vec<MatchRecord>,
    pub report: MergeReport,
}

/// Merges the shards of every given store
///
/// Shards are folded in ascending `(written_at, sequence)` order across all
/// stores, so for a repeated `match_id` the copy from the most recently
/// written shard wins. Unreadable or incomplete shards are logged, counted
/// and skipped; only a failure to list a store is an error.
///
/// Output order is the snapshot position of each id when `snapshot` is given,
/// otherwise the position stored with the record; ties break on `match_id`.
/// Records whose id is not in the supplied snapshot follow all others.
pub fn merge(
    stores: &[&dyn CheckpointStore],
    snapshot: Option<&Snapshot>,
) -> StorageResult<CanonicalDataset> {
    let mut ordered = Vec::new();
    for (source, store) in stores.iter().enumerate() {
        ordered.extend(store.list_shards()?.into_iter().map(|handle| (handle, source)));
    }
    ordered.sort();

    let mut report = MergeReport {
        shards_found: ordered.len(),
        ..MergeReport::default()
    };
    let mut latest: HashMap<u64, (usize, MatchRecord)> = HashMap::new();

    for (handle, source) in &ordered {
        let shard = match stores[*source].read_shard(handle) {
            Ok(shard) => shard,
            Err(e) => {
                tracing::warn!("Skipping shard {}: {}", handle.path.display(), e);
                report.skipped_shards += 1;
                report.skipped_paths.push(handle.path.clone());
                continue;
            }
        };

        report.shards_loaded += 1;
        for entry in shard.entries {
            report.records_read += 1;
            if latest
                .insert(entry.record.match_id, (entry.position, entry.record))
                .is_some()
            {
                report.duplicates_removed += 1;
            }
        }
    }

    let index = snapshot.map(|s| s.position_index());
    let mut keyed: Vec<((u8, usize, u64), MatchRecord)> = latest
        .into_iter()
        .map(|(id, (stored_position, record))| {
            let key = match &index {
                Some(index) => match index.get(&id) {
                    Some(&position) => (0, position, id),
                    None => (1, stored_position, id),
                },
                None => (0, stored_position, id),
            };
            (key, record)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let records: Vec<MatchRecord> = keyed.into_iter().map(|(_, record)| record).collect();
    report.unique_records = records.len();

    tracing::info!(
        "Merged {} of {} shards: {} records read, {} duplicates removed, {} unique records",
        report.shards_loaded,
        report.shards_found,
        report.records_read,
        report.duplicates_removed,
        report.unique_records
    );
    if report.skipped_shards > 0 {
        tracing::warn!("{} shards skipped", report.skipped_shards);
    }

    Ok(CanonicalDataset { records, report })
}

/// Opens every checkpoint directory and merges their shards together
///
/// A directory that does not exist contributes nothing.
pub fn merge_dirs(dirs: &[PathBuf], snapshot: Option<&Snapshot>) -> StorageResult<CanonicalDataset> {
    let mut stores = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !dir.exists() {
            tracing::warn!("Checkpoint directory {} does not exist", dir.display());
            continue;
        }
        tracing::info!("Merging checkpoints from {}", dir.display());
        stores.push(FsCheckpointStore::open(dir)?);
    }

    let stores: Vec<&dyn CheckpointStore> =
        stores.iter().map(|s| s as &dyn CheckpointStore).collect();
    merge(&stores, snapshot)
}
