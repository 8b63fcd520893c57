//! Merging shards across runs and exporting the canonical dataset

use crate::common::record;
use snapcrawl::config::OutputConfig;
use snapcrawl::merge::{merge, merge_dirs};
use snapcrawl::output::export_dataset;
use snapcrawl::record::MatchRecord;
use snapcrawl::storage::{CheckpointStore, FsCheckpointStore, ShardEntry};
use snapcrawl::Snapshot;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn entry(position: usize, id: u64, tournament: &str) -> ShardEntry {
    let mut record: MatchRecord = record(id);
    record.tournament = Some(tournament.to_string());
    ShardEntry { position, record }
}

fn output_config(dir: &Path, tag: &str) -> OutputConfig {
    OutputConfig {
        checkpoint_dir: dir.join("checkpoints"),
        pause_file: None,
        merged_csv: dir.join(format!("{}.csv", tag)),
        merged_json: dir.join(format!("{}.json", tag)),
        database_path: Some(dir.join(format!("{}.db", tag))),
        summary_path: dir.join(format!("{}.md", tag)),
    }
}

/// Shard timestamps have millisecond resolution
fn next_millisecond() {
    std::thread::sleep(Duration::from_millis(5));
}

#[test]
fn test_later_run_wins_across_directories() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    FsCheckpointStore::open(first.path())
        .unwrap()
        .append_shard(&[entry(0, 1, "a"), entry(1, 2, "b")])
        .unwrap();
    next_millisecond();
    FsCheckpointStore::open(second.path())
        .unwrap()
        .append_shard(&[entry(0, 1, "a2"), entry(2, 3, "c")])
        .unwrap();

    let dataset = merge_dirs(
        &[second.path().to_path_buf(), first.path().to_path_buf()],
        None,
    )
    .unwrap();

    let ids: Vec<u64> = dataset.records.iter().map(|r| r.match_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(dataset.records[0].tournament.as_deref(), Some("a2"));
    assert_eq!(dataset.records[1].tournament.as_deref(), Some("b"));
    assert_eq!(dataset.records[2].tournament.as_deref(), Some("c"));
    assert_eq!(dataset.report.shards_found, 2);
    assert_eq!(dataset.report.records_read, 4);
    assert_eq!(dataset.report.duplicates_removed, 1);
    assert_eq!(dataset.report.unique_records, 3);
}

#[test]
fn test_merge_and_export_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::open(&dir.path().join("checkpoints")).unwrap();
    store
        .append_shard(&[entry(0, 10, "x"), entry(1, 11, "y"), entry(2, 12, "z")])
        .unwrap();
    next_millisecond();
    store
        .append_shard(&[entry(1, 11, "y2"), entry(3, 13, "w")])
        .unwrap();
    let snapshot = Snapshot::from_ids(&[10, 11, 12, 13]);

    let first = merge(&[&store], Some(&snapshot)).unwrap();
    let second = merge(&[&store], Some(&snapshot)).unwrap();
    assert_eq!(first, second);

    let a = output_config(dir.path(), "a");
    let b = output_config(dir.path(), "b");
    let written = export_dataset(&first, &a).unwrap();
    export_dataset(&second, &b).unwrap();

    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|f| f.records == 4));
    assert_eq!(
        std::fs::read(&a.merged_csv).unwrap(),
        std::fs::read(&b.merged_csv).unwrap()
    );
    assert_eq!(
        std::fs::read(&a.merged_json).unwrap(),
        std::fs::read(&b.merged_json).unwrap()
    );

    // Exporting again over the same files changes nothing.
    let before = std::fs::read(&a.merged_json).unwrap();
    export_dataset(&first, &a).unwrap();
    assert_eq!(std::fs::read(&a.merged_json).unwrap(), before);
}

#[test]
fn test_incomplete_shard_is_skipped_and_counted() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::open(dir.path()).unwrap();
    store.append_shard(&[entry(0, 1, "a")]).unwrap();
    next_millisecond();
    let torn = store
        .append_shard(&[entry(1, 2, "b"), entry(2, 3, "c")])
        .unwrap();

    // Drop the trailer, as if the process died mid-write.
    let content = std::fs::read_to_string(&torn.path).unwrap();
    let cut: Vec<&str> = content.lines().collect();
    std::fs::write(&torn.path, cut[..cut.len() - 1].join("\n")).unwrap();

    let dataset = merge(&[&store], None).unwrap();

    assert_eq!(dataset.report.shards_found, 2);
    assert_eq!(dataset.report.shards_loaded, 1);
    assert_eq!(dataset.report.skipped_shards, 1);
    assert_eq!(dataset.report.skipped_paths, vec![torn.path.clone()]);
    assert_eq!(dataset.records.len(), 1);
}

#[test]
fn test_temp_files_are_never_merged() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::open(dir.path()).unwrap();
    let handle = store.append_shard(&[entry(0, 1, "a")]).unwrap();

    let name = handle.path.file_name().unwrap().to_string_lossy().into_owned();
    std::fs::write(store.shards_dir().join(format!(".{}.tmp", name)), "partial").unwrap();

    let dataset = merge(&[&store], None).unwrap();
    assert_eq!(dataset.report.shards_found, 1);
    assert_eq!(dataset.report.skipped_shards, 0);
}

#[test]
fn test_output_follows_snapshot_order() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::open(dir.path()).unwrap();
    store
        .append_shard(&[entry(0, 300, "x"), entry(1, 100, "y"), entry(2, 200, "z")])
        .unwrap();

    let by_position = merge(&[&store], None).unwrap();
    let ids: Vec<u64> = by_position.records.iter().map(|r| r.match_id).collect();
    assert_eq!(ids, vec![300, 100, 200]);

    let snapshot = Snapshot::from_ids(&[200, 100, 300]);
    let by_snapshot = merge(&[&store], Some(&snapshot)).unwrap();
    let ids: Vec<u64> = by_snapshot.records.iter().map(|r| r.match_id).collect();
    assert_eq!(ids, vec![200, 100, 300]);
}
