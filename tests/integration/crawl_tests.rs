//! End-to-end crawl runs over a real checkpoint directory

use crate::common::{crawler_config, CrashingStore, PauseAfter, ScriptedFetcher};
use async_trait::async_trait;
use snapcrawl::crawler::{
    Coordinator, Delay, FetchResult, Fetcher, NoPause, PauseSignal, RecordingDelay,
};
use snapcrawl::merge::merge;
use snapcrawl::storage::{CheckpointStore, FsCheckpointStore, StorageError};
use snapcrawl::{CrawlError, RunState, Snapshot, WorkItem};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn hundred() -> Arc<Snapshot> {
    let ids: Vec<u64> = (1..=100).map(|n| 2_300_000 + n).collect();
    Arc::new(Snapshot::from_ids(&ids))
}

fn coordinator(
    snapshot: &Arc<Snapshot>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn CheckpointStore>,
    pause: Arc<dyn PauseSignal>,
    delay: Arc<dyn Delay>,
) -> Coordinator {
    Coordinator::new(
        snapshot.clone(),
        fetcher,
        store,
        pause,
        delay,
        &crawler_config(),
    )
}

#[tokio::test]
async fn test_full_run_checkpoints_and_paces() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = hundred();
    let fetcher = Arc::new(ScriptedFetcher::new());
    let delay = Arc::new(RecordingDelay::default());

    let report = coordinator(
        &snapshot,
        fetcher.clone(),
        store.clone(),
        Arc::new(NoPause),
        delay.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.items_attempted, 100);
    assert_eq!(report.progress.items_completed, 100);
    assert!(report.progress.pending.is_empty());
    assert_eq!(fetcher.calls(), snapshot.ids());

    // 25 records per shard
    assert_eq!(store.list_shards().unwrap().len(), 4);
    assert_eq!(report.progress.shards_written, 4);

    // No pacing after the last item: 99 waits, 9 of them batch boundaries.
    let waits = delay.recorded();
    assert_eq!(waits.len(), 99);
    assert_eq!(
        waits.iter().filter(|d| **d == Duration::from_secs(2)).count(),
        9
    );
    assert_eq!(delay.total(), Duration::from_secs(108));

    let persisted = store.read_progress().unwrap().unwrap();
    assert_eq!(persisted.status, RunState::Completed);
    assert_eq!(persisted.resume_position(), 100);
}

#[tokio::test]
async fn test_pause_and_resume_fetch_each_item_once() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = hundred();
    let fetcher = Arc::new(ScriptedFetcher::new());

    let paused = coordinator(
        &snapshot,
        fetcher.clone(),
        store.clone(),
        Arc::new(PauseAfter::new(37)),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(paused.state, RunState::Paused);
    assert_eq!(paused.items_attempted, 37);
    assert_eq!(paused.progress.resume_position(), 37);

    // Pausing flushes the partial shard.
    let persisted = store.read_progress().unwrap().unwrap();
    assert_eq!(persisted.status, RunState::Paused);
    assert!(persisted.paused);
    assert!(persisted.pending.is_empty());
    assert_eq!(merge(&[&*store], None).unwrap().records.len(), 37);

    let resumed = coordinator(
        &snapshot,
        fetcher.clone(),
        store.clone(),
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(resumed.state, RunState::Completed);
    assert_eq!(resumed.items_attempted, 63);
    assert_eq!(resumed.progress.items_completed, 100);
    assert_eq!(fetcher.calls(), snapshot.ids());

    let dataset = merge(&[&*store], Some(&snapshot)).unwrap();
    assert_eq!(dataset.report.unique_records, 100);
    assert_eq!(dataset.report.duplicates_removed, 0);
    let ids: Vec<u64> = dataset.records.iter().map(|r| r.match_id).collect();
    assert_eq!(ids, snapshot.ids());
}

#[tokio::test]
async fn test_crash_resumes_from_last_durable_progress() {
    let dir = TempDir::new().unwrap();
    let snapshot = hundred();

    // Writes: start, item 10, item 20, shard flush at 25; the write at item 30 fails.
    let crashing = Arc::new(CrashingStore::new(
        FsCheckpointStore::open(dir.path()).unwrap(),
        4,
    ));
    let first = Arc::new(ScriptedFetcher::new());
    let result = coordinator(
        &snapshot,
        first.clone(),
        crashing,
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await;

    assert!(matches!(result, Err(CrawlError::Storage(StorageError::Io(_)))));
    assert_eq!(first.calls().len(), 30);

    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let durable = store.read_progress().unwrap().unwrap();
    assert_eq!(durable.status, RunState::Running);
    assert_eq!(durable.resume_position(), 25);

    let second = Arc::new(ScriptedFetcher::new());
    let report = coordinator(
        &snapshot,
        second.clone(),
        store.clone(),
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(second.calls(), snapshot.ids()[25..].to_vec());
    assert_eq!(report.progress.items_completed, 100);

    let dataset = merge(&[&*store], Some(&snapshot)).unwrap();
    assert_eq!(dataset.report.unique_records, 100);
}

#[tokio::test]
async fn test_crash_between_shard_and_progress_merges_cleanly() {
    let dir = TempDir::new().unwrap();
    let snapshot = hundred();

    // Writes: start, item 10, item 20; the write after the shard at 25 fails.
    let crashing = Arc::new(CrashingStore::new(
        FsCheckpointStore::open(dir.path()).unwrap(),
        3,
    ));
    let first = Arc::new(ScriptedFetcher::new());
    let result = coordinator(
        &snapshot,
        first.clone(),
        crashing,
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await;

    assert!(matches!(result, Err(CrawlError::Storage(StorageError::Io(_)))));
    assert_eq!(first.calls().len(), 25);

    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    assert_eq!(store.list_shards().unwrap().len(), 1);
    let durable = store.read_progress().unwrap().unwrap();
    assert_eq!(durable.resume_position(), 20);
    assert_eq!(durable.pending.len(), 20);
    assert_eq!(durable.shards_written, 0);

    let second = Arc::new(ScriptedFetcher::new());
    let report = coordinator(
        &snapshot,
        second.clone(),
        store.clone(),
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(second.calls(), snapshot.ids()[20..].to_vec());
    assert_eq!(report.progress.items_completed, 100);

    // The orphaned shard holds items 1-25; the resumed run writes them again.
    let dataset = merge(&[&*store], Some(&snapshot)).unwrap();
    assert_eq!(dataset.report.shards_loaded, 5);
    assert_eq!(dataset.report.records_read, 125);
    assert_eq!(dataset.report.duplicates_removed, 25);
    assert_eq!(dataset.report.unique_records, 100);
    let ids: Vec<u64> = dataset.records.iter().map(|r| r.match_id).collect();
    assert_eq!(ids, snapshot.ids());
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = Arc::new(Snapshot::from_ids(&[7]));
    let fetcher = Arc::new(
        ScriptedFetcher::new().script(7, vec![FetchResult::retryable("HTTP 503")]),
    );
    let delay = Arc::new(RecordingDelay::default());

    let report = coordinator(
        &snapshot,
        fetcher.clone(),
        store.clone(),
        Arc::new(NoPause),
        delay.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(fetcher.calls_for(7), 4);
    assert_eq!(
        delay.recorded(),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(30)
        ]
    );
    assert_eq!(report.progress.items_failed, 1);
    assert_eq!(report.progress.failed_item_ids, vec![7]);
    assert_eq!(report.state, RunState::Completed);
}

#[tokio::test]
async fn test_permanent_failures_take_one_attempt() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = Arc::new(Snapshot::from_ids(&[1, 2, 3]));
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .script(1, vec![FetchResult::permanent("HTTP 404 (not found)")])
            .script(
                3,
                vec![FetchResult::Skipped {
                    reason: "forfeit".to_string(),
                }],
            ),
    );

    let report = coordinator(
        &snapshot,
        fetcher.clone(),
        store,
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(fetcher.calls(), vec![1, 2, 3]);
    assert_eq!(report.progress.items_completed, 1);
    assert_eq!(report.progress.items_skipped, 2);
    assert_eq!(report.progress.skipped_item_ids, vec![1, 3]);
    assert!(report.progress.failed_item_ids.is_empty());
}

#[tokio::test]
async fn test_completed_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = Arc::new(Snapshot::from_ids(&[1, 2, 3]));

    coordinator(
        &snapshot,
        Arc::new(ScriptedFetcher::new()),
        store.clone(),
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await
    .unwrap();

    let fetcher = Arc::new(ScriptedFetcher::new());
    let report = coordinator(
        &snapshot,
        fetcher.clone(),
        store.clone(),
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await
    .unwrap();

    assert!(report.already_completed);
    assert_eq!(report.items_attempted, 0);
    assert!(fetcher.calls().is_empty());
    assert_eq!(store.list_shards().unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_progress_aborts_without_overwrite() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    std::fs::write(store.progress_path(), "{ not json").unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new());

    let result = coordinator(
        &Arc::new(Snapshot::from_ids(&[1, 2])),
        fetcher.clone(),
        store.clone(),
        Arc::new(NoPause),
        Arc::new(RecordingDelay::default()),
    )
    .run()
    .await;

    assert!(matches!(
        result,
        Err(CrawlError::Storage(StorageError::CorruptProgress { .. }))
    ));
    assert!(fetcher.calls().is_empty());
    assert_eq!(
        std::fs::read_to_string(store.progress_path()).unwrap(),
        "{ not json"
    );
}

#[tokio::test]
async fn test_fresh_run_after_archive_keeps_old_shards() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = Arc::new(Snapshot::from_ids(&[1, 2, 3]));

    for _ in 0..2 {
        store.archive_progress().unwrap();
        coordinator(
            &snapshot,
            Arc::new(ScriptedFetcher::new()),
            store.clone(),
            Arc::new(NoPause),
            Arc::new(RecordingDelay::default()),
        )
        .run()
        .await
        .unwrap();
    }

    let dataset = merge(&[&*store], Some(&snapshot)).unwrap();
    assert_eq!(dataset.report.shards_found, 2);
    assert_eq!(dataset.report.duplicates_removed, 3);
    assert_eq!(dataset.report.unique_records, 3);
}

/// Hangs on the first attempt, answers on the next
struct HangsOnce {
    attempts: AtomicUsize,
}

#[async_trait]
impl Fetcher for HangsOnce {
    async fn fetch(&self, item: &WorkItem) -> FetchResult {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        FetchResult::Success(crate::common::record(item.id))
    }
}

#[tokio::test(start_paused = true)]
async fn test_hung_fetch_is_timed_out_and_retried() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsCheckpointStore::open(dir.path()).unwrap());
    let snapshot = Arc::new(Snapshot::from_ids(&[5]));
    let fetcher = Arc::new(HangsOnce {
        attempts: AtomicUsize::new(0),
    });
    let delay = Arc::new(RecordingDelay::default());

    let report = coordinator(&snapshot, fetcher.clone(), store, Arc::new(NoPause), delay.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(report.progress.items_completed, 1);
    assert_eq!(delay.recorded(), vec![Duration::from_secs(10)]);
}
