//! Shared fixtures for the integration tests

use async_trait::async_trait;
use chrono::Utc;
use snapcrawl::config::CrawlerConfig;
use snapcrawl::crawler::{FetchResult, Fetcher, PauseSignal};
use snapcrawl::record::{MatchRecord, RecentForm, RecordMetadata, TeamResult, Winner};
use snapcrawl::storage::{
    CheckpointStore, FsCheckpointStore, Shard, ShardEntry, ShardHandle, StorageError,
    StorageResult,
};
use snapcrawl::{ProgressState, WorkItem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn record(id: u64) -> MatchRecord {
    MatchRecord {
        match_id: id,
        season: 1,
        date: None,
        tournament: Some(format!("Event {}", id % 7)),
        event_type: Default::default(),
        team1: TeamResult {
            name: format!("Team {}", id),
            score: 2,
        },
        team2: TeamResult {
            name: format!("Team {}", id + 1),
            score: 1,
        },
        winner: Winner::Team1,
        past_3_months: RecentForm::default(),
        map_veto: Default::default(),
        head_to_head: Default::default(),
        metadata: RecordMetadata {
            source_url: format!("https://www.example.org/matches/{}/-", id),
            scraped_at: Utc::now(),
        },
    }
}

/// Crawler settings with pacing left at real-world values; tests inject a
/// recording delay so nothing actually sleeps.
pub fn crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        item_delay_ms: 1000,
        batch_size: 10,
        batch_delay_ms: 2000,
        max_retries: 3,
        backoff_base_ms: 10_000,
        checkpoint_every: 25,
        progress_every: 10,
        ..CrawlerConfig::default()
    }
}

/// Replies per id from a script; ids without a script succeed
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<u64, Vec<FetchResult>>>,
    calls: Mutex<Vec<u64>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues results for `id`; the last one repeats once the queue runs dry
    pub fn script(self, id: u64, results: Vec<FetchResult>) -> Self {
        self.scripts.lock().unwrap().insert(id, results);
        self
    }

    /// Every fetched id, in call order
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: u64) -> usize {
        self.calls().iter().filter(|&&c| c == id).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, item: &WorkItem) -> FetchResult {
        self.calls.lock().unwrap().push(item.id);
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&item.id) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => FetchResult::Success(record(item.id)),
        }
    }
}

/// Requests a pause once it has been polled more than `allowed` times
pub struct PauseAfter {
    allowed: usize,
    polls: AtomicUsize,
}

impl PauseAfter {
    pub fn new(allowed: usize) -> Self {
        Self {
            allowed,
            polls: AtomicUsize::new(0),
        }
    }
}

impl PauseSignal for PauseAfter {
    fn is_pause_requested(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) >= self.allowed
    }
}

/// A checkpoint store whose progress writes start failing after a budget,
/// standing in for a process killed mid-run
pub struct CrashingStore {
    inner: FsCheckpointStore,
    progress_writes_allowed: usize,
    progress_writes: AtomicUsize,
}

impl CrashingStore {
    pub fn new(inner: FsCheckpointStore, progress_writes_allowed: usize) -> Self {
        Self {
            inner,
            progress_writes_allowed,
            progress_writes: AtomicUsize::new(0),
        }
    }
}

impl CheckpointStore for CrashingStore {
    fn read_progress(&self) -> StorageResult<Option<ProgressState>> {
        self.inner.read_progress()
    }

    fn write_progress(&self, state: &ProgressState) -> StorageResult<()> {
        let n = self.progress_writes.fetch_add(1, Ordering::SeqCst);
        if n >= self.progress_writes_allowed {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk went away",
            )));
        }
        self.inner.write_progress(state)
    }

    fn append_shard(&self, entries: &[ShardEntry]) -> StorageResult<ShardHandle> {
        self.inner.append_shard(entries)
    }

    fn list_shards(&self) -> StorageResult<Vec<ShardHandle>> {
        self.inner.list_shards()
    }

    fn read_shard(&self, handle: &ShardHandle) -> StorageResult<Shard> {
        self.inner.read_shard(handle)
    }
}
