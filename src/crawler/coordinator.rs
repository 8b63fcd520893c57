//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Loading and validating persisted progress against the snapshot
//! - Walking the snapshot strictly in position order
//! - Retrying transient failures with a bounded backoff
//! - Flushing record shards and progress
//! - Handling pause requests and resumption

use crate::config::CrawlerConfig;
use crate::crawler::pause::PauseSignal;
use crate::crawler::scheduler::{Delay, Scheduler};
use crate::crawler::{FetchResult, Fetcher};
use crate::snapshot::{Snapshot, WorkItem};
use crate::state::{ItemOutcome, ProgressState, RunState};
use crate::storage::{CheckpointStore, StorageError};
use crate::CrawlError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Checkpoint cadence and per-attempt timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    /// Completed records per shard
    pub checkpoint_every: usize,
    /// Items (any outcome) between progress writes
    pub progress_every: usize,
    /// Upper bound on one fetch attempt
    pub fetch_timeout: Duration,
}

impl CheckpointPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            checkpoint_every: config.checkpoint_every.max(1),
            progress_every: config.progress_every.max(1),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// How a call to [`Coordinator::run`] ended
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// `Completed` or `Paused`
    pub state: RunState,
    /// True when the progress was already `completed` and nothing ran
    pub already_completed: bool,
    /// Items fetched by this call
    pub items_attempted: usize,
    pub progress: ProgressState,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    snapshot: Arc<Snapshot>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn CheckpointStore>,
    pause: Arc<dyn PauseSignal>,
    scheduler: Scheduler,
    policy: CheckpointPolicy,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The frozen queue to walk
    /// * `fetcher` - Turns work items into records
    /// * `store` - Where progress and shards go
    /// * `pause` - Polled between items
    /// * `delay` - Used for pacing and retry backoff
    /// * `config` - Pacing, retry and checkpoint settings
    pub fn new(
        snapshot: Arc<Snapshot>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn CheckpointStore>,
        pause: Arc<dyn PauseSignal>,
        delay: Arc<dyn Delay>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            snapshot,
            fetcher,
            store,
            pause,
            scheduler: Scheduler::from_config(config, delay),
            policy: CheckpointPolicy::from_config(config),
        }
    }

    /// Loads the progress for this snapshot, or a zero state if none exists
    ///
    /// A progress file that cannot be parsed, or that belongs to a different
    /// snapshot, is an error: the run must not guess where to continue.
    pub fn load_progress(&self) -> Result<ProgressState, CrawlError> {
        let digest = self.snapshot.digest();
        let state = match self.store.read_progress() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::info!("No progress found, starting fresh over {} items", self.snapshot.len());
                return Ok(ProgressState::new(digest));
            }
            Err(e @ StorageError::CorruptProgress { .. }) => {
                tracing::error!("Aborting: {}", e);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        if state.snapshot_digest != digest {
            tracing::error!(
                "Aborting: progress belongs to snapshot {}, loaded snapshot is {}",
                state.snapshot_digest,
                digest
            );
            return Err(CrawlError::SnapshotMismatch {
                expected: digest.to_string(),
                found: state.snapshot_digest,
            });
        }

        Ok(state)
    }

    /// Runs the crawl loop until the snapshot is exhausted or a pause is requested
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let state = self.load_progress()?;

        match state.status {
            RunState::Completed => {
                tracing::info!(
                    "Crawl already completed ({} records, {} skipped, {} failed); nothing to do",
                    state.items_completed,
                    state.items_skipped,
                    state.items_failed
                );
                return Ok(CrawlReport {
                    state: RunState::Completed,
                    already_completed: true,
                    items_attempted: 0,
                    progress: state,
                });
            }
            RunState::Aborted => {
                tracing::error!("Progress is marked aborted; refusing to continue");
                return Err(CrawlError::Abandoned);
            }
            RunState::Running => {
                tracing::warn!(
                    "Previous run was interrupted; resuming at position {}",
                    state.resume_position()
                );
            }
            RunState::Paused => {
                tracing::info!("Resuming paused crawl at position {}", state.resume_position());
            }
            RunState::Idle => {}
        }

        let mut state = state.recovered().transition(RunState::Running)?;
        self.store.write_progress(&state).map_err(|e| abort(e.into()))?;

        let start = state.resume_position();
        let items = self.snapshot.items_from(start);
        let started = Instant::now();
        let mut attempted = 0;

        tracing::info!(
            "Crawling positions {}..{} ({} remaining)",
            start,
            self.snapshot.len(),
            items.len()
        );

        for (index, item) in items.iter().enumerate() {
            if self.pause.is_pause_requested() {
                return self.pause_run(state, attempted);
            }

            let outcome = self.process_item(item).await;
            attempted += 1;
            state = state.apply_item(item.id, item.position, outcome);

            if state.pending.len() >= self.policy.checkpoint_every {
                state = self.flush(state)?;
            } else if attempted % self.policy.progress_every == 0 {
                self.store.write_progress(&state).map_err(|e| abort(e.into()))?;
            }

            if attempted % 100 == 0 {
                let rate = attempted as f64 / started.elapsed().as_secs_f64().max(0.001);
                tracing::info!(
                    "Progress: {}/{} items ({} completed, {} skipped, {} failed), {:.2} items/sec",
                    state.items_processed(),
                    self.snapshot.len(),
                    state.items_completed,
                    state.items_skipped,
                    state.items_failed,
                    rate
                );
            }

            if index + 1 < items.len() {
                self.scheduler.pace(item.position).await;
            }
        }

        self.finish(state, attempted)
    }

    /// Fetches one item, retrying transient failures
    ///
    /// Returns the terminal outcome; at most `max_retries + 1` attempts are made.
    pub async fn process_item(&self, item: &WorkItem) -> ItemOutcome {
        let retry = self.scheduler.retry_policy();
        let max_attempts = retry.max_attempts();
        let mut attempt = 1;

        loop {
            let result =
                match tokio::time::timeout(self.policy.fetch_timeout, self.fetcher.fetch(item))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => FetchResult::retryable(format!(
                        "attempt timed out after {:?}",
                        self.policy.fetch_timeout
                    )),
                };

            match result {
                FetchResult::Success(record) if record.match_id == item.id => {
                    tracing::debug!("Item {} (position {}) completed", item.id, item.position);
                    return ItemOutcome::Completed(record);
                }
                FetchResult::Success(record) => {
                    tracing::warn!(
                        "Item {} returned a record for {}; skipping",
                        item.id,
                        record.match_id
                    );
                    return ItemOutcome::Skipped {
                        reason: format!("record key {} does not match item", record.match_id),
                    };
                }
                FetchResult::Skipped { reason } => {
                    tracing::info!("Item {} skipped: {}", item.id, reason);
                    return ItemOutcome::Skipped { reason };
                }
                FetchResult::Failed {
                    error,
                    retryable: false,
                } => {
                    tracing::info!("Item {} skipped after permanent failure: {}", item.id, error);
                    return ItemOutcome::Skipped { reason: error };
                }
                FetchResult::Failed {
                    error,
                    retryable: true,
                } => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            "Item {} failed after {} attempts: {}",
                            item.id,
                            attempt,
                            error
                        );
                        return ItemOutcome::Failed { error };
                    }

                    tracing::warn!(
                        "Item {} attempt {}/{} failed ({}); retrying in {:?}",
                        item.id,
                        attempt,
                        max_attempts,
                        error,
                        retry.delay_for(attempt)
                    );
                    self.scheduler.backoff(attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Writes the pending records to a new shard, then the progress
    fn flush(&self, mut state: ProgressState) -> Result<ProgressState, CrawlError> {
        if state.pending.is_empty() {
            self.store.write_progress(&state).map_err(|e| abort(e.into()))?;
            return Ok(state);
        }

        // The shard must exist before progress stops listing its records as pending.
        let handle = self
            .store
            .append_shard(&state.pending)
            .map_err(|e| abort(e.into()))?;
        let entries = state.take_pending();
        self.store.write_progress(&state).map_err(|e| abort(e.into()))?;

        tracing::info!(
            "Checkpoint: {} records written to {}",
            entries.len(),
            handle.path.display()
        );
        Ok(state)
    }

    fn pause_run(&self, state: ProgressState, attempted: usize) -> Result<CrawlReport, CrawlError> {
        let state = self.flush(state)?.transition(RunState::Paused)?;
        self.store.write_progress(&state).map_err(|e| abort(e.into()))?;

        tracing::info!(
            "Paused at position {} ({} of {} items processed); run again to resume",
            state.resume_position(),
            state.items_processed(),
            self.snapshot.len()
        );

        Ok(CrawlReport {
            state: RunState::Paused,
            already_completed: false,
            items_attempted: attempted,
            progress: state,
        })
    }

    fn finish(&self, state: ProgressState, attempted: usize) -> Result<CrawlReport, CrawlError> {
        let state = self.flush(state)?.transition(RunState::Completed)?;
        self.store.write_progress(&state).map_err(|e| abort(e.into()))?;

        tracing::info!(
            "Crawl completed: {} records, {} skipped, {} failed, {} shards",
            state.items_completed,
            state.items_skipped,
            state.items_failed,
            state.shards_written
        );
        if !state.failed_item_ids.is_empty() {
            tracing::warn!(
                "{} items exhausted their retries; re-crawl them with --snapshot-from-failed",
                state.failed_item_ids.len()
            );
        }

        Ok(CrawlReport {
            state: RunState::Completed,
            already_completed: false,
            items_attempted: attempted,
            progress: state,
        })
    }
}

/// Persists `aborted` after operator abandonment
///
/// Later runs over this checkpoint directory refuse to continue.
pub fn abandon(store: &dyn CheckpointStore, snapshot: &Snapshot) -> Result<ProgressState, CrawlError> {
    let state = match store.read_progress()? {
        Some(state) => state,
        None => ProgressState::new(snapshot.digest()),
    };

    if state.status.is_terminal() {
        tracing::info!("Crawl already {}; nothing to abandon", state.status);
        return Ok(state);
    }

    let state = state.recovered().transition(RunState::Aborted)?;
    store.write_progress(&state)?;
    tracing::warn!("Crawl abandoned at position {}", state.resume_position());
    Ok(state)
}

/// Logs an unrecoverable error on its way out of the run
///
/// Progress is not rewritten: the last persisted state stays valid and a
/// later run continues from it.
fn abort(e: CrawlError) -> CrawlError {
    tracing::error!("Aborting crawl: {}", e);
    e
}
