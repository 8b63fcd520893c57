//! Persisted crawl progress
//!
//! `ProgressState` is a plain value. The orchestrator folds every terminal
//! item outcome into it with [`ProgressState::apply`] and hands the result to
//! the checkpoint store; nothing else mutates it.

use crate::record::MatchRecord;
use crate::state::RunState;
use crate::storage::ShardEntry;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one work item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// A record was produced
    Completed(MatchRecord),

    /// Permanently not collectable (not found, forfeit, key mismatch, ...)
    Skipped { reason: String },

    /// Retry budget exhausted on a transient failure
    Failed { error: String },
}

/// How far a crawl over one snapshot got
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Digest of the snapshot this progress belongs to
    pub snapshot_digest: String,

    pub items_completed: usize,
    pub items_skipped: usize,
    pub items_failed: usize,

    /// Ids that exhausted their retries; candidates for a re-crawl snapshot
    #[serde(default)]
    pub failed_item_ids: Vec<u64>,

    #[serde(default)]
    pub skipped_item_ids: Vec<u64>,

    /// Position of the last item with a terminal outcome
    pub last_item_position: Option<usize>,

    pub shards_written: usize,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,

    /// Mirrors `status == paused`
    pub paused: bool,
    pub status: RunState,

    /// Completed records not yet flushed to a shard
    #[serde(default)]
    pub pending: Vec<ShardEntry>,
}

impl ProgressState {
    /// Zero state for a snapshot that has never been crawled
    pub fn new(snapshot_digest: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            snapshot_digest: snapshot_digest.into(),
            items_completed: 0,
            items_skipped: 0,
            items_failed: 0,
            failed_item_ids: Vec::new(),
            skipped_item_ids: Vec::new(),
            last_item_position: None,
            shards_written: 0,
            started_at: now,
            last_updated_at: now,
            paused: false,
            status: RunState::Idle,
            pending: Vec::new(),
        }
    }

    /// First snapshot position that has not reached a terminal outcome
    pub fn resume_position(&self) -> usize {
        self.last_item_position.map_or(0, |p| p + 1)
    }

    /// Items with any terminal outcome
    pub fn items_processed(&self) -> usize {
        self.items_completed + self.items_skipped + self.items_failed
    }

    /// Folds the terminal outcome of the item at `position` into the state
    ///
    /// Positions must arrive in increasing order; an outcome for a position
    /// at or before `last_item_position` is ignored so a replayed item can
    /// never be counted twice.
    pub fn apply(mut self, position: usize, outcome: ItemOutcome) -> Self {
        if self.last_item_position.is_some_and(|last| position <= last) {
            tracing::warn!(
                "Ignoring outcome for position {} (already past {:?})",
                position,
                self.last_item_position
            );
            return self;
        }

        match outcome {
            ItemOutcome::Completed(record) => {
                self.items_completed += 1;
                self.pending.push(ShardEntry { position, record });
            }
            ItemOutcome::Skipped { reason } => {
                tracing::debug!("Position {} skipped: {}", position, reason);
                self.items_skipped += 1;
            }
            ItemOutcome::Failed { error } => {
                tracing::debug!("Position {} failed: {}", position, error);
                self.items_failed += 1;
            }
        }

        self.last_item_position = Some(position);
        self.last_updated_at = Utc::now();
        self
    }

    /// Same as [`apply`](Self::apply), additionally recording the item id
    /// against skipped or failed outcomes
    pub fn apply_item(mut self, id: u64, position: usize, outcome: ItemOutcome) -> Self {
        if self.last_item_position.is_some_and(|last| position <= last) {
            return self.apply(position, outcome);
        }
        match &outcome {
            ItemOutcome::Skipped { .. } => self.skipped_item_ids.push(id),
            ItemOutcome::Failed { .. } => self.failed_item_ids.push(id),
            ItemOutcome::Completed(_) => {}
        }
        self.apply(position, outcome)
    }

    /// Moves to `next`, rejecting transitions the lifecycle forbids
    pub fn transition(mut self, next: RunState) -> Result<Self, CrawlError> {
        if !self.status.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.paused = next == RunState::Paused;
        self.last_updated_at = Utc::now();
        Ok(self)
    }

    /// Re-enters `Idle` after loading a progress file left by an interrupted
    /// process (status still `running`)
    pub fn recovered(mut self) -> Self {
        if self.status == RunState::Running {
            self.status = RunState::Idle;
            self.paused = false;
        }
        self
    }

    /// Removes the unflushed records, counting one more shard
    pub fn take_pending(&mut self) -> Vec<ShardEntry> {
        self.shards_written += 1;
        std::mem::take(&mut self.pending)
    }
}
