//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint stores and
//! associated error types.

use crate::state::ProgressState;
use crate::storage::{Shard, ShardEntry, ShardHandle};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Progress file {path} is corrupt: {message}")]
    CorruptProgress { path: PathBuf, message: String },

    #[error("Shard {path} is incomplete: {reason}")]
    IncompleteShard { path: PathBuf, reason: String },

    #[error("Shard already exists: {0}")]
    ShardExists(PathBuf),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint store implementations
///
/// A store owns one checkpoint directory: a single progress record and an
/// append-only set of shards. Writes are atomic; a reader never observes a
/// half-written progress file or shard.
pub trait CheckpointStore: Send + Sync {
    // ===== Progress =====

    /// Reads the progress record
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - No crawl has written progress here yet
    /// * `Err(StorageError::CorruptProgress)` - The file exists but cannot be parsed
    fn read_progress(&self) -> StorageResult<Option<ProgressState>>;

    /// Atomically replaces the progress record
    fn write_progress(&self, state: &ProgressState) -> StorageResult<()>;

    // ===== Shards =====

    /// Writes a new, immutable shard holding `entries`
    ///
    /// The shard's sequence number continues after the highest existing one.
    fn append_shard(&self, entries: &[ShardEntry]) -> StorageResult<ShardHandle>;

    /// Lists complete shard files ordered by `(written_at, sequence)`
    fn list_shards(&self) -> StorageResult<Vec<ShardHandle>>;

    /// Reads and verifies one shard
    fn read_shard(&self, handle: &ShardHandle) -> StorageResult<Shard>;
}
