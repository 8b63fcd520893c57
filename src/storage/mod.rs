//! Storage module for persisting crawl checkpoints
//!
//! This module handles everything the crawler writes while it runs:
//! - The progress record, atomically replaced
//! - Immutable JSON-lines record shards, one per flush
//! - Archiving old progress for fresh runs

mod files;
mod shard;
mod traits;

pub use files::{atomic_write, FsCheckpointStore};
pub use shard::{Shard, ShardEntry, ShardHandle, ShardHeader, SHARD_FORMAT, SHARD_VERSION};
pub use traits::{CheckpointStore, StorageError, StorageResult};

use crate::CrawlError;
use std::path::Path;

/// Opens or creates a checkpoint directory
///
/// # Arguments
///
/// * `path` - Path to the checkpoint directory
///
/// # Returns
///
/// * `Ok(FsCheckpointStore)` - Store ready for reading and writing
/// * `Err(CrawlError)` - The directory could not be created
pub fn open_store(path: &Path) -> Result<FsCheckpointStore, CrawlError> {
    Ok(FsCheckpointStore::open(path)?)
}
