//! Snapcrawl: a resumable crawler for large, rate-limited result archives
//!
//! This crate freezes an ordered snapshot of match identifiers, walks it with
//! paced, retrying fetches while checkpointing progress and record shards, and
//! merges the shards of any number of runs into one deduplicated dataset.

pub mod config;
pub mod crawler;
pub mod merge;
pub mod output;
pub mod record;
pub mod snapshot;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for snapcrawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] snapshot::SnapshotError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Progress belongs to snapshot {found}, but the loaded snapshot is {expected}")]
    SnapshotMismatch { expected: String, found: String },

    #[error("Crawl was abandoned by the operator; build a new snapshot or run with --fresh")]
    Abandoned,

    #[error("Invalid run state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunState,
        to: state::RunState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for snapcrawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use record::MatchRecord;
pub use snapshot::{Snapshot, WorkItem};
pub use state::{ProgressState, RunState};
