//! Crawler module for snapshot-driven match fetching
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with error classification
//! - Match page parsing
//! - Pacing and retry backoff
//! - Cooperative pause signals
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod pause;
mod scheduler;

pub use coordinator::{abandon, CheckpointPolicy, Coordinator, CrawlReport};
pub use fetcher::{
    build_http_client, classify_status, is_challenge_page, FetchResult, Fetcher, HttpFetcher,
};
pub use parser::{parse_match_page, PageContext, ParsedMatch};
pub use pause::{AnyPause, NoPause, PauseSignal, SentinelFile};
pub use scheduler::{Delay, Pacer, RecordingDelay, RetryPolicy, Scheduler, TokioDelay};

use crate::config::Config;
use crate::snapshot::Snapshot;
use crate::storage::FsCheckpointStore;
use crate::CrawlError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs (or resumes) a crawl over the configured snapshot
///
/// This is the main entry point for crawling. It will:
/// 1. Load and verify the snapshot
/// 2. Open the checkpoint directory
/// 3. Build the HTTP client and fetcher
/// 4. Walk the snapshot until it is exhausted or a pause is requested
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `interrupt` - Cancelled to request a pause (e.g. on Ctrl-C)
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run completed or paused cleanly
/// * `Err(CrawlError)` - The run aborted
pub async fn crawl(config: &Config, interrupt: CancellationToken) -> Result<CrawlReport, CrawlError> {
    let snapshot = Arc::new(Snapshot::load(&config.snapshot.path)?);
    let store = Arc::new(FsCheckpointStore::open(&config.output.checkpoint_dir)?);

    let client = build_http_client(&config.source)?;
    let fetcher = HttpFetcher::new(client, &config.source)
        .map_err(|e| crate::ConfigError::InvalidUrl(e.to_string()))?;

    let pause = AnyPause::new(vec![
        Box::new(SentinelFile::new(config.output.pause_file())),
        Box::new(interrupt),
    ]);

    tracing::info!(
        "Crawling snapshot {} ({} items) into {}",
        snapshot.digest(),
        snapshot.len(),
        config.output.checkpoint_dir.display()
    );

    let coordinator = Coordinator::new(
        snapshot,
        Arc::new(fetcher),
        store,
        Arc::new(pause),
        Arc::new(TokioDelay),
        &config.crawler,
    );

    coordinator.run().await
}
