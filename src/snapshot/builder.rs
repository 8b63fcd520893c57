//! Snapshot construction from a paginated listing

use crate::crawler::Delay;
use crate::snapshot::{Snapshot, SnapshotError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// An identifier as seen on one listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub id: u64,
    pub url: Option<String>,
}

/// A paginated, most-recent-first listing of identifiers
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Returns the entries of the listing page starting at `offset`
    ///
    /// An empty page means the listing is exhausted.
    async fn fetch_page(&self, offset: usize) -> Result<Vec<ListingEntry>, SnapshotError>;
}

/// Collects identifiers page by page and freezes them
pub struct SnapshotBuilder {
    source: Arc<dyn ListingSource>,
    delay: Arc<dyn Delay>,
    page_size: usize,
    page_delay: Duration,
    stop_at: Option<u64>,
}

impl SnapshotBuilder {
    pub fn new(
        source: Arc<dyn ListingSource>,
        delay: Arc<dyn Delay>,
        page_size: usize,
        page_delay: Duration,
    ) -> Self {
        Self {
            source,
            delay,
            page_size: page_size.max(1),
            page_delay,
            stop_at: None,
        }
    }

    /// Stops collecting at the first identifier at or below `id`
    ///
    /// The listing is newest-first, so everything from that row on is already
    /// known. Used to snapshot only the matches played since a previous crawl.
    pub fn stop_at(mut self, id: Option<u64>) -> Self {
        self.stop_at = id;
        self
    }

    /// Builds a snapshot of up to `target_count` unique identifiers
    ///
    /// Any listing failure aborts the build; it runs once, before the crawl,
    /// and is cheap to restart.
    pub async fn build(&self, target_count: usize) -> Result<Snapshot, SnapshotError> {
        let mut collected: Vec<ListingEntry> = Vec::with_capacity(target_count);
        let mut seen = HashSet::with_capacity(target_count);
        let mut offset = 0;
        let mut pages = 0;
        let mut repeats = 0;

        let mut reached_known = false;

        tracing::info!("Building snapshot of {} identifiers", target_count);
        if let Some(stop) = self.stop_at {
            tracing::info!("Stopping at the first identifier at or below {}", stop);
        }

        while collected.len() < target_count && !reached_known {
            let entries = self.source.fetch_page(offset).await?;
            pages += 1;

            if entries.is_empty() {
                tracing::warn!(
                    "Listing exhausted at offset {} with {} of {} identifiers",
                    offset,
                    collected.len(),
                    target_count
                );
                break;
            }

            for entry in entries {
                if collected.len() >= target_count {
                    break;
                }
                if self.stop_at.is_some_and(|stop| entry.id <= stop) {
                    tracing::info!("Reached known identifier {} at offset {}", entry.id, offset);
                    reached_known = true;
                    break;
                }
                if seen.insert(entry.id) {
                    collected.push(entry);
                } else {
                    repeats += 1;
                }
            }

            tracing::info!(
                "Page {} (offset={}) - {} identifiers collected",
                pages,
                offset,
                collected.len()
            );

            offset += self.page_size;
            if collected.len() < target_count && !reached_known {
                self.delay.sleep(self.page_delay).await;
            }
        }

        if repeats > 0 {
            tracing::info!(
                "Dropped {} identifiers repeated across listing pages",
                repeats
            );
        }

        Ok(Snapshot::freeze(collected, target_count))
    }
}
