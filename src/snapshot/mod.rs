//! Frozen work queue
//!
//! A snapshot fixes, once, which match identifiers a crawl visits and in what
//! order. New matches appearing on the live listing during a multi-day crawl
//! shift every listing offset; crawling from the frozen snapshot instead of
//! the live listing keeps the order stable across any number of resumes.
//!
//! # Components
//!
//! - `Snapshot` / `WorkItem`: the frozen queue and its entries
//! - `SnapshotBuilder`: pages through a `ListingSource` to collect identifiers
//! - `HttpListingSource`: listing pages fetched over HTTP

mod builder;
mod listing;

pub use builder::{ListingEntry, ListingSource, SnapshotBuilder};
pub use listing::{parse_listing_page, HttpListingSource};

use crate::storage::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while building, saving or loading a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Snapshot failed verification: {0}")]
    Corrupt(String),

    #[error("Snapshot already exists at {0}; snapshots are never overwritten without --force")]
    AlreadyExists(PathBuf),

    #[error("Listing page at offset {offset} could not be fetched: {message}")]
    Source { offset: usize, message: String },
}

/// One entry of the frozen queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Externally assigned match identifier
    pub id: u64,

    /// Zero-based position in the snapshot
    pub position: usize,

    /// Detail page seen on the listing, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Descriptive header of a snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub target_count: usize,
    pub total_items: usize,
    pub first_id: Option<u64>,
    pub last_id: Option<u64>,
    /// Hex SHA-256 over the ordered identifiers
    pub digest: String,
}

/// Ordered, immutable list of work items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    items: Vec<WorkItem>,
}

impl Snapshot {
    /// Freezes listing entries into a snapshot
    ///
    /// Entries keep their given order. Repeated identifiers keep their first
    /// occurrence only, and positions are assigned after deduplication.
    pub fn freeze(entries: Vec<ListingEntry>, target_count: usize) -> Self {
        let mut seen = HashSet::new();
        let items: Vec<WorkItem> = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id))
            .enumerate()
            .map(|(position, entry)| WorkItem {
                id: entry.id,
                position,
                url: entry.url,
            })
            .collect();

        let metadata = SnapshotMetadata {
            created_at: Utc::now(),
            target_count,
            total_items: items.len(),
            first_id: items.first().map(|item| item.id),
            last_id: items.last().map(|item| item.id),
            digest: compute_digest(&items),
        };

        Self { metadata, items }
    }

    /// Freezes an explicit identifier list, e.g. the failed ids of a prior run
    pub fn from_ids(ids: &[u64]) -> Self {
        let entries = ids
            .iter()
            .map(|&id| ListingEntry { id, url: None })
            .collect();
        Self::freeze(entries, ids.len())
    }

    /// Loads and verifies a snapshot file
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        snapshot.verify()?;
        tracing::debug!(
            "Loaded snapshot {} with {} items from {}",
            snapshot.digest(),
            snapshot.len(),
            path.display()
        );
        Ok(snapshot)
    }

    /// Writes the snapshot atomically
    ///
    /// An existing file is only replaced when `force` is set.
    pub fn save(&self, path: &Path, force: bool) -> Result<(), SnapshotError> {
        if path.exists() && !force {
            return Err(SnapshotError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes())?;
        Ok(())
    }

    /// Checks positions, uniqueness, counts and the digest
    pub fn verify(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::with_capacity(self.items.len());
        for (expected, item) in self.items.iter().enumerate() {
            if item.position != expected {
                return Err(SnapshotError::Corrupt(format!(
                    "item {} has position {}, expected {}",
                    item.id, item.position, expected
                )));
            }
            if !seen.insert(item.id) {
                return Err(SnapshotError::Corrupt(format!(
                    "identifier {} appears more than once",
                    item.id
                )));
            }
        }

        if self.metadata.total_items != self.items.len() {
            return Err(SnapshotError::Corrupt(format!(
                "header declares {} items but {} are present",
                self.metadata.total_items,
                self.items.len()
            )));
        }

        let digest = compute_digest(&self.items);
        if digest != self.metadata.digest {
            return Err(SnapshotError::Corrupt(format!(
                "digest mismatch: header {}, content {}",
                self.metadata.digest, digest
            )));
        }

        Ok(())
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Items at and after `position`
    pub fn items_from(&self, position: usize) -> &[WorkItem] {
        self.items.get(position..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn digest(&self) -> &str {
        &self.metadata.digest
    }

    pub fn ids(&self) -> Vec<u64> {
        self.items.iter().map(|item| item.id).collect()
    }

    /// Identifier -> position lookup
    pub fn position_index(&self) -> HashMap<u64, usize> {
        self.items
            .iter()
            .map(|item| (item.id, item.position))
            .collect()
    }
}

/// Hex SHA-256 over the ordered identifiers, one per line
pub fn compute_digest(items: &[WorkItem]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item.id.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
