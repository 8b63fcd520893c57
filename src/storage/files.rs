//! Filesystem checkpoint store
//!
//! Layout of a checkpoint directory:
//!
//! ```text
//! <root>/progress.json
//! <root>/shards/shard-000001-20241215T101500.123Z.jsonl
//! <root>/shards/shard-000002-...
//! ```

use crate::state::ProgressState;
use crate::storage::shard::{self, Shard, ShardEntry, ShardHandle};
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use chrono::{SubsecRound, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const PROGRESS_FILE: &str = "progress.json";
const SHARDS_DIR: &str = "shards";

/// Writes `bytes` to `path` so that readers see either the old or the new
/// content, never a mix
///
/// The data goes to a hidden temp file in the same directory, is synced, and
/// is then renamed over the target.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("snapcrawl");
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    #[cfg(unix)]
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Checkpoint store backed by one directory
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    /// Opens (creating if needed) the checkpoint directory at `root`
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root.join(SHARDS_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    pub fn shards_dir(&self) -> PathBuf {
        self.root.join(SHARDS_DIR)
    }

    /// Moves the current progress file aside so the next run starts fresh
    ///
    /// Shards are kept: they remain valid input for the merger.
    pub fn archive_progress(&self) -> StorageResult<Option<PathBuf>> {
        let current = self.progress_path();
        if !current.exists() {
            return Ok(None);
        }

        let archived = self.root.join(format!(
            "progress-{}.json.archived",
            Utc::now().format("%Y%m%dT%H%M%SZ")
        ));
        fs::rename(&current, &archived)?;
        tracing::info!("Archived previous progress to {}", archived.display());
        Ok(Some(archived))
    }

    /// Every shard-named file in the shards directory, complete or not
    fn shard_files(&self) -> StorageResult<Vec<ShardHandle>> {
        let dir = self.shards_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut handles = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(handle) = ShardHandle::from_path(&entry.path()) {
                handles.push(handle);
            }
        }
        handles.sort();
        Ok(handles)
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn read_progress(&self) -> StorageResult<Option<ProgressState>> {
        let path = self.progress_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::CorruptProgress {
                path,
                message: e.to_string(),
            })
    }

    fn write_progress(&self, state: &ProgressState) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(state)?;
        atomic_write(&self.progress_path(), json.as_bytes())?;
        Ok(())
    }

    fn append_shard(&self, entries: &[ShardEntry]) -> StorageResult<ShardHandle> {
        let sequence = self
            .shard_files()?
            .iter()
            .map(|h| h.sequence)
            .max()
            .unwrap_or(0)
            + 1;
        let written_at = Utc::now().trunc_subsecs(3);
        let path = self.shards_dir().join(shard::file_name(sequence, written_at));

        if path.exists() {
            return Err(StorageError::ShardExists(path));
        }

        let content = shard::encode(sequence, written_at, entries)?;
        atomic_write(&path, content.as_bytes())?;

        tracing::debug!(
            "Wrote shard {} with {} records",
            path.display(),
            entries.len()
        );

        Ok(ShardHandle {
            path,
            sequence,
            written_at,
        })
    }

    fn list_shards(&self) -> StorageResult<Vec<ShardHandle>> {
        self.shard_files()
    }

    fn read_shard(&self, handle: &ShardHandle) -> StorageResult<Shard> {
        read_shard_file(&handle.path)
    }
}

/// Reads and verifies one shard file
fn read_shard_file(path: &Path) -> StorageResult<Shard> {
    let content = fs::read_to_string(path)?;
    shard::decode(path, &content)
}
