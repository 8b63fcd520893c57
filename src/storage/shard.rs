//! Checkpoint shard format
//!
//! A shard is a JSON-lines file:
//!
//! ```text
//! {"format":"snapcrawl-shard","version":1,"sequence":3,"written_at":"...","records":2}
//! {"position":200,"record":{...}}
//! {"position":203,"record":{...}}
//! {"end":2}
//! ```
//!
//! The trailer is written last. A file without it, or whose counts disagree,
//! was cut short and is rejected as incomplete.

use crate::record::MatchRecord;
use crate::storage::{StorageError, StorageResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

pub const SHARD_FORMAT: &str = "snapcrawl-shard";
pub const SHARD_VERSION: u32 = 1;

const FILE_PREFIX: &str = "shard-";
const FILE_SUFFIX: &str = ".jsonl";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// A record plus the snapshot position it was fetched at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardEntry {
    pub position: usize,
    pub record: MatchRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardHeader {
    pub format: String,
    pub version: u32,
    pub sequence: u64,
    pub written_at: DateTime<Utc>,
    pub records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShardTrailer {
    end: usize,
}

/// A decoded shard
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    pub header: ShardHeader,
    pub entries: Vec<ShardEntry>,
}

/// Location and ordering key of a shard file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardHandle {
    pub path: PathBuf,
    pub sequence: u64,
    pub written_at: DateTime<Utc>,
}

impl ShardHandle {
    /// Builds a handle from a shard file name, `None` for any other file
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (sequence, written_at) = parse_file_name(name)?;
        Some(Self {
            path: path.to_path_buf(),
            sequence,
            written_at,
        })
    }
}

impl Ord for ShardHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.written_at
            .cmp(&other.written_at)
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for ShardHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `shard-000003-20241215T101500.123Z.jsonl`
pub fn file_name(sequence: u64, written_at: DateTime<Utc>) -> String {
    format!(
        "{}{:06}-{}{}",
        FILE_PREFIX,
        sequence,
        written_at.format(TIMESTAMP_FORMAT),
        FILE_SUFFIX
    )
}

fn parse_file_name(name: &str) -> Option<(u64, DateTime<Utc>)> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (sequence, timestamp) = stem.split_once('-')?;
    let sequence = sequence.parse().ok()?;
    let written_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    Some((sequence, written_at))
}

/// Serializes a complete shard, trailer included
pub fn encode(
    sequence: u64,
    written_at: DateTime<Utc>,
    entries: &[ShardEntry],
) -> StorageResult<String> {
    let header = ShardHeader {
        format: SHARD_FORMAT.to_string(),
        version: SHARD_VERSION,
        sequence,
        written_at,
        records: entries.len(),
    };

    let mut out = serde_json::to_string(&header)?;
    out.push('\n');
    for entry in entries {
        out.push_str(&serde_json::to_string(entry)?);
        out.push('\n');
    }
    out.push_str(&serde_json::to_string(&ShardTrailer { end: entries.len() })?);
    out.push('\n');
    Ok(out)
}

/// Parses and verifies a shard read from `path`
pub fn decode(path: &Path, content: &str) -> StorageResult<Shard> {
    let incomplete = |reason: String| StorageError::IncompleteShard {
        path: path.to_path_buf(),
        reason,
    };

    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let header: ShardHeader = match lines.next() {
        Some(line) => serde_json::from_str(line)
            .map_err(|e| incomplete(format!("unreadable header: {}", e)))?,
        None => return Err(incomplete("empty file".to_string())),
    };

    if header.format != SHARD_FORMAT || header.version != SHARD_VERSION {
        return Err(incomplete(format!(
            "unsupported format {} v{}",
            header.format, header.version
        )));
    }

    let body: Vec<&str> = lines.collect();
    let Some((last, entry_lines)) = body.split_last() else {
        return Err(incomplete("missing trailer".to_string()));
    };

    let trailer: ShardTrailer = serde_json::from_str(last)
        .map_err(|_| incomplete("missing trailer".to_string()))?;

    let entries = entry_lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str::<ShardEntry>(line)
                .map_err(|e| incomplete(format!("entry {}: {}", i + 1, e)))
        })
        .collect::<StorageResult<Vec<_>>>()?;

    if trailer.end != entries.len() || header.records != entries.len() {
        return Err(incomplete(format!(
            "header declares {}, trailer {}, body holds {}",
            header.records,
            trailer.end,
            entries.len()
        )));
    }

    Ok(Shard { header, entries })
}
