//! Cooperative pause signals
//!
//! The coordinator polls a `PauseSignal` between items. A pause is never
//! observed mid-item.

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub trait PauseSignal: Send + Sync {
    fn is_pause_requested(&self) -> bool;
}

/// Pause requested while a sentinel file exists
#[derive(Debug, Clone)]
pub struct SentinelFile {
    path: PathBuf,
}

impl SentinelFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the sentinel file
    pub fn request(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.path,
            format!("Pause requested at {}\n", chrono::Utc::now().to_rfc3339()),
        )
    }

    /// Removes the sentinel file; returns whether one was present
    pub fn clear(&self) -> std::io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl PauseSignal for SentinelFile {
    fn is_pause_requested(&self) -> bool {
        self.path.exists()
    }
}

impl PauseSignal for CancellationToken {
    fn is_pause_requested(&self) -> bool {
        self.is_cancelled()
    }
}

/// Pause requested when any inner signal requests it
pub struct AnyPause {
    signals: Vec<Box<dyn PauseSignal>>,
}

impl AnyPause {
    pub fn new(signals: Vec<Box<dyn PauseSignal>>) -> Self {
        Self { signals }
    }
}

impl PauseSignal for AnyPause {
    fn is_pause_requested(&self) -> bool {
        self.signals.iter().any(|s| s.is_pause_requested())
    }
}

/// Never pauses
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPause;

impl PauseSignal for NoPause {
    fn is_pause_requested(&self) -> bool {
        false
    }
}
