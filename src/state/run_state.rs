/// Run state definitions for the crawl lifecycle
///
/// A run starts `Idle`, becomes `Running`, and ends `Completed`, `Paused` or
/// `Aborted`. Only a paused run may be continued.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle state of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    // ===== Active States =====
    /// Snapshot and progress loaded, nothing fetched yet in this process
    Idle,

    /// Walking the snapshot
    Running,

    // ===== Resting States =====
    /// Operator requested a pause; the next run continues from here
    Paused,

    // ===== Terminal States =====
    /// Every snapshot item reached a terminal outcome
    Completed,

    /// Unrecoverable error or operator abandonment
    Aborted,
}

impl RunState {
    /// Returns true if no further crawling can happen from this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Aborted)
                | (Self::Running, Self::Paused)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
                | (Self::Paused, Self::Running)
                | (Self::Paused, Self::Aborted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
