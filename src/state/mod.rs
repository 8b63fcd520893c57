//! Crawl state tracking
//!
//! # Components
//!
//! - `RunState`: lifecycle of one crawl run (idle, running, paused, completed, aborted)
//! - `ProgressState`: the persisted, per-directory record of how far a crawl got
//! - `ItemOutcome`: terminal outcome of one work item, folded into `ProgressState`

mod progress;
mod run_state;

pub use progress::{ItemOutcome, ProgressState};
pub use run_state::RunState;
