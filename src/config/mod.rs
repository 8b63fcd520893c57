//! Configuration module for snapcrawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use snapcrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("snapcrawl.toml")).unwrap();
//! println!("Checkpoint every {} records", config.crawler.checkpoint_every);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BackoffStrategy, Config, CrawlerConfig, OutputConfig, SnapshotConfig, SourceConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
