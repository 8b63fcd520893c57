use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for snapcrawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Remote source the snapshot and the records are read from
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Site root, e.g. "https://www.hltv.org"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the paginated results listing
    #[serde(rename = "listing-path", default = "default_listing_path")]
    pub listing_path: String,

    /// Detail page path; `{id}` is replaced by the match identifier
    #[serde(rename = "item-path", default = "default_item_path")]
    pub item_path: String,

    /// Number of entries the listing shows per page (the offset step)
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: usize,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request HTTP timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of consecutive snapshot positions grouped into one season
    #[serde(rename = "season-length", default = "default_season_length")]
    pub season_length: usize,

    /// Highest season number assigned; later positions stay in this season
    #[serde(rename = "max-season", default = "default_max_season")]
    pub max_season: u32,
}

/// Snapshot construction and location
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Where the frozen snapshot is written and read
    pub path: PathBuf,

    /// Number of identifiers to collect
    #[serde(rename = "target-count")]
    pub target_count: usize,

    /// Delay between listing pages while building (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

/// Crawl pacing, retry and checkpoint behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum delay after every item (milliseconds)
    #[serde(rename = "item-delay-ms", default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Items per batch; a batch boundary uses the batch delay instead
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay at every batch boundary (milliseconds)
    #[serde(rename = "batch-delay-ms", default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Retries after the first attempt for retryable failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Shape of the delay between retries
    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// First retry delay (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Multiplier for exponential backoff
    #[serde(rename = "backoff-factor", default = "default_backoff_factor")]
    pub backoff_factor: u32,

    /// Upper bound for any single retry delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Upper bound for one fetch attempt (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Completed records per checkpoint shard
    #[serde(rename = "checkpoint-every", default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// Items (any outcome) between progress writes
    #[serde(rename = "progress-every", default = "default_progress_every")]
    pub progress_every: usize,
}

impl CrawlerConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: default_item_delay_ms(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            backoff: BackoffStrategy::default(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_max_ms: default_backoff_max_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            checkpoint_every: default_checkpoint_every(),
            progress_every: default_progress_every(),
        }
    }
}

/// Retry delay progression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// base, 2*base, 3*base, ...
    #[default]
    Linear,
    /// base, base*factor, base*factor^2, ...
    Exponential,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding progress.json, the shards and the pause flag
    #[serde(rename = "checkpoint-dir")]
    pub checkpoint_dir: PathBuf,

    /// Sentinel file whose presence pauses the crawl
    #[serde(rename = "pause-file", default)]
    pub pause_file: Option<PathBuf>,

    /// Flat CSV export of the merged dataset
    #[serde(rename = "merged-csv")]
    pub merged_csv: PathBuf,

    /// Nested JSON export of the merged dataset
    #[serde(rename = "merged-json")]
    pub merged_json: PathBuf,

    /// Optional SQLite export of the merged dataset
    #[serde(rename = "database-path", default)]
    pub database_path: Option<PathBuf>,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: PathBuf,
}

impl OutputConfig {
    /// The configured pause file, or `scraper_pause.flag` in the checkpoint dir
    pub fn pause_file(&self) -> PathBuf {
        self.pause_file
            .clone()
            .unwrap_or_else(|| self.checkpoint_dir.join("scraper_pause.flag"))
    }
}

fn default_listing_path() -> String {
    "/results".to_string()
}

fn default_item_path() -> String {
    "/matches/{id}/-".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_season_length() -> usize {
    1750
}

fn default_max_season() -> u32 {
    8
}

fn default_page_delay_ms() -> u64 {
    2000
}

fn default_item_delay_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_delay_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    10_000
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_backoff_max_ms() -> u64 {
    120_000
}

fn default_fetch_timeout_secs() -> u64 {
    90
}

fn default_checkpoint_every() -> usize {
    100
}

fn default_progress_every() -> usize {
    10
}
