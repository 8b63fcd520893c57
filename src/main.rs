//! Snapcrawl main entry point
//!
//! This is the command-line interface for the snapcrawl resumable crawler.

use anyhow::Context;
use clap::Parser;
use chrono::Utc;
use snapcrawl::config::{load_config_with_hash, Config};
use snapcrawl::crawler::{abandon, build_http_client, crawl, SentinelFile, TokioDelay};
use snapcrawl::merge::merge_dirs;
use snapcrawl::output::{
    export_dataset, generate_markdown_summary, load_statistics, print_statistics, CrawlSummary,
};
use snapcrawl::snapshot::{HttpListingSource, ListingSource, Snapshot, SnapshotBuilder};
use snapcrawl::storage::open_store;
use snapcrawl::RunState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Snapcrawl: a resumable crawler for large, rate-limited result archives
///
/// Snapcrawl freezes a snapshot of match identifiers, walks it with paced,
/// retrying fetches while checkpointing progress, and merges the checkpoint
/// shards of any number of runs into one deduplicated dataset.
#[derive(Parser, Debug)]
#[command(name = "snapcrawl")]
#[command(version = "1.0.0")]
#[command(about = "A resumable crawler for rate-limited result archives", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume a paused crawl, clearing the pause file first
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Archive the previous progress and crawl the snapshot from the start
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Build the snapshot from the live listing and exit
    #[arg(long, group = "mode")]
    build_snapshot: bool,

    /// Allow --build-snapshot to replace an existing snapshot
    #[arg(long, requires = "build_snapshot")]
    force: bool,

    /// Stop --build-snapshot at the first listing id at or below ID
    #[arg(long, value_name = "ID", requires = "build_snapshot")]
    until_id: Option<u64>,

    /// Print the newest id on the live listing and exit
    #[arg(long, group = "mode")]
    latest_id: bool,

    /// Write a new snapshot of the failed ids of the current run to PATH
    #[arg(long, value_name = "PATH", group = "mode")]
    snapshot_from_failed: Option<PathBuf>,

    /// Ask a running crawl to pause at the next item boundary
    #[arg(long, group = "mode")]
    pause: bool,

    /// Mark the crawl as aborted; later runs refuse to continue it
    #[arg(long, group = "mode")]
    abandon: bool,

    /// Show crawl progress and exit
    #[arg(long, group = "mode")]
    status: bool,

    /// Merge checkpoint shards and export the canonical dataset
    #[arg(long, group = "mode")]
    merge: bool,

    /// Additional checkpoint directories to merge (repeatable)
    #[arg(long = "shards-dir", value_name = "DIR", requires = "merge")]
    shards_dirs: Vec<PathBuf>,

    /// Generate markdown summary from existing checkpoints and exit
    #[arg(long, group = "mode")]
    export_summary: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, group = "mode")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.build_snapshot {
        handle_build_snapshot(&config, cli.force, cli.until_id).await
    } else if cli.latest_id {
        handle_latest_id(&config).await
    } else if let Some(path) = &cli.snapshot_from_failed {
        handle_snapshot_from_failed(&config, path)
    } else if cli.pause {
        handle_pause(&config)
    } else if cli.abandon {
        handle_abandon(&config)
    } else if cli.status {
        handle_status(&config)
    } else if cli.merge {
        handle_merge(&config, &config_hash, &cli.shards_dirs)
    } else if cli.export_summary {
        handle_export_summary(&config, &config_hash)
    } else {
        handle_crawl(&config, cli.fresh, cli.resume).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("snapcrawl=info,warn"),
            1 => EnvFilter::new("snapcrawl=debug,info"),
            2 => EnvFilter::new("snapcrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Snapcrawl Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url);
    println!(
        "  Listing: {} ({} per page)",
        config.source.listing_path, config.source.page_size
    );
    println!("  Item path: {}", config.source.item_path);
    println!(
        "  Seasons: {} items each, capped at {}",
        config.source.season_length, config.source.max_season
    );

    println!("\nCrawler Configuration:");
    println!("  Item delay: {}ms", config.crawler.item_delay_ms);
    println!(
        "  Batch delay: {}ms every {} items",
        config.crawler.batch_delay_ms, config.crawler.batch_size
    );
    println!(
        "  Retries: {} ({:?} backoff from {}ms, capped at {}ms)",
        config.crawler.max_retries,
        config.crawler.backoff,
        config.crawler.backoff_base_ms,
        config.crawler.backoff_max_ms
    );
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout_secs);
    println!(
        "  Checkpoint every {} records, progress every {} items",
        config.crawler.checkpoint_every, config.crawler.progress_every
    );

    println!("\nOutput:");
    println!("  Checkpoints: {}", config.output.checkpoint_dir.display());
    println!("  Pause file: {}", config.output.pause_file().display());
    println!("  Merged CSV: {}", config.output.merged_csv.display());
    println!("  Merged JSON: {}", config.output.merged_json.display());
    if let Some(db) = &config.output.database_path {
        println!("  Database: {}", db.display());
    }
    println!("  Summary: {}", config.output.summary_path.display());

    println!("\nSnapshot: {}", config.snapshot.path.display());
    if config.snapshot.path.exists() {
        let snapshot = Snapshot::load(&config.snapshot.path)?;
        println!(
            "  {} items, digest {}, created {}",
            snapshot.len(),
            snapshot.digest(),
            snapshot.metadata.created_at.to_rfc3339()
        );
        println!("\n✓ Configuration is valid");
        if config.output.checkpoint_dir.exists() {
            let store = open_store(&config.output.checkpoint_dir)?;
            let stats = load_statistics(&store, &snapshot, &config.output.pause_file())?;
            println!(
                "✓ Would crawl {} remaining items starting at position {}",
                stats.items_remaining(),
                stats.resume_position
            );
        } else {
            println!("✓ Would crawl all {} items from position 0", snapshot.len());
        }
    } else {
        println!("  (not built yet)");
        println!("\n✓ Configuration is valid");
        println!(
            "✓ Would need --build-snapshot to collect {} identifiers first",
            config.snapshot.target_count
        );
    }

    Ok(())
}

/// Handles the --build-snapshot mode: freezes the live listing into a snapshot
async fn handle_build_snapshot(
    config: &Config,
    force: bool,
    until_id: Option<u64>,
) -> anyhow::Result<()> {
    if config.snapshot.path.exists() && !force {
        anyhow::bail!(
            "Snapshot {} already exists; pass --force to rebuild it",
            config.snapshot.path.display()
        );
    }

    let client = build_http_client(&config.source)?;
    let source = HttpListingSource::new(client, &config.source)?;
    let builder = SnapshotBuilder::new(
        Arc::new(source),
        Arc::new(TokioDelay),
        config.source.page_size,
        Duration::from_millis(config.snapshot.page_delay_ms),
    )
    .stop_at(until_id);

    let snapshot = builder.build(config.snapshot.target_count).await?;
    if snapshot.is_empty() {
        anyhow::bail!("No new items on the listing; snapshot not written");
    }
    snapshot.save(&config.snapshot.path, force)?;

    println!(
        "✓ Snapshot of {} items written to {} (digest {})",
        snapshot.len(),
        config.snapshot.path.display(),
        snapshot.digest()
    );

    Ok(())
}

/// Handles the --latest-id mode: the id to pass to a later --until-id
async fn handle_latest_id(config: &Config) -> anyhow::Result<()> {
    let client = build_http_client(&config.source)?;
    let source = HttpListingSource::new(client, &config.source)?;

    match source.fetch_page(0).await?.first() {
        Some(entry) => println!("{}", entry.id),
        None => anyhow::bail!("The listing has no entries"),
    }

    Ok(())
}

/// Handles the --snapshot-from-failed mode: re-queues exhausted items
fn handle_snapshot_from_failed(config: &Config, path: &Path) -> anyhow::Result<()> {
    let snapshot = Snapshot::load(&config.snapshot.path)?;
    let store = open_store(&config.output.checkpoint_dir)?;
    let stats = load_statistics(&store, &snapshot, &config.output.pause_file())?;

    if stats.failed_item_ids.is_empty() {
        println!("No failed items to re-crawl");
        return Ok(());
    }

    let retry = Snapshot::from_ids(&stats.failed_item_ids);
    retry.save(path, false)?;

    println!(
        "✓ Snapshot of {} failed items written to {} (digest {})",
        retry.len(),
        path.display(),
        retry.digest()
    );
    println!("  Point [snapshot].path and a new checkpoint-dir at it to re-crawl them");

    Ok(())
}

/// Handles the --pause mode: creates the pause file
fn handle_pause(config: &Config) -> anyhow::Result<()> {
    let sentinel = SentinelFile::new(config.output.pause_file());
    sentinel
        .request()
        .with_context(|| format!("creating pause file {}", sentinel.path().display()))?;

    println!(
        "✓ Pause requested ({}); the crawl stops after its current item",
        sentinel.path().display()
    );
    Ok(())
}

/// Handles the --abandon mode: persists `aborted`
fn handle_abandon(config: &Config) -> anyhow::Result<()> {
    let snapshot = Snapshot::load(&config.snapshot.path)?;
    let store = open_store(&config.output.checkpoint_dir)?;
    let state = abandon(&store, &snapshot)?;

    println!(
        "✓ Crawl marked {} at position {} ({} records kept in shards)",
        state.status,
        state.resume_position(),
        state.items_completed
    );
    Ok(())
}

/// Handles the --status mode: shows where the crawl stands
fn handle_status(config: &Config) -> anyhow::Result<()> {
    println!("Checkpoints: {}\n", config.output.checkpoint_dir.display());

    let snapshot = Snapshot::load(&config.snapshot.path)
        .with_context(|| format!("loading snapshot {}", config.snapshot.path.display()))?;
    let store = open_store(&config.output.checkpoint_dir)?;
    let stats = load_statistics(&store, &snapshot, &config.output.pause_file())?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the --merge mode: merges shards and writes every export
fn handle_merge(config: &Config, config_hash: &str, extra_dirs: &[PathBuf]) -> anyhow::Result<()> {
    println!("=== Merging Checkpoints ===\n");

    let mut dirs = vec![config.output.checkpoint_dir.clone()];
    dirs.extend(extra_dirs.iter().cloned());

    let snapshot = load_optional_snapshot(&config.snapshot.path);
    let dataset = merge_dirs(&dirs, snapshot.as_ref())?;
    let written = export_dataset(&dataset, &config.output)?;

    let report = &dataset.report;
    println!(
        "Shards: {} found, {} loaded, {} skipped",
        report.shards_found, report.shards_loaded, report.skipped_shards
    );
    println!(
        "Records: {} read, {} duplicates removed, {} unique",
        report.records_read, report.duplicates_removed, report.unique_records
    );
    println!();
    for file in &written {
        println!(
            "✓ {} records exported as {} to {}",
            file.records,
            file.format,
            file.path.display()
        );
    }

    if let Some(snapshot) = &snapshot {
        let store = open_store(&config.output.checkpoint_dir)?;
        match load_statistics(&store, snapshot, &config.output.pause_file()) {
            Ok(statistics) => {
                let summary = CrawlSummary {
                    generated_at: Utc::now(),
                    config_hash: config_hash.to_string(),
                    statistics,
                    merge: Some(dataset.report.clone()),
                };
                generate_markdown_summary(&summary, &config.output.summary_path)?;
                println!("✓ Summary exported to: {}", config.output.summary_path.display());
            }
            Err(e) => tracing::warn!("Summary not written: {}", e),
        }
    }

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    println!("=== Exporting Crawl Summary ===\n");
    println!("Checkpoints: {}", config.output.checkpoint_dir.display());
    println!("Output: {}", config.output.summary_path.display());
    println!();

    let snapshot = Snapshot::load(&config.snapshot.path)?;
    let store = open_store(&config.output.checkpoint_dir)?;

    tracing::info!("Loading crawl progress...");
    let statistics = load_statistics(&store, &snapshot, &config.output.pause_file())?;

    tracing::info!("Reading shards for merge statistics...");
    let dataset = merge_dirs(&[config.output.checkpoint_dir.clone()], Some(&snapshot))?;

    let summary = CrawlSummary {
        generated_at: Utc::now(),
        config_hash: config_hash.to_string(),
        statistics,
        merge: Some(dataset.report),
    };
    generate_markdown_summary(&summary, &config.output.summary_path)?;

    println!("✓ Summary exported to: {}", config.output.summary_path.display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, fresh: bool, resume: bool) -> anyhow::Result<()> {
    let store = open_store(&config.output.checkpoint_dir)?;
    let sentinel = SentinelFile::new(config.output.pause_file());

    if fresh {
        tracing::info!("Starting fresh crawl (previous progress is archived, shards are kept)");
        store.archive_progress()?;
    } else {
        tracing::info!("Starting crawl (will resume if a previous run exists)");
    }

    if resume || fresh {
        if sentinel.clear()? {
            tracing::info!("Cleared pause file {}", sentinel.path().display());
        }
    } else if sentinel.path().exists() {
        tracing::warn!(
            "Pause file {} is present; the crawl will pause immediately (use --resume to clear it)",
            sentinel.path().display()
        );
    }

    let interrupt = CancellationToken::new();
    let on_ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, pausing after the current item");
            on_ctrl_c.cancel();
        }
    });

    match crawl(config, interrupt).await {
        Ok(report) if report.already_completed => {
            println!("Crawl already completed; nothing to do. Run --merge to export the dataset.");
            Ok(())
        }
        Ok(report) => {
            let progress = &report.progress;
            match report.state {
                RunState::Paused => println!(
                    "Crawl paused at position {} after {} items this run; resume with --resume",
                    progress.resume_position(),
                    report.items_attempted
                ),
                _ => println!(
                    "Crawl completed: {} records, {} skipped, {} failed",
                    progress.items_completed, progress.items_skipped, progress.items_failed
                ),
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Loads the configured snapshot for ordering, or falls back to stored positions
fn load_optional_snapshot(path: &Path) -> Option<Snapshot> {
    if !path.exists() {
        tracing::warn!(
            "Snapshot {} not found; ordering merged records by stored position",
            path.display()
        );
        return None;
    }
    match Snapshot::load(path) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("Snapshot {} unusable for ordering: {}", path.display(), e);
            None
        }
    }
}
