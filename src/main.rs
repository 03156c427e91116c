//! Archivist main entry point
//!
//! This is the command-line interface for the Archivist archive harvester.

use anyhow::Context;
use archivist::config::{load_config_with_hash, Config};
use archivist::crawler::{CrawlOrchestrator, RunMode, RunSummary};
use archivist::extract::Extractors;
use archivist::output::{print_statistics, JsonArticleWriter};
use archivist::state::YearMonth;
use archivist::storage::{open_store, with_store, CrawlStore};
use archivist::HarvestError;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Archivist: a resumable archive harvester
///
/// Archivist walks a site's monthly archives, fetches every article and its
/// nested comment threads, and keeps a progress ledger so an interrupted run
/// resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "archivist")]
#[command(version = "1.0.0")]
#[command(about = "A resumable archive harvester", long_about = None)]
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

    /// Only discover articles from the archives
    #[arg(long, conflicts_with_all = ["scrape_only", "comments_only"])]
    discover_only: bool,

    /// Only scrape already-discovered articles
    #[arg(long, conflicts_with_all = ["discover_only", "comments_only"])]
    scrape_only: bool,

    /// Re-acquire comments for already-scraped articles
    #[arg(long, conflicts_with_all = ["discover_only", "scrape_only"])]
    comments_only: bool,

    /// Maximum number of articles to process
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Skip downloading comment images
    #[arg(long)]
    no_images: bool,

    /// Validate config and show what would be harvested
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn mode(&self) -> RunMode {
        if self.discover_only {
            RunMode::DiscoverOnly
        } else if self.scrape_only {
            RunMode::ScrapeOnly
        } else if self.comments_only {
            RunMode::CommentsOnly
        } else {
            RunMode::Full
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.no_images {
        config.crawl.download_images = false;
    }

    if cli.dry_run {
        handle_dry_run(&config, cli.mode());
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_harvest(config, cli.mode(), cli.limit).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("archivist=info,warn"),
            1 => EnvFilter::new("archivist=debug,info"),
            2 => EnvFilter::new("archivist=trace,debug"),
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

/// Handles the --dry-run mode: shows the month range and settings
fn handle_dry_run(config: &Config, mode: RunMode) {
    let end_date = config.site.effective_end_date();
    let months = YearMonth::range(config.site.start_date, end_date);

    println!("=== Archivist Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Date range: {} to {}", config.site.start_date, end_date);
    match (months.first(), months.last()) {
        (Some(first), Some(last)) => {
            println!("  Archive months: {} ({} to {})", months.len(), first, last)
        }
        _ => println!("  Archive months: none"),
    }

    println!("\nFetching:");
    println!("  Request delay: {}ms", config.fetch.request_delay_ms);
    println!("  Max retries: {}", config.fetch.max_retries);
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  User agents: {} (rotate every {})", config.fetch.user_agents.len(), config.fetch.rotate_agent_every);

    println!("\nCrawl:");
    println!("  Mode: {:?}", mode);
    println!("  Batch size: {}", config.crawl.batch_size);
    println!("  Max article retries: {}", config.crawl.max_article_retries);
    println!("  Max archive pages: {}", config.crawl.max_archive_pages);
    println!(
        "  Images: {}",
        if config.crawl.download_images {
            format!("on (max {} MB)", config.crawl.max_image_size_mb)
        } else {
            "off".to_string()
        }
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path.display());
    println!("  Corpus: {}", config.output.corpus_dir.display());
    println!("  Images: {}", config.output.images_dir.display());

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path.display());

    let store = open_store(&config.output.database_path)?;
    let stats = with_store(&store, |s| s.stats())?;
    print_statistics(&stats);

    Ok(())
}

/// Runs the selected phases until done or interrupted
async fn handle_harvest(config: Config, mode: RunMode, limit: Option<usize>) -> anyhow::Result<()> {
    for dir in [&config.output.corpus_dir, &config.output.images_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    if let Some(parent) = config.output.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = open_store(&config.output.database_path)?;
    let extractors = Extractors::html(&config.site.base_url);
    let sink = Arc::new(JsonArticleWriter::new(&config.output.corpus_dir));

    let cancel = CancellationToken::new();
    let orchestrator = CrawlOrchestrator::new(&config, store.clone(), extractors, sink)?
        .with_cancellation(cancel.clone())
        .with_limit(limit);

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current unit of work");
            interrupt.cancel();
        }
    });

    let summary = orchestrator.run(mode).await?;
    report(&summary);

    let stats = with_store(&store, |s| s.stats())?;
    print_statistics(&stats);

    if summary.cancelled {
        return Err(HarvestError::Interrupted.into());
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    if let Some(discovery) = &summary.discovery {
        tracing::info!(
            "Discovered {} new articles ({} months complete, {} skipped)",
            discovery.new_stubs,
            discovery.months_completed,
            discovery.months_skipped
        );
    }
    if summary.comments_demoted > 0 {
        tracing::warn!(
            "{} comments had unresolvable parents and were stored as roots",
            summary.comments_demoted
        );
    }
    tracing::info!(
        "Session {}: {} articles scraped, {} comments, {} images",
        summary.session_id,
        summary.articles_scraped,
        summary.comments_scraped,
        summary.images_downloaded
    );
}
