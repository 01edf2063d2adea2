//! Strata-Crawl main entry point
//!
//! This is the command-line interface for the Strata-Crawl catalog crawler.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use strata_crawl::config::load_config_with_hash;
use strata_crawl::crawler::{Coordinator, RunOutcome};
use strata_crawl::nav::HttpNavigator;
use strata_crawl::sink::CsvSink;
use strata_crawl::state::CrawlScope;
use tracing_subscriber::EnvFilter;

/// Strata-Crawl: a resumable hierarchical catalog crawler
///
/// Strata-Crawl walks a catalog entity by entity, branch by branch, capturing
/// entity summaries and leaf records into append-only CSV streams. It can be
/// interrupted at any point and resumes exactly where it left off.
#[derive(Parser, Debug)]
#[command(name = "strata-crawl")]
#[command(version = "1.0.0")]
#[command(about = "A resumable hierarchical catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Entity-id range to cover, e.g. "1-10099" (overrides the config)
    #[arg(long, value_name = "LO-HI")]
    scope: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start over, discarding the previous checkpoint and pending state
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
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

    // The CLI scope wins over the configured one; either way the range is an
    // explicit operator input, never inferred from checkpoint state
    let scope: CrawlScope = cli
        .scope
        .as_deref()
        .unwrap_or(&config.crawler.scope)
        .parse()?;

    if cli.dry_run {
        handle_dry_run(&config, scope, &config_hash);
        return Ok(());
    }

    let driver = HttpNavigator::new(&config)?;
    let sink = CsvSink::new(&config.output.data_dir);

    let mut coordinator = Coordinator::new(
        config.crawler.clone(),
        &config.output,
        scope,
        driver,
        sink,
        cli.fresh,
    )?;

    // Honor Ctrl-C at the next step boundary, after the in-flight save
    let stop = coordinator.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Stop requested; finishing the in-flight step first");
            stop.store(true, Ordering::Relaxed);
        }
    });

    match coordinator.run().await? {
        RunOutcome::Done => {
            tracing::info!("Crawl completed over scope {}", scope);
            Ok(())
        }
        RunOutcome::Stopped => {
            tracing::warn!("Crawl stopped; rerun the same command to resume");
            std::process::exit(130);
        }
        RunOutcome::Aborted => {
            tracing::error!("Crawl aborted; rerun the same command to resume");
            std::process::exit(1);
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("strata_crawl=info,warn"),
            1 => EnvFilter::new("strata_crawl=debug,info"),
            2 => EnvFilter::new("strata_crawl=trace,debug"),
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
fn handle_dry_run(config: &strata_crawl::Config, scope: CrawlScope, config_hash: &str) {
    println!("=== Strata-Crawl Dry Run ===\n");

    println!("Scope:");
    println!("  Entities: {} ({} ids)", scope, scope.hi - scope.lo + 1);

    println!("\nCrawler Configuration:");
    println!(
        "  Action pause: {}-{}ms",
        config.crawler.action_pause_ms[0], config.crawler.action_pause_ms[1]
    );
    println!(
        "  Entity pause: {}-{}ms",
        config.crawler.entity_pause_ms[0], config.crawler.entity_pause_ms[1]
    );
    println!("  Page timeout: {}s", config.crawler.page_timeout_secs);
    println!(
        "  Abort after: {} consecutive navigation failures",
        config.crawler.max_consecutive_nav_failures
    );
    println!(
        "  Unfiltered labels: {}",
        config.crawler.unfiltered_labels.join(", ")
    );

    println!("\nSite:");
    println!("  Entity page: {}", config.site.entity_url);
    println!("  Leaf listing: {}", config.site.catalog_url);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir);
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Pending queue: {}", config.output.pending_path);

    println!("\n✓ Configuration is valid (hash: {})", config_hash);
    println!("✓ Would crawl entities {} through {}", scope.lo, scope.hi);
}
