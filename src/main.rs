//! Procure-Sync main entry point
//!
//! Command-line interface for the procurement mirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use procure_sync::config::{load_config_with_hash, Config};
use procure_sync::fetcher::Fetcher;
use procure_sync::logging::LogSink;
use procure_sync::normalize::normalize_date;
use procure_sync::output::{load_statistics, print_logs, print_report, print_response, print_statistics};
use procure_sync::router::{RequestContext, RequestRouter, RouteStatus};
use procure_sync::shutdown::ShutdownRegistry;
use procure_sync::state::FreshnessManager;
use procure_sync::storage::{SqliteLogSink, SqliteStorage};
use procure_sync::sync::{FullSyncOrchestrator, SyncEngine, SyncWatchdog};
use tracing_subscriber::EnvFilter;

/// Procure-Sync: a cache-first mirror of a procurement reporting site
///
/// With no mode flag, runs a full sync of every centre, date and farmer
/// detail page. With --centre or a date flag, answers one request from the
/// local cache, syncing first when the cache is missing or stale.
#[derive(Parser, Debug)]
#[command(name = "procure-sync")]
#[command(version = "0.1.0")]
#[command(about = "A cache-first mirror of a procurement reporting site", long_about = None)]
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

    /// Only refresh the centre list
    #[arg(long)]
    sync_centres: bool,

    /// Centre to query; repeat for several
    #[arg(long = "centre", value_name = "NAME")]
    centres: Vec<String>,

    /// Single date to query
    #[arg(long, value_parser = parse_cli_date, conflicts_with_all = ["from", "to", "latest"])]
    date: Option<NaiveDate>,

    /// Start of a date range
    #[arg(long, value_parser = parse_cli_date, conflicts_with = "latest")]
    from: Option<NaiveDate>,

    /// End of a date range
    #[arg(long, value_parser = parse_cli_date, conflicts_with = "latest")]
    to: Option<NaiveDate>,

    /// Only the most recent date of each centre
    #[arg(long)]
    latest: bool,

    /// Sync even if the cache is fresh
    #[arg(long, conflicts_with = "no_sync")]
    force_refresh: bool,

    /// Never sync; report missing data instead
    #[arg(long)]
    no_sync: bool,

    /// Include farmer transactions
    #[arg(long)]
    details: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "recent_logs", "sync_centres"])]
    stats: bool,

    /// Validate config and print it without touching the network
    #[arg(long, conflicts_with_all = ["stats", "recent_logs", "sync_centres"])]
    dry_run: bool,

    /// Print the N most recent activity log records and exit
    #[arg(long, value_name = "N")]
    recent_logs: Option<usize>,
}

impl Cli {
    fn is_request(&self) -> bool {
        !self.centres.is_empty()
            || self.date.is_some()
            || self.from.is_some()
            || self.to.is_some()
            || self.latest
            || self.details
            || self.no_sync
            || self.force_refresh
    }

    fn request_context(&self) -> RequestContext {
        let mut ctx = RequestContext::new()
            .force_refresh(self.force_refresh)
            .sync_if_missing(!self.no_sync)
            .include_details(self.details);

        ctx = match self.centres.as_slice() {
            [] => ctx.all_centres(),
            [single] => ctx.centre(single.clone()),
            many => ctx.centres(many.to_vec()),
        };

        if let Some(date) = self.date {
            ctx.date(date)
        } else if self.from.is_some() || self.to.is_some() {
            ctx.range(self.from, self.to)
        } else if self.latest {
            ctx.latest()
        } else {
            ctx
        }
    }
}

fn parse_cli_date(raw: &str) -> Result<NaiveDate, String> {
    normalize_date(raw).ok_or_else(|| format!("unrecognised date '{}'", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let database = Path::new(&config.output.database_path);
    if cli.stats {
        return handle_stats(&config, database);
    }

    let log_sink = Arc::new(SqliteLogSink::new(database).context("Failed to open activity log")?);
    if let Some(limit) = cli.recent_logs {
        print_logs(&log_sink.recent(limit)?);
        return Ok(());
    }

    let config = Arc::new(config);
    let sink: Arc<dyn LogSink> = log_sink;

    let shutdown = Arc::new(ShutdownRegistry::new());
    {
        let sink = Arc::clone(&sink);
        shutdown.register(move || sink.warn("main", "Interrupted by shutdown signal"));
    }
    let _signals = shutdown.listen();

    if cli.sync_centres {
        handle_sync_centres(config, sink).await
    } else if cli.is_request() {
        handle_request(config, sink, cli.request_context()).await
    } else {
        handle_full_sync(config, sink).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("procure_sync=info,warn"),
            1 => EnvFilter::new("procure_sync=debug,info"),
            2 => EnvFilter::new("procure_sync=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Procure-Sync Dry Run ===\n");

    println!("Source:");
    println!("  Entry URL: {}", config.source.entry_url);
    println!("  Bootstrap session: {}", config.source.bootstrap);
    println!("  Request timeout: {}s", config.source.request_timeout_secs);

    println!("\nFetcher:");
    println!("  Request delay: {}ms", config.fetcher.request_delay_ms);

    println!("\nFreshness thresholds:");
    println!("  OPEN: {}h", config.freshness.open_hours);
    println!("  CLOSING: {}h", config.freshness.closing_hours);
    println!("  CLOSED: {}h", config.freshness.closed_hours);

    println!("\nSync:");
    println!("  Workers: {}", config.sync.workers);
    println!("  Skip unchanged pages: {}", config.sync.skip_unchanged);

    println!("\nWatchdog:");
    println!("  Timeout: {}s", config.watchdog.timeout_secs);
    println!("  Poll interval: {}s", config.watchdog.poll_interval_secs);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, database: &Path) -> anyhow::Result<()> {
    println!("Database: {}\n", database.display());

    let storage = SqliteStorage::new(database)?;
    let freshness = FreshnessManager::new(&config.freshness);
    let stats = load_statistics(&storage, &freshness, Utc::now())?;
    print_statistics(&stats);

    Ok(())
}

async fn build_engine(config: &Arc<Config>, sink: Arc<dyn LogSink>) -> anyhow::Result<SyncEngine<SqliteStorage>> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let fetcher = Fetcher::connect(config, None).await?;
    Ok(SyncEngine::new(Arc::clone(config), fetcher, storage, sink))
}

/// Handles --sync-centres: refreshes the centre list only
async fn handle_sync_centres(config: Arc<Config>, sink: Arc<dyn LogSink>) -> anyhow::Result<()> {
    let mut engine = build_engine(&config, sink).await?;
    let count = engine.sync_centres().await?;
    println!("✓ {} centres synced", count);
    Ok(())
}

/// Routes a single request and prints the response
async fn handle_request(
    config: Arc<Config>,
    sink: Arc<dyn LogSink>,
    ctx: RequestContext,
) -> anyhow::Result<()> {
    let engine = build_engine(&config, sink).await?;
    let mut router = RequestRouter::new(engine);

    let response = router.route(&ctx).await;
    print_response(&response);

    if response.status == RouteStatus::Failed {
        anyhow::bail!("Request failed: {}", response.message);
    }
    Ok(())
}

/// Runs the four-phase full sync under the watchdog
async fn handle_full_sync(config: Arc<Config>, sink: Arc<dyn LogSink>) -> anyhow::Result<()> {
    let watchdog = Arc::new(SyncWatchdog::new(&config.watchdog, Arc::clone(&sink)));
    watchdog.start();

    let orchestrator =
        FullSyncOrchestrator::sqlite(Arc::clone(&config), sink).with_watchdog(Arc::clone(&watchdog));
    let result = orchestrator.run().await;
    watchdog.stop().await;

    let report = result.context("Full sync failed")?;
    print_report(&report);
    Ok(())
}
