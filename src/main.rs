//! Issue-Harvest main entry point
//!
//! This is the command-line interface for the Issue-Harvest repository crawler.

use anyhow::Context;
use clap::Parser;
use issue_harvest::config::{load_config_with_hash, Config};
use issue_harvest::engine::EngineSettings;
use issue_harvest::output::{load_statistics, print_statistics, RECENT_RUN_LIMIT};
use issue_harvest::storage::{open_storage, LanguageSource, RunLog, SqliteStorage};
use issue_harvest::upstream::GitHubClient;
use issue_harvest::{CrawlEngine, Phase, PhaseOutcome, Scheduler};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

type Engine = CrawlEngine<SqliteStorage, GitHubClient>;

/// Issue-Harvest: a resumable, rate-limit-aware repository crawler
///
/// Issue-Harvest discovers GitHub repositories written in the tracked
/// languages, mirrors their open issues into SQLite, keeps the mirror fresh
/// and prunes stale entries. Every phase resumes where a rate limit or a
/// restart left it.
#[derive(Parser, Debug)]
#[command(name = "issue-harvest")]
#[command(version)]
#[command(about = "A resumable, rate-limit-aware repository crawler", long_about = None)]
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

    /// Run a single phase (ingest, refresh or prune) once and exit
    #[arg(long, value_name = "PHASE", conflicts_with_all = ["dry_run", "stats"])]
    once: Option<Phase>,

    /// Validate config and show the schedule without crawling
    #[arg(long, conflicts_with_all = ["once", "stats"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["once", "dry_run"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let mut storage = open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open {}", config.storage.database_path))?;

    let names: Vec<String> = config.languages.iter().map(|l| l.name.clone()).collect();
    let languages = storage.sync_languages(&names)?;
    tracing::info!(
        "Tracking {} languages: {}",
        languages.len(),
        names.join(", ")
    );

    if cli.stats {
        println!("Database: {}\n", config.storage.database_path);
        let stats = load_statistics(&storage, RECENT_RUN_LIMIT)?;
        print_statistics(&stats);
        return Ok(());
    }

    let interrupted = storage.mark_interrupted_runs()?;
    if interrupted > 0 {
        tracing::warn!("Marked {} unfinished runs as interrupted", interrupted);
    }

    let upstream = GitHubClient::new(&config.github)?;
    let engine = Arc::new(CrawlEngine::new(
        Arc::new(Mutex::new(storage)),
        Arc::new(upstream),
        EngineSettings::from_config(&config, config_hash),
    ));

    match cli.once {
        Some(phase) => handle_once(&engine, phase).await,
        None => handle_schedule(engine, &config).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("issue_harvest=info,warn"),
            1 => EnvFilter::new("issue_harvest=debug,info"),
            2 => EnvFilter::new("issue_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the schedule
fn handle_dry_run(config: &Config) {
    println!("=== Issue-Harvest Dry Run ===\n");

    println!("GitHub:");
    println!("  API: {}", config.github.api_url);
    println!("  User agent: {}", config.github.user_agent);
    println!(
        "  Token: {}",
        if config.github.resolve_token().is_some() {
            "configured"
        } else {
            "none (unauthenticated rate limits apply)"
        }
    );
    println!(
        "  Search: {} per page, up to {} pages, qualifiers '{}'",
        config.github.per_page, config.github.max_search_pages, config.github.search_qualifiers
    );

    println!("\nSchedule:");
    for (phase, schedule) in [
        (Phase::Ingest, &config.schedule.ingest),
        (Phase::Refresh, &config.schedule.refresh),
        (Phase::Prune, &config.schedule.prune),
    ] {
        println!(
            "  {}: first after {} min, then every {} min",
            phase, schedule.initial_delay_mins, schedule.interval_mins
        );
    }

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Refresh after: {} min", config.storage.refresh_after_mins);
    println!("  Prune after: {} h", config.storage.prune_after_hours);

    println!("\nLanguages ({}):", config.languages.len());
    for entry in &config.languages {
        println!("  - {}", entry.name);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --once mode: runs a single phase and exits
async fn handle_once(engine: &Engine, phase: Phase) -> anyhow::Result<()> {
    let outcome = engine
        .run_phase(phase)
        .await
        .with_context(|| format!("{} run failed", phase))?;

    match outcome {
        PhaseOutcome::Completed(report) => println!("✓ {}", report),
        PhaseOutcome::RateLimited(report) => {
            println!("⏸ {}", report);
            println!("Run again later to resume at the first unfinished language.");
        }
        PhaseOutcome::Skipped => println!("{} is already running", phase),
    }

    Ok(())
}

/// Handles the default mode: runs every phase on its timer until Ctrl-C
async fn handle_schedule(engine: Arc<Engine>, config: &Config) -> anyhow::Result<()> {
    let handle = Scheduler::from_config(engine, &config.schedule).start();
    tracing::info!("Scheduler started, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;

    Ok(())
}
