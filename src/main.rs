//! listing-harvest main entry point
//!
//! This is the command-line interface for the incremental listing harvester.

use anyhow::Context;
use clap::{Parser, Subcommand};
use listing_harvest::config::{load_config_with_hash, Config};
use listing_harvest::crawler;
use listing_harvest::output::{load_statistics, print_run_results, print_statistics};
use listing_harvest::record::Category;
use listing_harvest::storage::{open_storage, ListingTable, RunKind};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Number of runs shown by `stats`
const RECENT_RUNS: usize = 10;

/// listing-harvest: an incremental real-estate listing harvester
///
/// Walks listing catalogs, stores every new listing once, and keeps stored
/// listings up to date on refresh: changed fields are rewritten and
/// vanished listings are flagged as removed.
#[derive(Parser, Debug)]
#[command(name = "listing-harvest")]
#[command(version)]
#[command(about = "An incremental real-estate listing harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Validate config and show what would run without fetching anything
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the catalogs and store new listings
    Harvest(Selection),

    /// Re-check stored listings for changes and removals
    Refresh(Selection),

    /// Show listing counts and recent runs from the database
    Stats,
}

#[derive(clap::Args, Debug)]
struct Selection {
    /// Only process this site
    #[arg(long)]
    site: Option<String>,

    /// Only process this category (buy or rent)
    #[arg(long)]
    category: Option<Category>,
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

    match cli.command {
        Command::Stats => handle_stats(&config),
        Command::Harvest(selection) if cli.dry_run => {
            handle_dry_run(&config, RunKind::Harvest, &selection)
        }
        Command::Refresh(selection) if cli.dry_run => {
            handle_dry_run(&config, RunKind::Refresh, &selection)
        }
        Command::Harvest(selection) => {
            handle_run(&config, &config_hash, RunKind::Harvest, selection).await
        }
        Command::Refresh(selection) => {
            handle_run(&config, &config_hash, RunKind::Refresh, selection).await
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
            0 => EnvFilter::new("listing_harvest=info,warn"),
            1 => EnvFilter::new("listing_harvest=debug,info"),
            2 => EnvFilter::new("listing_harvest=trace,debug"),
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

/// Listing tables the configuration can populate
fn configured_tables(config: &Config) -> Vec<ListingTable> {
    config
        .sites
        .iter()
        .flat_map(|site| {
            Category::all()
                .into_iter()
                .filter(|&category| site.catalog_template(category).is_some())
                .map(|category| ListingTable::new(&site.name, category))
        })
        .collect()
}

/// Handles `--dry-run`: shows the settings and the runs that would start
fn handle_dry_run(config: &Config, kind: RunKind, selection: &Selection) -> anyhow::Result<()> {
    println!("=== listing-harvest Dry Run ({}) ===\n", kind.to_db_string());

    println!("Fetch:");
    println!("  Max retries: {}", config.fetch.max_retries);
    println!("  Element timeout: {}ms", config.fetch.element_timeout_ms);
    println!(
        "  Retry delay: {}ms (+ up to {}ms jitter)",
        config.fetch.retry_delay_ms, config.fetch.retry_jitter_ms
    );

    println!("\nHarvest:");
    println!("  Page limit: {}", config.harvest.page_limit);
    println!("  Batch size: {}", config.harvest.batch_size);

    println!("\nStore:");
    println!("  Database: {}", config.store.database_path);

    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        if selection.site.as_deref().is_some_and(|name| name != site.name) {
            continue;
        }
        println!("  - {} ({})", site.name, site.base_url);
        for category in Category::all() {
            if selection.category.is_some_and(|c| c != category) {
                continue;
            }
            match site.catalog_template(category) {
                Some(template) => println!(
                    "    * {} -> {}",
                    ListingTable::new(&site.name, category).name(),
                    template
                ),
                None => println!("    * {}: no catalog", category),
            }
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles `stats`: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.store.database_path);

    let storage = open_storage(Path::new(&config.store.database_path))
        .context("Failed to open the listing database")?;

    let stats = load_statistics(&storage, &configured_tables(config), RECENT_RUNS)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles `harvest` and `refresh`
async fn handle_run(
    config: &Config,
    config_hash: &str,
    kind: RunKind,
    selection: Selection,
) -> anyhow::Result<()> {
    tracing::info!(
        "Starting {} (site: {}, category: {})",
        kind.to_db_string(),
        selection.site.as_deref().unwrap_or("all"),
        selection
            .category
            .map_or_else(|| "all".to_string(), |c| c.to_string())
    );

    let results = crawler::run(
        config,
        config_hash,
        kind,
        selection.site.as_deref(),
        selection.category,
    )
    .await
    .with_context(|| format!("{} failed", kind.to_db_string()))?;

    print_run_results(&results);
    tracing::info!("{} completed successfully", kind.to_db_string());

    Ok(())
}
