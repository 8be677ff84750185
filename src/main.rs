//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest pagination engine.

use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::output::{print_checkpoints, print_plan, print_report};
use catalog_harvest::Harvester;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a resumable, batched pagination engine
///
/// Catalog-Harvest pages through product catalogs and public registers in
/// concurrent batches, retries failing pages, and checkpoints its progress
/// so that an interrupted run continues where it stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A resumable, batched pagination engine", long_about = None)]
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

    /// Discard checkpoints and journals of the selected jobs before running
    #[arg(long, conflicts_with = "status")]
    fresh: bool,

    /// Only run the named job (repeatable)
    #[arg(long = "job", value_name = "NAME")]
    jobs: Vec<String>,

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with = "status")]
    dry_run: bool,

    /// Show stored checkpoints and exit
    #[arg(long, conflicts_with = "dry_run")]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.status {
        handle_status(config)?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.dry_run {
        handle_dry_run(config, &cli.jobs)?;
        return Ok(ExitCode::SUCCESS);
    }

    handle_harvest(config, &cli.jobs, cli.fresh).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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

/// Handles the --status mode: lists stored checkpoints
fn handle_status(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let harvester = Harvester::from_config(config)?;
    print_checkpoints(&harvester.checkpoints()?);
    Ok(())
}

/// Handles the --dry-run mode: shows resume points and batches per job
fn handle_dry_run(config: Config, jobs: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Engine:");
    println!("  Batch size: {}", config.engine.batch_size);
    println!("  Page attempts: {}", config.engine.page_attempts);
    println!("  Discovery attempts: {}", config.engine.discovery_attempts);
    println!("  Batch delay: {}ms", config.engine.batch_delay_ms);
    println!("\nCheckpoints: {:?} in {}", config.checkpoint.backend, config.checkpoint.dir);
    println!("Output: {}\n", config.output.dir);

    let harvester = Harvester::from_config(config)?;
    let selected = harvester.select_jobs(jobs)?;
    print_plan(&harvester.plan(&selected)?);

    println!("Configuration is valid. Run without --dry-run to start harvesting.");
    Ok(())
}

/// Handles the main harvest mode
///
/// Exits non-zero when any job failed, after every selected job ran and the
/// combined output was written.
async fn handle_harvest(
    config: Config,
    jobs: &[String],
    fresh: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut harvester = Harvester::from_config(config)?;
    let selected = harvester.select_jobs(jobs)?;

    if fresh {
        tracing::info!("Fresh run requested");
        harvester.reset(&selected)?;
    }

    let report = harvester.run(&selected).await?;
    print_report(&report);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("{} job(s) failed", report.failures.len());
        Ok(ExitCode::FAILURE)
    }
}
