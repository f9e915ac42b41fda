//! AniList crawler main entry point
//!
//! This is the command-line interface for harvesting media records.

use anilist_crawler::config::{default_config_with_hash, load_config_with_hash, validate};
use anilist_crawler::crawler::{run_crawl, RunSpec};
use anilist_crawler::output::print_summary;
use anyhow::Context;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code used when the run cannot even start
const EXIT_ABORTED: u8 = 2;

/// AniList crawler: harvests media records into SQLite, a search index and JSON files
///
/// Either fetches one record by id, or walks the paginated media listing from a
/// start page up to an end page or until the API reports the last page.
#[derive(Parser, Debug)]
#[command(name = "anilist-crawler")]
#[command(version)]
#[command(about = "Harvests AniList media records into local sinks", long_about = None)]
#[command(group(ArgGroup::new("target").required(true).args(["anime", "page"])))]
struct Cli {
    /// Path to TOML configuration file (defaults to a filesystem-only setup)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Crawl a single anime by id
    #[arg(long, value_name = "ID")]
    anime: Option<i64>,

    /// Crawl a page range: START, START- (until the last page) or START-END
    #[arg(long, value_name = "RANGE")]
    page: Option<String>,

    /// Override the number of concurrent workers
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match try_main(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

async fn try_main(cli: Cli) -> anyhow::Result<u8> {
    let spec = match (cli.anime, cli.page.as_deref()) {
        (Some(id), _) => RunSpec::single_item(id),
        (None, Some(range)) => RunSpec::parse_page_range(range)?,
        (None, None) => anyhow::bail!("either --anime or --page is required"),
    };

    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => {
            tracing::info!("No configuration given, using built-in defaults");
            default_config_with_hash()?
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
        validate(&config).context("invalid --workers")?;
    }

    let report = run_crawl(&config, &config_hash, &spec).await?;

    if !cli.quiet {
        print_summary(&report);
    }

    Ok(report.exit_code())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("anilist_crawler=info,warn"),
            1 => EnvFilter::new("anilist_crawler=debug,info"),
            2 => EnvFilter::new("anilist_crawler=trace,debug"),
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
