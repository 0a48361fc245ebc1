use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pib_crawler::config::Config;

mod commands;

use commands::{FilterArgs, WindowArgs};

#[derive(Parser)]
#[command(
    name = "pib-crawler",
    version,
    about = "Press release harvester for the legacy and modern PIB portals",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a date or date range and export the releases
    Crawl {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Portal generation (legacy, modern)
        #[arg(short, long, default_value = "modern")]
        portal: String,

        /// Maximum identifiers processed per date
        #[arg(short, long)]
        limit: Option<usize>,

        /// Concurrent workers per date
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also store records in this SQLite database
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// Also write per-day JSON Lines files grouped by publication year
        #[arg(long, default_value = "false")]
        partitioned: bool,

        /// Skip dates completed by a previous run of the same range
        #[arg(long, default_value = "false")]
        resume: bool,
    },

    /// List the identifiers discovered for a date or range
    Discover {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Portal generation (legacy, modern)
        #[arg(short, long, default_value = "modern")]
        portal: String,
    },

    /// Fetch and extract a single release
    Fetch {
        /// Release identifier
        #[arg(long)]
        prid: String,

        /// Portal generation (legacy, modern)
        #[arg(short, long, default_value = "modern")]
        portal: String,
    },

    /// Show per-year record counts of an export
    Stats {
        /// SQLite database written by `crawl --sqlite`
        #[arg(long, conflicts_with = "input")]
        sqlite: Option<PathBuf>,

        /// Consolidated JSON export
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing/logging
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    tracing::info!("pib-crawler starting");

    match cli.command {
        Commands::Crawl {
            window,
            filters,
            portal,
            limit,
            workers,
            output,
            sqlite,
            partitioned,
            resume,
        } => {
            tracing::info!(
                portal = %portal,
                limit = ?limit,
                workers = ?workers,
                resume = %resume,
                "Starting crawl command"
            );
            commands::crawl(
                config,
                commands::CrawlParams {
                    window,
                    filters,
                    portal,
                    limit,
                    workers,
                    output,
                    sqlite,
                    partitioned,
                    resume,
                },
            )
            .await?;
        }

        Commands::Discover {
            window,
            filters,
            portal,
        } => {
            tracing::info!(portal = %portal, "Starting discover command");
            commands::discover(config, window, filters, portal).await?;
        }

        Commands::Fetch { prid, portal } => {
            tracing::info!(prid = %prid, portal = %portal, "Starting fetch command");
            commands::fetch(config, prid, portal).await?;
        }

        Commands::Stats { sqlite, input } => {
            commands::stats(config, sqlite, input)?;
        }
    }

    tracing::info!("pib-crawler completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let default_directive = if verbose {
        "pib_crawler=debug,info".to_string()
    } else {
        format!("pib_crawler={level},warn")
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
        }
    }

    Ok(())
}
