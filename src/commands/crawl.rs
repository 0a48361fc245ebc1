use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use pib_crawler::config::Config;
use pib_crawler::crawler::discovery::discovery_for;
use pib_crawler::crawler::fetcher::DetailFetcher;
use pib_crawler::crawler::pipeline::{CoordinatorConfig, CrawlCoordinator, DayReport, DayStatus};
use pib_crawler::crawler::PortalClient;
use pib_crawler::models::CrawlTask;
use pib_crawler::parser::ReleaseExtractor;
use pib_crawler::storage::checkpoint::{CheckpointManager, RangeProgress};
use pib_crawler::storage::{
    partition_by_year, FanoutSink, JsonExporter, PartitionedJsonlSink, SqliteSink,
};

use super::{parse_portal, FilterArgs, WindowArgs};

pub struct CrawlParams {
    pub window: WindowArgs,
    pub filters: FilterArgs,
    pub portal: String,
    pub limit: Option<usize>,
    pub workers: Option<usize>,
    pub output: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
    pub partitioned: bool,
    pub resume: bool,
}

pub async fn crawl(mut config: Config, params: CrawlParams) -> Result<()> {
    let window = params.window.window()?;
    let portal = parse_portal(&params.portal)?;

    if let Some(workers) = params.workers {
        config.crawler.workers = workers;
    }
    if let Some(output) = params.output {
        config.output.checkpoint_dir = output.join("checkpoints");
        config.output.dir = output;
    }
    if params.sqlite.is_some() {
        config.output.sqlite = params.sqlite;
    }
    config.validate().context("Invalid configuration")?;

    println!("Starting PIB Press Release Crawl");
    println!("================================");
    println!("  Portal: {portal}");
    println!("  Dates: {} to {} ({} days)", window.start, window.end, window.len());
    println!("  Workers: {}", config.crawler.workers);

    let task = CrawlTask::new(window, params.filters.filters(), portal).with_limit(params.limit);

    // Sinks
    let consolidated = config.output.dir.join(&config.output.consolidated_file);
    let mut sink = FanoutSink::new();
    if params.partitioned {
        sink = sink.with(PartitionedJsonlSink::new(&config.output.dir));
    }
    if let Some(path) = &config.output.sqlite {
        sink = sink.with(SqliteSink::new(path)?);
    }
    sink = sink.with(JsonExporter::new(&consolidated));

    let checkpoints = CheckpointManager::new(&config.output.checkpoint_dir)?;
    let progress = RangeProgress::open(checkpoints, &task, params.resume)?;

    let client = Arc::new(PortalClient::new(&config).context("Failed to create HTTP client")?);

    // Ctrl-C stops the crawl at the next date boundary
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nInterrupt received; finishing the current date...");
            let _ = cancel_tx.send(true);
        }
    });

    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<DayReport>();
    let printer = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            print_day(&report);
        }
    });

    let coordinator = CrawlCoordinator::new(
        discovery_for(portal, client.clone()),
        Arc::new(DetailFetcher::new(client)),
        Arc::new(ReleaseExtractor::new()),
        Arc::new(sink),
        CoordinatorConfig::from_config(&config),
    )
    .with_cancellation(cancel_rx)
    .with_checkpoint(progress)
    .with_reporter(report_tx);

    let outcome = coordinator.run(&task).await?;

    drop(coordinator);
    let _ = printer.await;

    let summary = &outcome.summary;

    // Print summary
    println!("\nCrawl Summary");
    println!("=============");
    println!("Dates processed: {}", summary.dates_processed);
    println!("Dates failed: {}", summary.dates_failed);
    if summary.dates_skipped > 0 {
        println!("Dates skipped (checkpoint): {}", summary.dates_skipped);
    }
    println!("Identifiers discovered: {}", summary.discovered);
    println!("Records extracted: {}", summary.extracted);
    println!("Failed items: {}", summary.failed_items);
    println!("Duplicates skipped: {}", summary.skipped_duplicates);
    println!("Yield: {:.1}%", summary.yield_rate() * 100.0);
    println!("Output: {}", consolidated.display());
    if let Some(path) = &config.output.sqlite {
        println!("Database: {}", path.display());
    }
    if summary.cancelled {
        println!("\nCrawl was interrupted; rerun with --resume to continue.");
    }
    println!("\n{summary}");

    Ok(())
}

fn print_day(report: &DayReport) {
    match report.status {
        DayStatus::Completed => println!(
            "[{}] {} discovered, {} extracted, {} failed",
            report.date, report.discovered, report.extracted, report.failed
        ),
        DayStatus::Skipped => println!("[{}] already completed, skipped", report.date),
        DayStatus::Failed => println!(
            "[{}] FAILED [{}] ({} discovered, {} failed)",
            report.date,
            report.error.map_or("unknown", |category| category.as_str()),
            report.discovered,
            report.failed
        ),
    }
}

pub fn stats(config: Config, sqlite: Option<PathBuf>, input: Option<PathBuf>) -> Result<()> {
    println!("Export Statistics");
    println!("=================");

    let sqlite = match (sqlite, &input) {
        (Some(path), _) => Some(path),
        (None, None) => config.output.sqlite.clone(),
        (None, Some(_)) => None,
    };

    if let Some(path) = sqlite {
        let store = SqliteSink::new(&path)?;
        println!("Database: {}", path.display());
        println!("Total records: {}", store.count()?);
        println!();
        for row in store.count_by_year()? {
            println!("  {}: {}", row.year, row.records);
        }
        return Ok(());
    }

    let path = input.unwrap_or_else(|| config.output.dir.join(&config.output.consolidated_file));
    let records = JsonExporter::load(&path)?;
    println!("Export: {}", path.display());
    println!("Total records: {}", records.len());
    println!();

    let fallback = chrono::Local::now().date_naive();
    for (year, batch) in partition_by_year(&records, fallback) {
        println!("  {}: {}", year, batch.len());
    }

    let substituted = records.iter().filter(|r| r.original_prid().is_some()).count();
    println!("\nCanonical substitutions: {substituted}");

    Ok(())
}
