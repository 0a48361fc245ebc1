//! Date-cursor crawl coordinator
//!
//! Each date of a task runs through the same cycle:
//!
//! ```text
//! ┌───────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Discovery │────▶│   Workers   │────▶│  Collector  │────▶│    Sink     │
//! │ (one day) │     │ fetch/parse │     │ (completion │     │ (write_day) │
//! └───────────┘     │  /resolve   │     │   order)    │     └─────────────┘
//!                   └─────────────┘     └─────────────┘
//!        │                │                    │
//!        └──── mpsc ──────┴────── mpsc ────────┘
//! ```
//!
//! A day's batch reaches the sink before the cursor advances. Cancellation is
//! observed between dates only.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pib_crawler::config::Config;
//! use pib_crawler::crawler::discovery::discovery_for;
//! use pib_crawler::crawler::fetcher::DetailFetcher;
//! use pib_crawler::crawler::pipeline::{CoordinatorConfig, CrawlCoordinator};
//! use pib_crawler::crawler::PortalClient;
//! use pib_crawler::models::{CrawlTask, CrawlWindow, PortalGeneration, SearchFilters};
//! use pib_crawler::parser::ReleaseExtractor;
//! use pib_crawler::storage::JsonExporter;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let client = Arc::new(PortalClient::new(&config)?);
//!
//! let coordinator = CrawlCoordinator::new(
//!     discovery_for(PortalGeneration::Modern, client.clone()),
//!     Arc::new(DetailFetcher::new(client)),
//!     Arc::new(ReleaseExtractor::new()),
//!     Arc::new(JsonExporter::new("output/extracted_data.json")),
//!     CoordinatorConfig::from_config(&config),
//! );
//!
//! let window = CrawlWindow::parse("2024-01-01", "2024-01-07").unwrap();
//! let task = CrawlTask::new(window, SearchFilters::default(), PortalGeneration::Modern);
//! let outcome = coordinator.run(&task).await?;
//!
//! println!("{}", outcome.summary);
//! # Ok(())
//! # }
//! ```

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::crawler::dedup::{CanonicalResolver, DedupLedger, Resolution};
use crate::crawler::discovery::Discovery;
use crate::crawler::fetcher::DocumentFetcher;
use crate::error::{CrawlErrorTrait, Error, ErrorCategory, Result};
use crate::models::{CrawlSummary, CrawlTask, CrawlWindow, DocumentId, ExtractedRecord};
use crate::parser::Extractor;
use crate::storage::checkpoint::RangeProgress;
use crate::storage::PersistenceSink;

// ============================================================================
// Configuration
// ============================================================================

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum concurrent workers per date
    pub workers: usize,

    /// Job and result channel buffer size
    pub channel_buffer_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            channel_buffer_size: 256,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.crawler.workers,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Message from the coordinator to a worker
#[derive(Debug, Clone)]
struct WorkItem {
    job_id: u64,
    id: DocumentId,
}

/// Result message for one discovered identifier
#[derive(Debug)]
enum ItemOutcome {
    /// A record was produced (original or canonical substitute)
    Extracted {
        job_id: u64,
        record: Box<ExtractedRecord>,
        substituted: bool,
    },
    /// Identifier was already claimed earlier in the run
    Duplicate { job_id: u64, id: DocumentId },
    /// Canonical sibling belongs to another worker
    Suppressed {
        job_id: u64,
        id: DocumentId,
        canonical: DocumentId,
    },
    /// Fetch failed after its retry budget
    Failed {
        job_id: u64,
        id: DocumentId,
        error: String,
        category: ErrorCategory,
    },
}

/// What the collector gathered for one date
#[derive(Debug, Default)]
struct DayBatch {
    records: Vec<ExtractedRecord>,
    substituted: u64,
    duplicates: u64,
    failed: u64,
    last_failure: Option<ErrorCategory>,
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Final state of one date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    /// Batch flushed to the sink
    Completed,
    /// Already done in a resumed checkpoint
    Skipped,
    /// Discovery failed, every item failed, or the flush failed
    Failed,
}

/// Per-date progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub discovered: usize,
    pub extracted: usize,
    pub failed: u64,

    /// Category of the error that failed the date
    pub error: Option<ErrorCategory>,
}

impl DayReport {
    fn new(date: NaiveDate, status: DayStatus) -> Self {
        Self {
            date,
            status,
            discovered: 0,
            extracted: 0,
            failed: 0,
            error: None,
        }
    }

    fn failed(date: NaiveDate, category: ErrorCategory) -> Self {
        Self {
            error: Some(category),
            ..Self::new(date, DayStatus::Failed)
        }
    }
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub summary: CrawlSummary,

    /// Every record of the run, in per-date completion order
    pub records: Vec<ExtractedRecord>,
}

// ============================================================================
// Worker
// ============================================================================

/// Shared state every worker clones
#[derive(Clone)]
struct WorkerContext {
    fetcher: Arc<dyn DocumentFetcher>,
    extractor: Arc<dyn Extractor>,
    resolver: Arc<CanonicalResolver>,
}

impl WorkerContext {
    /// claim -> fetch -> extract -> resolve
    async fn process(&self, item: WorkItem, date: NaiveDate) -> ItemOutcome {
        let WorkItem { job_id, id } = item;

        if !self.resolver.ledger().claim(&id) {
            return ItemOutcome::Duplicate { job_id, id };
        }

        let raw = match self.fetcher.fetch(&id).await {
            Ok(raw) => raw,
            Err(e) => {
                return ItemOutcome::Failed {
                    job_id,
                    id,
                    error: e.to_string(),
                    category: e.category(),
                }
            }
        };

        let record = self.extractor.extract(&raw);

        let (mut record, substituted) = match self.resolver.resolve(&id, record).await {
            Resolution::Keep(record) => (record, false),
            Resolution::Substitute(record) => (record, true),
            Resolution::Suppressed { canonical } => {
                return ItemOutcome::Suppressed {
                    job_id,
                    id,
                    canonical,
                }
            }
        };

        record.metadata.discovered_on = Some(date);

        ItemOutcome::Extracted {
            job_id,
            record: Box::new(record),
            substituted,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Drives a [`CrawlTask`] one date at a time
pub struct CrawlCoordinator {
    discovery: Arc<dyn Discovery>,
    sink: Arc<dyn PersistenceSink>,
    context: WorkerContext,
    config: CoordinatorConfig,
    cancel: Option<watch::Receiver<bool>>,
    progress: Option<RangeProgress>,
    reporter: Option<mpsc::UnboundedSender<DayReport>>,
}

impl CrawlCoordinator {
    /// Create a coordinator with a fresh dedup ledger
    pub fn new(
        discovery: Arc<dyn Discovery>,
        fetcher: Arc<dyn DocumentFetcher>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn PersistenceSink>,
        config: CoordinatorConfig,
    ) -> Self {
        let ledger = Arc::new(DedupLedger::new());
        let resolver = Arc::new(CanonicalResolver::new(
            ledger,
            Arc::clone(&fetcher),
            Arc::clone(&extractor),
        ));

        Self {
            discovery,
            sink,
            context: WorkerContext {
                fetcher,
                extractor,
                resolver,
            },
            config,
            cancel: None,
            progress: None,
            reporter: None,
        }
    }

    /// Stop between dates once the flag turns `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Skip and record completed dates
    pub fn with_checkpoint(mut self, progress: RangeProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Receive a [`DayReport`] after every date
    pub fn with_reporter(mut self, reporter: mpsc::UnboundedSender<DayReport>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn ledger(&self) -> &Arc<DedupLedger> {
        self.context.resolver.ledger()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn report(&self, report: DayReport) {
        if let Some(reporter) = &self.reporter {
            let _ = reporter.send(report);
        }
    }

    /// Run the whole task
    ///
    /// Per-item and per-date failures are counted in the summary and never
    /// abort the run. Only a failing consolidated export is returned as an
    /// error.
    pub async fn run(&self, task: &CrawlTask) -> Result<CrawlOutcome> {
        tracing::info!(
            task_id = %task.id,
            portal = %self.discovery.portal(),
            from = %task.window.start,
            to = %task.window.end,
            workers = self.config.workers,
            "Starting crawl"
        );

        if let Err(e) = self.discovery.preflight().await {
            tracing::error!(
                portal = %self.discovery.portal(),
                category = e.category().as_str(),
                error = %e,
                "Session harvest failed at crawl start; continuing"
            );
        }

        let mut summary = CrawlSummary::default();
        let mut all_records = self.restore_completed(task)?;

        for date in task.window.days() {
            if self.is_cancelled() {
                tracing::warn!(date = %date, "Crawl cancelled; stopping before date");
                summary.cancelled = true;
                break;
            }

            if self
                .progress
                .as_ref()
                .is_some_and(|progress| progress.is_completed(date))
            {
                tracing::info!(date = %date, "Date already completed; skipping");
                summary.dates_skipped += 1;
                self.report(DayReport::new(date, DayStatus::Skipped));
                continue;
            }

            let report = self.crawl_date(task, date, &mut summary, &mut all_records).await;
            self.report(report);
        }

        self.sink.finish(&all_records)?;

        // Keep the checkpoint while any date still needs a retry
        if let Some(progress) = &self.progress {
            if !summary.cancelled && summary.dates_failed == 0 {
                if let Err(e) = progress.finalize() {
                    tracing::warn!(error = %e, "Failed to remove checkpoint");
                }
            }
        }

        tracing::info!(
            dates = summary.dates_processed,
            dates_failed = summary.dates_failed,
            dates_skipped = summary.dates_skipped,
            discovered = summary.discovered,
            extracted = summary.extracted,
            failed = summary.failed_items,
            duplicates = summary.skipped_duplicates,
            cancelled = summary.cancelled,
            "Crawl completed"
        );

        Ok(CrawlOutcome {
            summary,
            records: all_records,
        })
    }

    /// Records of checkpointed dates, as persisted by the earlier run
    fn restore_completed(&self, task: &CrawlTask) -> Result<Vec<ExtractedRecord>> {
        let Some(progress) = &self.progress else {
            return Ok(Vec::new());
        };
        if progress.snapshot().completed.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<ExtractedRecord> = self
            .sink
            .restore()?
            .into_iter()
            .filter(|record| {
                record.metadata.discovered_on.is_some_and(|date| {
                    task.window.start <= date
                        && date <= task.window.end
                        && progress.is_completed(date)
                })
            })
            .collect();

        let ledger = self.context.resolver.ledger();
        for record in &records {
            ledger.claim(&record.metadata.document_id());
            if let Some(original) = record.original_prid() {
                ledger.claim(&DocumentId::new(record.metadata.portal, original));
            }
        }

        tracing::info!(records = records.len(), "Restored records of completed dates");
        Ok(records)
    }

    /// discover -> dispatch -> collect -> persist for one date
    async fn crawl_date(
        &self,
        task: &CrawlTask,
        date: NaiveDate,
        summary: &mut CrawlSummary,
        all_records: &mut Vec<ExtractedRecord>,
    ) -> DayReport {
        let discovered = match self
            .discovery
            .discover(&CrawlWindow::single(date), &task.filters)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    date = %date,
                    category = e.category().as_str(),
                    error = %e,
                    "Discovery failed; advancing"
                );
                summary.dates_failed += 1;
                return DayReport::failed(date, e.category());
            }
        };

        let mut ids = discovered.into_ids();
        if let Some(limit) = task.limit {
            ids.truncate(limit);
        }

        let total = ids.len();
        summary.discovered += total as u64;
        tracing::info!(date = %date, count = total, "Dispatching identifiers");

        let batch = match self.dispatch(ids, date).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(date = %date, error = %e, "Worker pool failed");
                summary.dates_failed += 1;
                return DayReport::failed(date, e.category());
            }
        };

        summary.extracted += batch.records.len() as u64;
        summary.failed_items += batch.failed;
        summary.skipped_duplicates += batch.duplicates;

        let mut report = DayReport {
            date,
            status: DayStatus::Completed,
            discovered: total,
            extracted: batch.records.len(),
            failed: batch.failed,
            error: None,
        };

        if total > 0 && batch.failed == total as u64 {
            tracing::error!(
                date = %date,
                failed = batch.failed,
                "Every identifier failed to fetch for this date"
            );
            summary.dates_failed += 1;
            report.status = DayStatus::Failed;
            report.error = batch.last_failure;
            return report;
        }

        if let Err(e) = self.sink.write_day(date, &batch.records) {
            tracing::error!(date = %date, error = %e, "Failed to persist day batch");
            summary.dates_failed += 1;
            all_records.extend(batch.records);
            report.status = DayStatus::Failed;
            report.error = Some(ErrorCategory::Storage);
            return report;
        }

        if let Some(progress) = &self.progress {
            if let Err(e) = progress.mark_completed(date, batch.records.len()) {
                tracing::warn!(date = %date, error = %e, "Failed to save checkpoint");
            }
        }

        tracing::info!(
            date = %date,
            discovered = total,
            extracted = batch.records.len(),
            substituted = batch.substituted,
            failed = batch.failed,
            "Date completed"
        );

        summary.dates_processed += 1;
        all_records.extend(batch.records);
        report
    }

    /// Run the worker pool over one date's identifiers
    async fn dispatch(&self, ids: Vec<DocumentId>, date: NaiveDate) -> Result<DayBatch> {
        if ids.is_empty() {
            return Ok(DayBatch::default());
        }

        let worker_count = self.config.workers.clamp(1, ids.len());
        let buffer = self.config.channel_buffer_size.max(1);

        let (job_tx, job_rx) = mpsc::channel::<WorkItem>(buffer);
        let (result_tx, mut result_rx) = mpsc::channel::<ItemOutcome>(buffer);

        let workers = self.spawn_workers(worker_count, job_rx, result_tx, date);

        let collector: JoinHandle<DayBatch> = tokio::spawn(async move {
            let mut batch = DayBatch::default();
            while let Some(outcome) = result_rx.recv().await {
                match outcome {
                    ItemOutcome::Extracted {
                        job_id,
                        record,
                        substituted,
                    } => {
                        tracing::debug!(job_id, prid = %record.prid(), "Record extracted");
                        if substituted {
                            batch.substituted += 1;
                        }
                        batch.records.push(*record);
                    }
                    ItemOutcome::Duplicate { job_id, id } => {
                        tracing::debug!(job_id, prid = %id, "Already claimed; skipped");
                        batch.duplicates += 1;
                    }
                    ItemOutcome::Suppressed {
                        job_id,
                        id,
                        canonical,
                    } => {
                        tracing::debug!(job_id, prid = %id, canonical = %canonical, "Suppressed");
                        batch.duplicates += 1;
                    }
                    ItemOutcome::Failed {
                        job_id,
                        id,
                        error,
                        category,
                    } => {
                        tracing::warn!(
                            job_id,
                            prid = %id,
                            category = category.as_str(),
                            error,
                            "Fetch failed; skipping item"
                        );
                        batch.failed += 1;
                        batch.last_failure = Some(category);
                    }
                }
            }
            batch
        });

        for (idx, id) in ids.into_iter().enumerate() {
            let item = WorkItem {
                job_id: idx as u64,
                id,
            };
            if job_tx.send(item).await.is_err() {
                tracing::error!("Failed to send work item - channel closed");
                break;
            }
        }

        // Close the job channel so workers drain and exit
        drop(job_tx);

        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }

        collector
            .await
            .map_err(|e| Error::with_source("Result collector failed", e))
    }

    fn spawn_workers(
        &self,
        count: usize,
        job_rx: mpsc::Receiver<WorkItem>,
        result_tx: mpsc::Sender<ItemOutcome>,
        date: NaiveDate,
    ) -> Vec<JoinHandle<()>> {
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let mut handles = Vec::with_capacity(count);

        for worker_id in 0..count {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let context = self.context.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };

                    let Some(item) = item else {
                        break;
                    };

                    tracing::debug!(worker_id, job_id = item.job_id, prid = %item.id, "Processing");

                    let outcome = context.process(item, date).await;
                    if result_tx.send(outcome).await.is_err() {
                        tracing::error!(worker_id, "Result channel closed");
                        break;
                    }
                }

                tracing::debug!(worker_id, "Worker shutting down");
            });

            handles.push(handle);
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscoveryResult, PortalGeneration, RawDocument, SearchFilters};
    use crate::parser::ReleaseExtractor;
    use crate::storage::checkpoint::CheckpointManager;
    use crate::utils::error::{DiscoveryError, FetchError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    struct ScriptedDiscovery {
        days: HashMap<NaiveDate, Option<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Discovery for ScriptedDiscovery {
        fn portal(&self) -> PortalGeneration {
            PortalGeneration::Modern
        }

        async fn discover(
            &self,
            window: &CrawlWindow,
            _filters: &SearchFilters,
        ) -> std::result::Result<DiscoveryResult, DiscoveryError> {
            match self.days.get(&window.start) {
                Some(Some(ids)) => Ok(ids.iter().copied().map(DocumentId::modern).collect()),
                Some(None) => Err(DiscoveryError::Fetch(FetchError::ServerError(503))),
                None => Ok(DiscoveryResult::new()),
            }
        }
    }

    struct PageFetcher {
        pages: HashMap<&'static str, String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentFetcher for PageFetcher {
        async fn fetch(&self, id: &DocumentId) -> std::result::Result<RawDocument, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(id.as_str())
                .map(|body| RawDocument::new(id.clone(), body.clone()))
                .ok_or(FetchError::ClientError(404))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        days: Mutex<Vec<(NaiveDate, Vec<String>)>>,
        finished: Mutex<Option<usize>>,
        previous: Mutex<Vec<ExtractedRecord>>,
    }

    impl PersistenceSink for MemorySink {
        fn write_day(&self, date: NaiveDate, records: &[ExtractedRecord]) -> anyhow::Result<()> {
            let mut prids: Vec<String> = records.iter().map(|r| r.prid().to_string()).collect();
            prids.sort();
            self.days.lock().unwrap().push((date, prids));
            Ok(())
        }

        fn finish(&self, records: &[ExtractedRecord]) -> anyhow::Result<()> {
            *self.finished.lock().unwrap() = Some(records.len());
            Ok(())
        }

        fn restore(&self) -> anyhow::Result<Vec<ExtractedRecord>> {
            Ok(self.previous.lock().unwrap().clone())
        }
    }

    fn previous_record(prid: &str, discovered_on: NaiveDate) -> ExtractedRecord {
        let mut record = ExtractedRecord::empty(&DocumentId::modern(prid));
        record.title = format!("Release {prid}");
        record.metadata.discovered_on = Some(discovered_on);
        record
    }

    fn english_page(title: &str) -> String {
        format!(
            r#"<html><body><h2 id="Titleh2">{title}</h2>
            <div class="innner-page-main-about-us-content-right-part"><p>Body of {title}</p></div>
            </body></html>"#
        )
    }

    fn hindi_page(english_prid: &str) -> String {
        format!(
            r#"<html><body><h2 id="Titleh2">मंत्रिमंडल ने योजना को मंजूरी दी</h2>
            <div class="ReleaseLang"><a href="/PressReleasePage.aspx?PRID={english_prid}">English</a></div>
            </body></html>"#
        )
    }

    struct Harness {
        coordinator: CrawlCoordinator,
        fetcher: Arc<PageFetcher>,
        sink: Arc<MemorySink>,
    }

    fn harness(
        days: Vec<(NaiveDate, Option<Vec<&'static str>>)>,
        pages: Vec<(&'static str, String)>,
        workers: usize,
    ) -> Harness {
        let fetcher = Arc::new(PageFetcher {
            pages: pages.into_iter().collect(),
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(MemorySink::default());
        let coordinator = CrawlCoordinator::new(
            Arc::new(ScriptedDiscovery {
                days: days.into_iter().collect(),
            }),
            fetcher.clone(),
            Arc::new(ReleaseExtractor::new()),
            sink.clone(),
            CoordinatorConfig::default().with_workers(workers),
        );
        Harness {
            coordinator,
            fetcher,
            sink,
        }
    }

    fn task(from: u32, to: u32) -> CrawlTask {
        CrawlTask::new(
            CrawlWindow::new(date(from), date(to)).unwrap(),
            SearchFilters::default(),
            PortalGeneration::Modern,
        )
    }

    #[tokio::test]
    async fn test_flushes_each_day_in_order() {
        let h = harness(
            vec![(date(1), Some(vec!["1", "2"])), (date(2), Some(vec!["3"]))],
            vec![
                ("1", english_page("One")),
                ("2", english_page("Two")),
                ("3", english_page("Three")),
            ],
            4,
        );

        let outcome = h.coordinator.run(&task(1, 2)).await.unwrap();

        assert_eq!(outcome.summary.dates_processed, 2);
        assert_eq!(outcome.summary.discovered, 3);
        assert_eq!(outcome.summary.extracted, 3);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(
            *h.sink.days.lock().unwrap(),
            vec![
                (date(1), vec!["1".to_string(), "2".to_string()]),
                (date(2), vec!["3".to_string()]),
            ]
        );
        assert_eq!(*h.sink.finished.lock().unwrap(), Some(3));

        let day_two = outcome.records.iter().find(|r| r.prid() == "3").unwrap();
        assert_eq!(day_two.metadata.discovered_on, Some(date(2)));
    }

    #[tokio::test]
    async fn test_empty_range_is_not_an_error() {
        let h = harness(vec![], vec![], 10);

        let outcome = h.coordinator.run(&task(1, 3)).await.unwrap();

        assert_eq!(outcome.summary.dates_processed, 3);
        assert_eq!(outcome.summary.extracted, 0);
        assert!(outcome.records.is_empty());
        assert_eq!(h.sink.days.lock().unwrap().len(), 3);
        assert_eq!(*h.sink.finished.lock().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_discovery_failure_advances_to_next_date() {
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let h = harness(
            vec![(date(1), None), (date(2), Some(vec!["7"]))],
            vec![("7", english_page("Seven"))],
            2,
        );
        let coordinator = h.coordinator.with_reporter(report_tx);

        let outcome = coordinator.run(&task(1, 2)).await.unwrap();

        let failed = report_rx.recv().await.unwrap();
        assert_eq!(failed.status, DayStatus::Failed);
        assert_eq!(failed.error, Some(ErrorCategory::Network));
        assert_eq!(report_rx.recv().await.unwrap().error, None);

        assert_eq!(outcome.summary.dates_failed, 1);
        assert_eq!(outcome.summary.dates_processed, 1);
        assert_eq!(outcome.summary.extracted, 1);
        assert_eq!(h.sink.days.lock().unwrap()[0].0, date(2));
    }

    #[tokio::test]
    async fn test_item_failure_is_skipped() {
        let h = harness(
            vec![(date(1), Some(vec!["1", "404"]))],
            vec![("1", english_page("One"))],
            2,
        );

        let outcome = h.coordinator.run(&task(1, 1)).await.unwrap();

        assert_eq!(outcome.summary.failed_items, 1);
        assert_eq!(outcome.summary.extracted, 1);
        assert_eq!(outcome.summary.dates_failed, 0);
    }

    #[tokio::test]
    async fn test_date_with_every_item_failing_is_escalated() {
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let h = harness(vec![(date(1), Some(vec!["404", "405"]))], vec![], 2);
        let coordinator = h.coordinator.with_reporter(report_tx);

        let outcome = coordinator.run(&task(1, 1)).await.unwrap();

        let report = report_rx.recv().await.unwrap();
        assert_eq!(report.status, DayStatus::Failed);
        assert_eq!(report.error, Some(ErrorCategory::Network));

        assert_eq!(outcome.summary.failed_items, 2);
        assert_eq!(outcome.summary.dates_failed, 1);
        assert_eq!(outcome.summary.dates_processed, 0);
        assert!(h.sink.days.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identifier_repeated_across_dates_fetched_once() {
        let h = harness(
            vec![(date(1), Some(vec!["1"])), (date(2), Some(vec!["1"]))],
            vec![("1", english_page("One"))],
            2,
        );

        let outcome = h.coordinator.run(&task(1, 2)).await.unwrap();

        assert_eq!(outcome.summary.extracted, 1);
        assert_eq!(outcome.summary.skipped_duplicates, 1);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_canonical_sibling_claimed_once_across_workers() {
        let h = harness(
            vec![(date(1), Some(vec!["123", "124", "125"]))],
            vec![
                ("123", hindi_page("999")),
                ("124", hindi_page("999")),
                ("125", hindi_page("999")),
                ("999", english_page("Cabinet approves scheme")),
            ],
            3,
        );

        let outcome = h.coordinator.run(&task(1, 1)).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].prid(), "999");
        assert!(outcome.records[0].original_prid().is_some());
        assert_eq!(outcome.summary.skipped_duplicates, 2);
        // 3 originals + 1 canonical
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 4);
        assert_eq!(h.coordinator.ledger().len(), 4);
    }

    #[tokio::test]
    async fn test_limit_caps_items_per_date() {
        let h = harness(
            vec![(date(1), Some(vec!["1", "2", "3"]))],
            vec![
                ("1", english_page("One")),
                ("2", english_page("Two")),
                ("3", english_page("Three")),
            ],
            2,
        );

        let outcome = h
            .coordinator
            .run(&task(1, 1).with_limit(Some(2)))
            .await
            .unwrap();

        assert_eq!(outcome.summary.discovered, 2);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_dates() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let h = harness(vec![(date(1), Some(vec!["1"]))], vec![], 1);
        let coordinator = h.coordinator.with_cancellation(cancel_rx);

        cancel_tx.send(true).unwrap();
        let outcome = coordinator.run(&task(1, 3)).await.unwrap();

        assert!(outcome.summary.cancelled);
        assert_eq!(outcome.summary.dates_processed, 0);
        assert!(h.sink.days.lock().unwrap().is_empty());
        assert_eq!(*h.sink.finished.lock().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_checkpoint_skips_completed_dates() {
        let dir = TempDir::new().unwrap();
        let task = task(1, 2);

        let progress =
            RangeProgress::open(CheckpointManager::new(dir.path()).unwrap(), &task, false)
                .unwrap();
        progress.mark_completed(date(1), 1).unwrap();

        let resumed =
            RangeProgress::open(CheckpointManager::new(dir.path()).unwrap(), &task, true).unwrap();

        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let h = harness(
            vec![(date(1), Some(vec!["1"])), (date(2), Some(vec!["2"]))],
            vec![("1", english_page("One")), ("2", english_page("Two"))],
            2,
        );
        let coordinator = h
            .coordinator
            .with_checkpoint(resumed)
            .with_reporter(report_tx);

        let outcome = coordinator.run(&task).await.unwrap();

        assert_eq!(outcome.summary.dates_skipped, 1);
        assert_eq!(outcome.summary.dates_processed, 1);
        assert_eq!(outcome.records[0].prid(), "2");

        assert_eq!(report_rx.recv().await.unwrap().status, DayStatus::Skipped);
        assert_eq!(report_rx.recv().await.unwrap().status, DayStatus::Completed);

        // Finished ranges drop their checkpoint
        let manager = CheckpointManager::new(dir.path()).unwrap();
        assert!(manager.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_date_keeps_checkpoint_for_resume() {
        let dir = TempDir::new().unwrap();
        let task = task(1, 2);
        let open = |resume| {
            RangeProgress::open(CheckpointManager::new(dir.path()).unwrap(), &task, resume)
                .unwrap()
        };

        let h = harness(
            vec![(date(1), Some(vec!["1"])), (date(2), None)],
            vec![("1", english_page("One"))],
            2,
        );
        let outcome = h.coordinator.with_checkpoint(open(false)).run(&task).await.unwrap();
        assert_eq!(outcome.summary.dates_failed, 1);

        let resumed = open(true);
        assert!(resumed.is_completed(date(1)));
        assert!(!resumed.is_completed(date(2)));

        let h = harness(
            vec![(date(1), Some(vec!["1"])), (date(2), Some(vec!["2"]))],
            vec![("1", english_page("One")), ("2", english_page("Two"))],
            2,
        );
        let outcome = h.coordinator.with_checkpoint(resumed).run(&task).await.unwrap();

        assert_eq!(outcome.summary.dates_skipped, 1);
        assert_eq!(outcome.summary.dates_failed, 0);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(CheckpointManager::new(dir.path()).unwrap().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_restores_records_of_completed_dates() {
        let dir = TempDir::new().unwrap();
        let task = task(1, 2);

        let progress =
            RangeProgress::open(CheckpointManager::new(dir.path()).unwrap(), &task, false)
                .unwrap();
        progress.mark_completed(date(1), 1).unwrap();
        let resumed =
            RangeProgress::open(CheckpointManager::new(dir.path()).unwrap(), &task, true).unwrap();

        let h = harness(
            vec![(date(1), Some(vec!["1"])), (date(2), Some(vec!["1", "2"]))],
            vec![("1", english_page("One")), ("2", english_page("Two"))],
            2,
        );
        h.sink.previous.lock().unwrap().extend([
            previous_record("1", date(1)),
            // Date 2 was never checkpointed, so its stale record is dropped
            previous_record("3", date(2)),
        ]);

        let outcome = h.coordinator.with_checkpoint(resumed).run(&task).await.unwrap();

        let mut prids: Vec<&str> = outcome.records.iter().map(|r| r.prid()).collect();
        prids.sort();
        assert_eq!(prids, vec!["1", "2"]);
        assert_eq!(outcome.summary.extracted, 1);
        assert_eq!(outcome.summary.skipped_duplicates, 1);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.sink.finished.lock().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_fresh_run_ignores_previous_output() {
        let dir = TempDir::new().unwrap();
        let task = task(1, 1);
        let progress =
            RangeProgress::open(CheckpointManager::new(dir.path()).unwrap(), &task, false)
                .unwrap();

        let h = harness(vec![(date(1), Some(vec!["1"]))], vec![("1", english_page("One"))], 1);
        h.sink.previous.lock().unwrap().push(previous_record("8", date(1)));

        let outcome = h.coordinator.with_checkpoint(progress).run(&task).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].prid(), "1");
    }
}
