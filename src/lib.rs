//! pib-crawler - Press release harvester for the PIB portals
//!
//! Discovers, fetches and extracts press releases from two portal
//! generations: the legacy archive (an ASP.NET client-callback search) and
//! the modern per-day listing pages.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Session harvesting, discovery, fetching, dedup and the coordinator
//! - [`parser`] - HTML parsing and data extraction
//! - [`models`] - Core data structures and types
//! - [`storage`] - Consolidated, partitioned and SQLite exports plus checkpoints
//! - [`utils`] - Error types, retry policy and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pib_crawler::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = Arc::new(PortalClient::new(&config)?);
//!
//!     let coordinator = CrawlCoordinator::new(
//!         discovery_for(PortalGeneration::Legacy, client.clone()),
//!         Arc::new(DetailFetcher::new(client)),
//!         Arc::new(ReleaseExtractor::new()),
//!         Arc::new(JsonExporter::new("output/extracted_data.json")),
//!         CoordinatorConfig::from_config(&config),
//!     );
//!
//!     let window = CrawlWindow::parse("2010-03-01", "2010-03-31").unwrap();
//!     let task = CrawlTask::new(window, SearchFilters::default(), PortalGeneration::Legacy);
//!     println!("{}", coordinator.run(&task).await?.summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod parser;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::discovery::{discovery_for, Discovery};
    pub use crate::crawler::fetcher::{DetailFetcher, DocumentFetcher};
    pub use crate::crawler::pipeline::{CoordinatorConfig, CrawlCoordinator, CrawlOutcome};
    pub use crate::crawler::PortalClient;
    pub use crate::error::{CrawlErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{
        CrawlSummary, CrawlTask, CrawlWindow, DocumentId, ExtractedRecord, PortalGeneration,
        SearchFilters, SearchMode,
    };
    pub use crate::parser::{Extractor, ReleaseExtractor};
    pub use crate::storage::{JsonExporter, PartitionedJsonlSink, PersistenceSink, SqliteSink};
}

// Direct re-exports for convenience
pub use models::{CrawlSummary, CrawlTask, DocumentId, ExtractedRecord, PortalGeneration};
