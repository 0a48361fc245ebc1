//! Persistence of extracted releases
//!
//! The coordinator talks to a [`PersistenceSink`]: one `write_day` call per
//! crawled date and one `finish` call with every record of the run. A
//! resumed run first asks the sink to `restore` what it wrote before.
//!
//! - [`export::JsonExporter`] - consolidated JSON array on finish
//! - [`export::PartitionedJsonlSink`] - per-day JSON Lines grouped by year
//! - [`repository::SqliteSink`] - tabular store with a year index
//! - [`FanoutSink`] - forwards to several sinks in order

pub mod checkpoint;
pub mod export;
pub mod repository;

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub use export::{JsonExporter, PartitionedJsonlSink};
pub use repository::SqliteSink;

use crate::models::ExtractedRecord;

/// Durable destination for crawl output
pub trait PersistenceSink: Send + Sync {
    /// Persist the batch for one crawl date
    ///
    /// Called once per processed date, including dates with no records.
    fn write_day(&self, date: NaiveDate, records: &[ExtractedRecord]) -> Result<()>;

    /// Persist the consolidated output of the whole run
    fn finish(&self, records: &[ExtractedRecord]) -> Result<()> {
        let _ = records;
        Ok(())
    }

    /// Records a previous run already handed to `finish`
    ///
    /// Used when a range is resumed, so dates skipped from the checkpoint
    /// still reach the consolidated output.
    fn restore(&self) -> Result<Vec<ExtractedRecord>> {
        Ok(Vec::new())
    }
}

/// Group records by publication year
///
/// Records without a parsed timestamp use the year of `fallback`.
pub fn partition_by_year(
    records: &[ExtractedRecord],
    fallback: NaiveDate,
) -> BTreeMap<i32, Vec<&ExtractedRecord>> {
    let mut partitions: BTreeMap<i32, Vec<&ExtractedRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.publication_year(fallback))
            .or_default()
            .push(record);
    }
    partitions
}

/// Forwards every call to each inner sink
///
/// Stops at the first failing sink.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn PersistenceSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl PersistenceSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl PersistenceSink for FanoutSink {
    fn write_day(&self, date: NaiveDate, records: &[ExtractedRecord]) -> Result<()> {
        for sink in &self.sinks {
            sink.write_day(date, records)?;
        }
        Ok(())
    }

    fn finish(&self, records: &[ExtractedRecord]) -> Result<()> {
        for sink in &self.sinks {
            sink.finish(records)?;
        }
        Ok(())
    }

    /// First inner sink with anything to restore wins
    fn restore(&self) -> Result<Vec<ExtractedRecord>> {
        for sink in &self.sinks {
            let records = sink.restore()?;
            if !records.is_empty() {
                return Ok(records);
            }
        }
        Ok(Vec::new())
    }
}
