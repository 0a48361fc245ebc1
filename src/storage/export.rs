//! File exports: consolidated JSON and per-year JSON Lines

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::ExtractedRecord;
use crate::storage::{partition_by_year, PersistenceSink};

/// Write through a temp file and rename into place
fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let temp_path = path.with_extension("tmp");
    let file = File::create(&temp_path)
        .with_context(|| format!("Failed to create file: {}", temp_path.display()))?;

    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer.flush().context("Failed to flush export")?;
    drop(writer);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename export: {}", path.display()))?;
    Ok(())
}

/// Consolidated export: one pretty-printed JSON array of every record
pub struct JsonExporter {
    path: PathBuf,
}

impl JsonExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a previously written export
    pub fn load(path: &Path) -> Result<Vec<ExtractedRecord>> {
        let file =
            File::open(path).with_context(|| format!("Failed to open export: {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse export: {}", path.display()))
    }
}

impl PersistenceSink for JsonExporter {
    fn write_day(&self, _date: NaiveDate, _records: &[ExtractedRecord]) -> Result<()> {
        Ok(())
    }

    fn finish(&self, records: &[ExtractedRecord]) -> Result<()> {
        write_atomic(&self.path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, records)
                .context("Failed to serialize records")?;
            Ok(())
        })?;

        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            "Consolidated export written"
        );
        Ok(())
    }

    fn restore(&self) -> Result<Vec<ExtractedRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let records = Self::load(&self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "Loaded previous export"
        );
        Ok(records)
    }
}

/// Per-day JSON Lines files partitioned by publication year
///
/// Layout: `{root}/by_year/{year}/{date}.jsonl`. A day whose records span
/// several years writes one file per year.
pub struct PartitionedJsonlSink {
    root: PathBuf,
}

impl PartitionedJsonlSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn day_path(&self, year: i32, date: NaiveDate) -> PathBuf {
        self.root
            .join("by_year")
            .join(year.to_string())
            .join(format!("{date}.jsonl"))
    }
}

impl PersistenceSink for PartitionedJsonlSink {
    fn write_day(&self, date: NaiveDate, records: &[ExtractedRecord]) -> Result<()> {
        for (year, batch) in partition_by_year(records, date) {
            let path = self.day_path(year, date);
            write_atomic(&path, |writer| {
                for record in &batch {
                    serde_json::to_writer(&mut *writer, record)
                        .context("Failed to serialize record")?;
                    writer.write_all(b"\n")?;
                }
                Ok(())
            })?;

            tracing::debug!(
                path = %path.display(),
                year,
                records = batch.len(),
                "Partition written"
            );
        }
        Ok(())
    }
}
