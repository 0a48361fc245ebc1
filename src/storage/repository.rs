//! SQLite store for extracted releases
//!
//! One row per `(portal, prid)`. Rows are keyed by publication year through
//! an index, which is what the per-year tabular exports query.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{ExtractedRecord, PortalGeneration};
use crate::storage::PersistenceSink;

/// Per-year row counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearCount {
    pub year: i32,
    pub records: u64,
}

/// SQLite implementation of [`PersistenceSink`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open or create a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let sink = Self {
            conn: Mutex::new(conn),
        };
        sink.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(sink)
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let sink = Self {
            conn: Mutex::new(conn),
        };
        sink.create_schema()?;
        Ok(sink)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS releases (
                    portal TEXT NOT NULL,
                    prid TEXT NOT NULL,
                    original_prid TEXT,
                    title TEXT NOT NULL,
                    ministry TEXT,
                    body TEXT NOT NULL,
                    date_time_raw TEXT,
                    published_at TEXT,
                    publication_year INTEGER NOT NULL,
                    discovered_on TEXT NOT NULL,
                    images TEXT NOT NULL,
                    languages TEXT NOT NULL,
                    content_hash TEXT,
                    crawled_at TEXT NOT NULL,
                    PRIMARY KEY (portal, prid)
                );

                CREATE INDEX IF NOT EXISTS idx_releases_year
                    ON releases(publication_year);

                CREATE INDEX IF NOT EXISTS idx_releases_discovered
                    ON releases(discovered_on);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }

    /// Row counts per publication year, ascending
    pub fn count_by_year(&self) -> Result<Vec<YearCount>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT publication_year, COUNT(*) FROM releases
             GROUP BY publication_year ORDER BY publication_year",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok(YearCount {
                    year: row.get(0)?,
                    records: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to count releases")?;

        Ok(counts)
    }

    /// Total number of stored releases
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM releases", [], |row| row.get(0))?;
        Ok(total as u64)
    }

    /// Title of a stored release
    pub fn title_of(&self, portal: PortalGeneration, prid: &str) -> Result<Option<String>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT title FROM releases WHERE portal = ?1 AND prid = ?2",
            params![portal.as_str(), prid],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query release")
    }
}

impl PersistenceSink for SqliteSink {
    fn write_day(&self, date: NaiveDate, records: &[ExtractedRecord]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                    INSERT OR REPLACE INTO releases (
                        portal, prid, original_prid, title, ministry, body, date_time_raw,
                        published_at, publication_year, discovered_on, images, languages,
                        content_hash, crawled_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
            )?;

            for record in records {
                let meta = &record.metadata;
                stmt.execute(params![
                    meta.portal.as_str(),
                    meta.prid,
                    meta.original_prid,
                    record.title,
                    record.ministry,
                    record.text,
                    record.date_time_raw,
                    record.published_at.map(|ts| ts.to_string()),
                    record.publication_year(date),
                    meta.discovered_on.unwrap_or(date).to_string(),
                    serde_json::to_string(&record.images)?,
                    serde_json::to_string(&record.languages)?,
                    meta.content_hash,
                    meta.crawled_at.to_rfc3339(),
                ])
                .with_context(|| format!("Failed to store release {}", meta.prid))?;
            }
        }

        tx.commit().context("Failed to commit day batch")?;

        tracing::debug!(date = %date, records = records.len(), "Day batch stored");
        Ok(())
    }
}
