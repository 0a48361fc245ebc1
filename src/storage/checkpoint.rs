//! Checkpoint system for resumable range crawls
//!
//! A range crawl records every date whose batch reached the sink. A resumed
//! crawl with the same task key skips those dates.
//!
//! # Example
//!
//! ```no_run
//! use pib_crawler::storage::checkpoint::{CheckpointManager, RangeCheckpoint};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let manager = CheckpointManager::new(Path::new("./checkpoints"))?;
//!
//! let state = RangeCheckpoint::new("modern_2024-01-01_2024-01-31");
//! manager.save(&state.task_key, &state)?;
//!
//! if let Some(restored) = manager.load::<RangeCheckpoint>(&state.task_key)? {
//!     println!("{} dates already done", restored.completed.len());
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::CrawlTask;

// ============================================================================
// Checkpoint State
// ============================================================================

/// Progress of one range crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeCheckpoint {
    /// Stable key derived from the task parameters
    pub task_key: String,

    /// Dates whose batch was flushed
    pub completed: BTreeSet<NaiveDate>,

    /// Records written across completed dates
    pub records_written: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RangeCheckpoint {
    pub fn new(task_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_key: task_key.into(),
            completed: BTreeSet::new(),
            records_written: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, date: NaiveDate) -> bool {
        self.completed.contains(&date)
    }

    pub fn mark_completed(&mut self, date: NaiveDate, records: usize) {
        if self.completed.insert(date) {
            self.records_written += records as u64;
        }
        self.updated_at = Utc::now();
    }
}

/// Checkpoint key for a task
///
/// Covers the portal, window and filters but not the task id, so a rerun of
/// the same command finds the previous progress.
pub fn task_key(task: &CrawlTask) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.filters.query.as_bytes());
    let query_hash = format!("{:x}", hasher.finalize());

    format!(
        "{}_{}_{}_m{}_t{}_{}",
        task.portal,
        task.window.start,
        task.window.end,
        task.filters.ministry,
        task.filters.mode.code(),
        &query_hash[..8]
    )
}

// ============================================================================
// Checkpoint Manager
// ============================================================================

/// Manages checkpoint files in one directory
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new checkpoint manager
    pub fn new(checkpoint_dir: &Path) -> Result<Self> {
        fs::create_dir_all(checkpoint_dir).context("Failed to create checkpoint directory")?;

        Ok(Self {
            checkpoint_dir: checkpoint_dir.to_path_buf(),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{name}.checkpoint.json"))
    }

    /// Save checkpoint state
    pub fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<PathBuf> {
        let filepath = self.path_for(name);
        let temp_path = filepath.with_extension("json.tmp");

        let file = File::create(&temp_path).with_context(|| {
            format!("Failed to create checkpoint file: {}", temp_path.display())
        })?;

        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, state).context("Failed to serialize checkpoint")?;

        fs::rename(&temp_path, &filepath)
            .with_context(|| format!("Failed to rename checkpoint file: {}", filepath.display()))?;

        tracing::debug!(path = %filepath.display(), "Checkpoint saved");
        Ok(filepath)
    }

    /// Load checkpoint state
    pub fn load<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Option<T>> {
        let filepath = self.path_for(name);

        if !filepath.exists() {
            return Ok(None);
        }

        let file = File::open(&filepath)
            .with_context(|| format!("Failed to open checkpoint file: {}", filepath.display()))?;

        let reader = BufReader::new(file);
        let state = serde_json::from_reader(reader).context("Failed to deserialize checkpoint")?;

        tracing::debug!(path = %filepath.display(), "Checkpoint loaded");
        Ok(Some(state))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Delete checkpoint
    pub fn delete(&self, name: &str) -> Result<()> {
        let filepath = self.path_for(name);

        if filepath.exists() {
            fs::remove_file(&filepath)
                .with_context(|| format!("Failed to delete checkpoint: {}", filepath.display()))?;
            tracing::debug!(path = %filepath.display(), "Checkpoint deleted");
        }

        Ok(())
    }

    /// List all checkpoints
    pub fn list(&self) -> Result<Vec<String>> {
        let mut checkpoints = Vec::new();

        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let entry = entry?;
            let path = entry.path();

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(session) = name.strip_suffix(".checkpoint.json") {
                    checkpoints.push(session.to_string());
                }
            }
        }

        checkpoints.sort();
        Ok(checkpoints)
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }
}

// ============================================================================
// Range Progress
// ============================================================================

/// Live progress of the running crawl, persisted after every date
pub struct RangeProgress {
    manager: CheckpointManager,
    state: Mutex<RangeCheckpoint>,
}

impl RangeProgress {
    /// Open the checkpoint for `task`
    ///
    /// With `resume` the previous progress is loaded; otherwise any stale
    /// checkpoint under the same key is discarded.
    pub fn open(manager: CheckpointManager, task: &CrawlTask, resume: bool) -> Result<Self> {
        let key = task_key(task);

        let state = if resume {
            manager.load::<RangeCheckpoint>(&key)?
        } else {
            manager.delete(&key)?;
            None
        };

        let state = match state {
            Some(previous) => {
                tracing::info!(
                    task_key = %key,
                    completed = previous.completed.len(),
                    "Resuming range crawl"
                );
                previous
            }
            None => RangeCheckpoint::new(key),
        };

        Ok(Self {
            manager,
            state: Mutex::new(state),
        })
    }

    pub fn is_completed(&self, date: NaiveDate) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_completed(date)
    }

    /// Record a flushed date and persist
    pub fn mark_completed(&self, date: NaiveDate, records: usize) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.mark_completed(date, records);
            state.clone()
        };
        self.manager.save(&snapshot.task_key, &snapshot)?;
        Ok(())
    }

    pub fn snapshot(&self) -> RangeCheckpoint {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remove the checkpoint once the whole range is done
    pub fn finalize(&self) -> Result<()> {
        let key = self.snapshot().task_key;
        self.manager.delete(&key)
    }
}
