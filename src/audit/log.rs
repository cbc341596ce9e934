//! Append-only run log writer and readers.
//!
//! Each run gets one `.jsonl` file under `<audit_dir>/runs/`. Every append is
//! flushed and fsynced before the call returns, so a record acknowledged to
//! the controller survives a crash immediately afterwards. The log never
//! rewrites prior entries; corrections are new entries.

use super::{AttemptRecord, AuditEntry};
use crate::orchestrator::RunSnapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Create the log file for a new run under `<audit_dir>/runs/`.
    pub fn create(audit_dir: &Path, run_id: Uuid, started_at: DateTime<Utc>) -> Result<Self> {
        let runs_dir = audit_dir.join("runs");
        fs::create_dir_all(&runs_dir).context("Failed to create audit runs directory")?;

        let filename = format!(
            "{}_{}.jsonl",
            started_at.format("%Y-%m-%dT%H-%M-%S"),
            &run_id.to_string()[..8]
        );
        let path = runs_dir.join(filename);

        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to create audit log at {}", path.display()))?;

        Ok(Self { path, file })
    }

    /// Path of the run log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a step attempt record. Durable before returning.
    pub fn append_attempt(&mut self, record: &AttemptRecord) -> Result<()> {
        self.append(&AuditEntry::Attempt(record.clone()))
    }

    /// Append a run-state snapshot. Durable before returning.
    pub fn append_snapshot(&mut self, snapshot: &RunSnapshot) -> Result<()> {
        self.append(&AuditEntry::Snapshot(snapshot.clone()))
    }

    fn append(&mut self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("Failed to serialize audit entry")?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .context("Failed to write audit entry")?;
        self.file.flush().context("Failed to flush audit log")?;
        self.file
            .sync_data()
            .context("Failed to sync audit log to disk")?;
        Ok(())
    }

    /// List run log files under an audit directory, most recent first.
    pub fn list_runs(audit_dir: &Path) -> Result<Vec<PathBuf>> {
        let runs_dir = audit_dir.join("runs");
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }

    /// Load every entry from a run log file, in written order.
    pub fn load(path: &Path) -> Result<Vec<AuditEntry>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to read audit log at {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line.context("Failed to read audit log line")?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line)
                .with_context(|| format!("Malformed audit entry on line {}", n + 1))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// The latest snapshot in a run log, if any.
    pub fn last_snapshot(path: &Path) -> Result<Option<RunSnapshot>> {
        let entries = Self::load(path)?;
        Ok(entries
            .into_iter()
            .rev()
            .find_map(|e| match e {
                AuditEntry::Snapshot(s) => Some(s),
                AuditEntry::Attempt(_) => None,
            }))
    }
}
