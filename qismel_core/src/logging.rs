//! JSON line-delimited journals for tensor operations and agent cycles.
//!
//! Each record is appended as one JSON object per line so runs can be
//! replayed or plotted without a custom parser.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::engine::UpdateReport;
use crate::tensor::TensorStatistics;

pub const DEFAULT_LOG_DIR: &str = "logs";

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value).map_err(io::Error::other)?;
    file.write_all(b"\n")
}

pub fn timestamp_now() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Serialize)]
pub struct OperationLogEntry {
    pub operation: String,
    pub timestamp_ms: u128,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
}

pub fn log_operation<P: AsRef<Path>>(
    dir: P,
    operation: &str,
    stats: &TensorStatistics,
) -> io::Result<()> {
    fs::create_dir_all(&dir)?;
    let entry = OperationLogEntry {
        operation: operation.to_string(),
        timestamp_ms: timestamp_now(),
        min: stats.min,
        max: stats.max,
        mean: stats.mean,
        variance: stats.variance,
    };
    append_json_line(dir.as_ref().join("operations.jsonl"), &entry)
}

/// One perceive → select → act → update cycle of the agent loop.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleLogEntry {
    pub cycle: usize,
    pub action: String,
    pub reward: f64,
    pub previous_value: f64,
    pub new_value: f64,
    pub td_error: f64,
    pub fingerprint: String,
    pub table_size: usize,
    pub timestamp_ms: u128,
}

impl CycleLogEntry {
    pub fn from_report(cycle: usize, reward: f64, report: &UpdateReport, table_size: usize) -> Self {
        Self {
            cycle,
            action: report.action.clone(),
            reward,
            previous_value: report.previous,
            new_value: report.new_value,
            td_error: report.td_error,
            fingerprint: report.fingerprint.clone(),
            table_size,
            timestamp_ms: timestamp_now(),
        }
    }
}

/// Cycle journal that buffers every entry in memory and appends every
/// `log_every`-th entry to `<dir>/cycles.jsonl`.
#[derive(Debug, Clone)]
pub struct CycleLogger {
    dir: Option<PathBuf>,
    log_every: usize,
    entries: Vec<CycleLogEntry>,
}

impl CycleLogger {
    /// A logger with no directory only keeps entries in memory.
    pub fn new(dir: Option<PathBuf>, log_every: usize) -> Self {
        Self {
            dir,
            log_every: log_every.max(1),
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[CycleLogEntry] {
        &self.entries
    }

    /// Drops the in-memory entries; lines already on disk are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn record(&mut self, entry: CycleLogEntry) -> io::Result<()> {
        if entry.cycle % self.log_every == 0 {
            if let Some(dir) = &self.dir {
                fs::create_dir_all(dir)?;
                append_json_line(dir.join("cycles.jsonl"), &entry)?;
            }
        }
        self.entries.push(entry);
        Ok(())
    }
}
