//! JSON-lines scalar summaries, one record per optimizer step.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

pub const SUMMARY_FILE: &str = "summaries.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub step: u64,
    pub tag: String,
    pub value: f32,
    /// Seconds since the Unix epoch.
    pub wall_time: f64,
}

/// Appends records to `<log_dir>/summaries.jsonl`; flushed on `close` or drop.
pub struct SummaryWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl SummaryWriter {
    pub fn create(log_dir: &Path) -> HarnessResult<Self> {
        fs::create_dir_all(log_dir).map_err(|e| HarnessError::io(log_dir, e))?;
        let path = log_dir.join(SUMMARY_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| HarnessError::io(&path, e))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, value: f32, step: u64) -> HarnessResult<()> {
        let record = SummaryRecord {
            step,
            tag: tag.to_string(),
            value,
            wall_time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        };
        let line = serde_json::to_string(&record).map_err(|source| HarnessError::Json {
            path: self.path.clone(),
            source,
        })?;
        writeln!(self.out, "{line}").map_err(|e| HarnessError::io(&self.path, e))
    }

    pub fn close(mut self) -> HarnessResult<()> {
        self.out
            .flush()
            .map_err(|e| HarnessError::io(&self.path, e))
    }
}

/// Read every record back, in write order.
pub fn read_summaries(log_dir: &Path) -> HarnessResult<Vec<SummaryRecord>> {
    let path = log_dir.join(SUMMARY_FILE);
    let raw = fs::read_to_string(&path).map_err(|e| HarnessError::io(&path, e))?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|source| HarnessError::Json {
                path: path.clone(),
                source,
            })
        })
        .collect()
}
