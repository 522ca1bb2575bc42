//! JSONL result store for backtest records, keyed for replacement.
//!
//! One JSON object per line. A record is keyed by `(run_id, rebalance_date,
//! as_of)`; writing a key that already exists replaces the old line, so
//! re-running a configuration never duplicates its results.
//!
//! Writes rewrite the whole file into a sibling temporary file and rename it
//! over the original, so readers never see a half-written store. Lines that do
//! not parse are skipped on read and written back unchanged after the records.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use pitlab_core::backtest::BacktestPerformanceRecord;

use crate::config::RunId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot encode stored record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub run_id: RunId,
    pub rebalance_date: NaiveDate,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPerformance {
    pub key: StoreKey,
    pub record: BacktestPerformanceRecord,
}

impl StoredPerformance {
    pub fn new(run_id: impl Into<RunId>, record: BacktestPerformanceRecord) -> Self {
        Self {
            key: StoreKey {
                run_id: run_id.into(),
                rebalance_date: record.rebalance_date,
                as_of: record.as_of,
            },
            record,
        }
    }
}

#[derive(Debug, Default)]
struct StoreContents {
    entries: Vec<StoredPerformance>,
    malformed: Vec<String>,
}

/// JSONL result file with replace-by-key writes.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn upsert(&self, entry: StoredPerformance) -> Result<usize, StoreError> {
        self.upsert_many(vec![entry])
    }

    /// Insert or replace every entry, returning how many keys were replaced.
    pub fn upsert_many(&self, entries: Vec<StoredPerformance>) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let existing = self.read_lines()?;
        let mut by_key: BTreeMap<StoreKey, StoredPerformance> = existing
            .entries
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        let written = entries.len();
        let mut replaced = 0;
        for entry in entries {
            if by_key.insert(entry.key.clone(), entry).is_some() {
                replaced += 1;
            }
        }
        if !existing.malformed.is_empty() {
            warn!(
                path = %self.path.display(),
                kept = existing.malformed.len(),
                "malformed result lines carried over unchanged"
            );
        }
        self.write_atomic(by_key.values(), &existing.malformed)?;
        debug!(
            path = %self.path.display(),
            written,
            replaced,
            total = by_key.len(),
            "result store updated"
        );
        Ok(replaced)
    }

    /// Read all entries. Malformed lines are skipped.
    pub fn load_all(&self) -> Result<Vec<StoredPerformance>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_lines()?.entries)
    }

    /// Entries of one run, ordered by rebalance date.
    pub fn load_run(&self, run_id: &str) -> Result<Vec<StoredPerformance>, StoreError> {
        let mut entries: Vec<StoredPerformance> = self
            .load_all()?
            .into_iter()
            .filter(|e| e.key.run_id == run_id)
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_lines(&self) -> Result<StoreContents, StoreError> {
        let mut contents = StoreContents::default();
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(contents),
            Err(e) => return Err(self.io_err(e)),
        };
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredPerformance>(&line) {
                Ok(entry) => contents.entries.push(entry),
                Err(_) => contents.malformed.push(line),
            }
        }
        if !contents.malformed.is_empty() {
            warn!(
                path = %self.path.display(),
                skipped = contents.malformed.len(),
                "malformed result lines skipped"
            );
        }
        Ok(contents)
    }

    fn write_atomic<'a>(
        &self,
        entries: impl Iterator<Item = &'a StoredPerformance>,
        raw_lines: &[String],
    ) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut out = io::BufWriter::new(fs::File::create(&tmp).map_err(|e| self.io_err(e))?);
        for entry in entries {
            let json = serde_json::to_string(entry)?;
            writeln!(out, "{json}").map_err(|e| self.io_err(e))?;
        }
        for line in raw_lines {
            writeln!(out, "{line}").map_err(|e| self.io_err(e))?;
        }
        let file = out.into_inner().map_err(|e| self.io_err(e.into_error()))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}
