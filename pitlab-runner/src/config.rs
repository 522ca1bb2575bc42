//! Harness configuration loaded from TOML.
//!
//! ```toml
//! benchmark = "TOPIX"
//! start = "2015-01-01"
//!
//! [data]
//! prices = "prices.csv"
//! statements = "statements.csv"
//! index = "index.csv"
//!
//! [walk_forward]
//! horizon_months = 12
//! holdout_months = 12
//! split = { type = "train_ratio", ratio = 0.5, n_folds = 3 }
//! window = { type = "rolling", max_train_dates = 24 }
//!
//! [grid]
//! max_per = [10.0, 15.0]
//! top_n = [10]
//!
//! [search]
//! type = "random"
//! samples = 8
//! seed = 42
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use pitlab_core::data::FileSnapshotSource;
use pitlab_core::domain::{IndexCode, SecurityCode, SnapshotHash};

use crate::search::{ParamGrid, SearchMode};
use crate::walk_forward::{SplitPolicy, WalkForwardConfig, WindowMode};

/// Unique identifier for a harness run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("config serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Locations of the ingested tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPaths {
    pub prices: PathBuf,
    pub statements: PathBuf,
    #[serde(default)]
    pub index: Option<PathBuf>,
}

impl DataPaths {
    pub fn source(&self) -> FileSnapshotSource {
        let source = FileSnapshotSource::new(&self.prices, &self.statements);
        match &self.index {
            Some(index) => source.with_index(index),
            None => source,
        }
    }
}

/// Everything needed to reproduce a walk-forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub data: DataPaths,
    pub benchmark: IndexCode,
    /// Securities to screen; every security in the snapshot when absent.
    #[serde(default)]
    pub universe: Option<Vec<SecurityCode>>,
    /// First rebalance date considered (inclusive).
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Last rebalance date considered (inclusive).
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub walk_forward: WalkForwardConfig,
    #[serde(default)]
    pub grid: ParamGrid,
    #[serde(default)]
    pub search: SearchMode,
    /// JSONL result store; nothing is persisted when absent.
    #[serde(default)]
    pub store: Option<PathBuf>,
}

impl HarnessConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })
    }

    /// Load, resolve relative paths and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Make every relative path relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.data.prices);
        join(&mut self.data.statements);
        if let Some(index) = self.data.index.as_mut() {
            join(index);
        }
        if let Some(store) = self.store.as_mut() {
            join(store);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.benchmark.0.trim().is_empty() {
            return invalid("benchmark code is empty".into());
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return invalid(format!("start {start} is after end {end}"));
            }
        }
        if self.universe.as_ref().is_some_and(|u| u.is_empty()) {
            return invalid("universe is empty".into());
        }

        let wf = &self.walk_forward;
        if wf.horizon_months == 0 {
            return invalid("horizon_months must be at least 1".into());
        }
        if wf.holdout_months == Some(0) {
            return invalid("holdout_months must be at least 1 when set".into());
        }
        if wf.min_test_dates == 0 {
            return invalid("min_test_dates must be at least 1".into());
        }
        match &wf.split {
            SplitPolicy::TrainRatio { ratio, n_folds } => {
                if !(0.0..1.0).contains(ratio) {
                    return invalid(format!("train ratio {ratio} must be in [0, 1)"));
                }
                if *n_folds == 0 {
                    return invalid("n_folds must be at least 1".into());
                }
            }
            SplitPolicy::Explicit { spans } => {
                if spans.is_empty() {
                    return invalid("explicit split has no test spans".into());
                }
                if let Some(s) = spans.iter().find(|s| s.start > s.end) {
                    return invalid(format!("test span {}..{} is reversed", s.start, s.end));
                }
            }
        }
        if let WindowMode::Rolling { max_train_dates: 0 } = wf.window {
            return invalid("rolling window needs max_train_dates >= 1".into());
        }

        if self.grid.top_n.is_empty() || self.grid.top_n.contains(&0) {
            return invalid("grid.top_n must list positive sizes".into());
        }
        let mut caps = self.grid.max_per.iter().chain(&self.grid.max_pbr);
        if let Some(cap) = caps.find(|c| !c.is_finite() || **c <= 0.0) {
            return invalid(format!("ratio cap {cap} must be finite and positive"));
        }
        if let SearchMode::Random { samples: 0, .. } = self.search {
            return invalid("random search needs samples >= 1".into());
        }
        Ok(())
    }

    /// Deterministic id over this config and the snapshot it runs on.
    ///
    /// Two runs with identical configs on identical data share a `RunId`, so
    /// their stored records replace each other instead of piling up.
    pub fn run_id(&self, snapshot: &SnapshotHash) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(json.as_bytes());
        hasher.update(b"\0");
        hasher.update(snapshot.0.as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }
}
