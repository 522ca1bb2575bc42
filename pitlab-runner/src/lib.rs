//! PitLab Runner — walk-forward validation of value screens over point-in-time data.
//!
//! This crate builds on `pitlab-core` to provide:
//! - Horizon-aware walk-forward folds with a consumable holdout window
//! - Value-screen strategy as the tuned objective
//! - Period performance summaries and selection metrics
//! - Grid and seeded random candidate search
//! - TOML configuration, JSONL result store and logging setup
//! - End-to-end pipeline from a config file
//!
//! [`run_from_config`] installs the `logging` subscriber unless one is already
//! set. Embedders calling [`run_with_snapshot`] directly install their own or
//! call [`logging::init`].

pub mod config;
pub mod logging;
pub mod performance;
pub mod pipeline;
pub mod search;
pub mod selection;
pub mod store;
pub mod strategy;
pub mod walk_forward;

pub use config::{ConfigError, DataPaths, HarnessConfig, RunId};
pub use performance::{DateOutcome, PeriodPerformance, RebalancePoint, SkipReason};
pub use pipeline::{run_from_config, run_with_snapshot};
pub use search::{ParamGrid, SearchMode};
pub use selection::SelectionMetric;
pub use store::{ResultStore, StoreError, StoreKey, StoredPerformance};
pub use strategy::{ValueScreen, ValueScreenParams};
pub use walk_forward::{
    CancelToken, FoldError, FoldObjective, FoldResult, FoldSpec, HarnessError, HarnessReport,
    Holdout, HoldoutResult, SplitPolicy, TestSpan, WalkForwardConfig, WalkForwardHarness,
    WindowMode,
};
