//! End-to-end run: config file → snapshot → walk-forward report → result store.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::info;

use pitlab_core::backtest::BacktestCalculator;
use pitlab_core::calendar::{add_months, month_end_sessions};
use pitlab_core::data::Snapshot;
use pitlab_core::resolver::FinancialRecordResolver;
use pitlab_core::valuation::ValuationEngine;

use crate::config::HarnessConfig;
use crate::store::{ResultStore, StoredPerformance};
use crate::strategy::{ValueScreen, ValueScreenParams};
use crate::walk_forward::{CancelToken, HarnessReport, WalkForwardHarness};

/// Load the config at `path`, build the snapshot it names and run the harness.
///
/// Installs the stderr subscriber from [`crate::logging`] if none is set.
pub fn run_from_config(path: &Path) -> Result<HarnessReport<ValueScreenParams>> {
    crate::logging::init();
    let config = HarnessConfig::from_file(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    let snapshot = Snapshot::load(&config.data.source()).context("loading snapshot")?;
    run_with_snapshot(&config, &snapshot, CancelToken::new())
}

/// Month-end benchmark sessions in the configured range whose evaluation
/// date is covered by benchmark data.
pub fn rebalance_dates(config: &HarnessConfig, snapshot: &Snapshot) -> Result<Vec<NaiveDate>> {
    let levels = snapshot.index_levels(&config.benchmark);
    let (Some(first), Some(last)) = (levels.first(), levels.last()) else {
        bail!("benchmark {} has no index levels", config.benchmark);
    };
    let from = config.start.unwrap_or(first.date);
    let to = config.end.unwrap_or(last.date);
    let horizon = config.walk_forward.horizon_months;

    let dates: Vec<NaiveDate> = month_end_sessions(levels, from, to)
        .into_iter()
        .filter(|d| add_months(*d, horizon).is_some_and(|eval| eval <= last.date))
        .collect();
    if dates.is_empty() {
        bail!(
            "no month-end sessions of {} between {from} and {to} with {horizon} months of data after them",
            config.benchmark
        );
    }
    Ok(dates)
}

/// Run the harness over an already loaded snapshot.
pub fn run_with_snapshot(
    config: &HarnessConfig,
    snapshot: &Snapshot,
    cancel: CancelToken,
) -> Result<HarnessReport<ValueScreenParams>> {
    config.validate()?;
    let dates = rebalance_dates(config, snapshot)?;
    let candidates = config.search.candidates(&config.grid);
    let universe = config
        .universe
        .clone()
        .unwrap_or_else(|| snapshot.securities());

    info!(
        dates = dates.len(),
        first = %dates[0],
        candidates = candidates.len(),
        universe = universe.len(),
        snapshot = %snapshot.hash(),
        "starting walk-forward run"
    );

    let resolver = FinancialRecordResolver::new(snapshot);
    let screen = ValueScreen::new(
        ValuationEngine::new(snapshot, &resolver),
        BacktestCalculator::new(snapshot, config.benchmark.clone()),
        universe,
    );
    let harness = WalkForwardHarness::new(config.walk_forward.clone()).with_cancel_token(cancel);
    let report = harness.run(&dates, &screen, &candidates)?;

    info!(
        folds = report.folds.len(),
        invalid_folds = report.invalid_folds.len(),
        holdout = report.holdout.is_some(),
        cancelled = report.cancelled,
        mean_test_score = ?report.mean_test_score(),
        "walk-forward run finished"
    );

    if let Some(path) = &config.store {
        let run_id = config.run_id(snapshot.hash())?;
        let entries = out_of_sample_records(&run_id, &report);
        let count = entries.len();
        let store = ResultStore::new(path);
        store
            .upsert_many(entries)
            .with_context(|| format!("writing results to {}", path.display()))?;
        info!(run_id = %run_id, records = count, path = %path.display(), "results stored");
    }

    Ok(report)
}

/// Test-window and holdout records of a report, tagged with `run_id`.
pub fn out_of_sample_records(
    run_id: &str,
    report: &HarnessReport<ValueScreenParams>,
) -> Vec<StoredPerformance> {
    report
        .folds
        .iter()
        .flat_map(|f| f.test_performance.records.iter())
        .chain(
            report
                .holdout
                .iter()
                .flat_map(|h| h.performance.records.iter()),
        )
        .map(|r| StoredPerformance::new(run_id, r.clone()))
        .collect()
}
