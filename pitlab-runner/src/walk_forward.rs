//! Walk-forward validation with horizon-aware train/test folds.
//!
//! A rebalance date `d` is only scored at its evaluation date
//! `eval(d) = d + horizon months`, so folds are cut on evaluation dates:
//!
//! - TEST: rotation dates whose evaluation date falls in the fold's test span
//! - TRAIN: rotation dates whose evaluation date is strictly before the
//!   earliest TEST rebalance date
//!
//! A training outcome that is only known after the test window has started is
//! therefore never used to pick the fold's parameters.
//!
//! Test spans never overlap: when month-end clamping maps rebalance dates on
//! both sides of a block boundary to one evaluation date, they all go to the
//! earlier fold.
//!
//! The most recent `holdout_months` of dates can be withheld from rotation in
//! a [`Holdout`], which is consumed when evaluated.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use pitlab_core::calendar::{add_months, sub_months};

use crate::performance::{PeriodPerformance, RebalancePoint};
use crate::selection::SelectionMetric;

// ─── Configuration ───────────────────────────────────────────────────

/// Inclusive span of evaluation dates designated as one fold's test window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TestSpan {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// How test windows are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitPolicy {
    /// The first `ratio` share of rotation dates is the initial training
    /// region; the rest is cut into `n_folds` contiguous test blocks.
    TrainRatio { ratio: f64, n_folds: usize },
    /// Caller-given test spans on evaluation dates.
    Explicit { spans: Vec<TestSpan> },
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::TrainRatio {
            ratio: 0.5,
            n_folds: 3,
        }
    }
}

/// How the training window moves from fold to fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowMode {
    /// Expanding: every eligible date since the start.
    #[default]
    Anchored,
    /// Only the most recent `max_train_dates` eligible dates.
    Rolling { max_train_dates: usize },
}

/// Configuration for walk-forward validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub horizon_months: u32,
    pub split: SplitPolicy,
    pub window: WindowMode,
    /// Months at the end of the date range withheld from rotation.
    pub holdout_months: Option<u32>,
    pub min_train_dates: usize,
    pub min_test_dates: usize,
    pub metric: SelectionMetric,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            horizon_months: 12,
            split: SplitPolicy::default(),
            window: WindowMode::default(),
            holdout_months: None,
            min_train_dates: 3,
            min_test_dates: 1,
            metric: SelectionMetric::default(),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Train,
    Test,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => f.write_str("train"),
            Self::Test => f.write_str("test"),
        }
    }
}

/// Why a single fold was rejected. Other folds still run.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum FoldError {
    #[error("fold {fold}: {date} is in both train and test")]
    Overlap { fold: usize, date: NaiveDate },
    #[error("fold {fold}: no training dates")]
    EmptyTrain { fold: usize },
    #[error("fold {fold}: no test dates")]
    EmptyTest { fold: usize },
    #[error("fold {fold}: {found} {bucket} dates < minimum {min}")]
    TooFewDates {
        fold: usize,
        bucket: Bucket,
        found: usize,
        min: usize,
    },
    #[error("fold {fold}: no candidate produced a training score")]
    Unscorable { fold: usize },
}

/// Errors that stop the whole harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no rebalance dates")]
    NoDates,
    #[error("no candidate parameter sets")]
    NoCandidates,
    #[error("invalid split policy: {0}")]
    InvalidSplit(String),
    #[error("date arithmetic out of range at {0}")]
    DateOutOfRange(NaiveDate),
}

// ─── Objective ───────────────────────────────────────────────────────

/// Black-box scoring of one parameter set over a set of rebalance points.
pub trait FoldObjective: Sync {
    type Params: Clone + fmt::Debug + Serialize + Send + Sync;

    fn score(&self, params: &Self::Params, points: &[RebalancePoint]) -> PeriodPerformance;
}

/// Cooperative cancellation, checked between folds.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Fold planning ───────────────────────────────────────────────────

/// Train and test points of one fold, validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    pub test_span: TestSpan,
    pub train: Vec<RebalancePoint>,
    pub test: Vec<RebalancePoint>,
}

impl FoldSpec {
    /// Earliest test rebalance date.
    pub fn test_start(&self) -> Option<NaiveDate> {
        self.test.first().map(|p| p.rebalance_date)
    }
}

/// Pair each date with its evaluation date. Input must be sorted.
pub fn rebalance_points(
    dates: &[NaiveDate],
    horizon_months: u32,
) -> Result<Vec<RebalancePoint>, HarnessError> {
    dates
        .iter()
        .map(|&d| {
            add_months(d, horizon_months)
                .map(|evaluation_date| RebalancePoint {
                    rebalance_date: d,
                    evaluation_date,
                })
                .ok_or(HarnessError::DateOutOfRange(d))
        })
        .collect()
}

/// Test spans for `policy` over sorted rotation points.
pub fn test_spans(
    points: &[RebalancePoint],
    policy: &SplitPolicy,
) -> Result<Vec<TestSpan>, HarnessError> {
    match policy {
        SplitPolicy::Explicit { spans } => {
            if let Some(bad) = spans.iter().find(|s| s.start > s.end) {
                return Err(HarnessError::InvalidSplit(format!(
                    "span starts {} after it ends {}",
                    bad.start, bad.end
                )));
            }
            Ok(spans.clone())
        }
        SplitPolicy::TrainRatio { ratio, n_folds } => {
            if !(0.0..1.0).contains(ratio) || *n_folds == 0 {
                return Err(HarnessError::InvalidSplit(format!(
                    "ratio {ratio} must be in [0, 1) and n_folds {n_folds} >= 1"
                )));
            }
            let initial = (points.len() as f64 * ratio).floor() as usize;
            let remaining = points.len().saturating_sub(initial);
            if remaining < *n_folds {
                return Err(HarnessError::InvalidSplit(format!(
                    "{remaining} dates after the training region cannot fill {n_folds} folds"
                )));
            }
            let block = remaining / n_folds;
            let mut spans: Vec<TestSpan> = Vec::with_capacity(*n_folds);
            for i in 0..*n_folds {
                let mut first = initial + i * block;
                // the last block takes the remainder
                let last = if i + 1 == *n_folds {
                    points.len() - 1
                } else {
                    first + block - 1
                };
                // dates clamped onto the previous span's end stay in that span
                if let Some(prev_end) = spans.last().map(|s| s.end) {
                    while first <= last && points[first].evaluation_date <= prev_end {
                        first += 1;
                    }
                }
                if first > last {
                    debug!(block = i, "test block absorbed by the previous span");
                    continue;
                }
                spans.push(TestSpan {
                    start: points[first].evaluation_date,
                    end: points[last].evaluation_date,
                });
            }
            Ok(spans)
        }
    }
}

/// Build and validate one fold.
pub fn plan_fold(
    fold_index: usize,
    points: &[RebalancePoint],
    span: TestSpan,
    config: &WalkForwardConfig,
) -> Result<FoldSpec, FoldError> {
    let test: Vec<RebalancePoint> = points
        .iter()
        .filter(|p| span.contains(p.evaluation_date))
        .copied()
        .collect();
    let Some(test_start) = test.first().map(|p| p.rebalance_date) else {
        return Err(FoldError::EmptyTest { fold: fold_index });
    };

    let mut train: Vec<RebalancePoint> = points
        .iter()
        .filter(|p| p.evaluation_date < test_start)
        .copied()
        .collect();
    if let WindowMode::Rolling { max_train_dates } = config.window {
        let excess = train.len().saturating_sub(max_train_dates);
        train.drain(..excess);
    }

    let spec = FoldSpec {
        fold_index,
        test_span: span,
        train,
        test,
    };
    validate_fold(&spec, config)?;
    Ok(spec)
}

fn validate_fold(spec: &FoldSpec, config: &WalkForwardConfig) -> Result<(), FoldError> {
    let fold = spec.fold_index;
    let test_dates: BTreeSet<NaiveDate> = spec.test.iter().map(|p| p.rebalance_date).collect();
    if let Some(p) = spec.train.iter().find(|p| test_dates.contains(&p.rebalance_date)) {
        return Err(FoldError::Overlap {
            fold,
            date: p.rebalance_date,
        });
    }
    if spec.train.is_empty() {
        return Err(FoldError::EmptyTrain { fold });
    }
    if spec.test.is_empty() {
        return Err(FoldError::EmptyTest { fold });
    }
    for (bucket, found, min) in [
        (Bucket::Train, spec.train.len(), config.min_train_dates),
        (Bucket::Test, spec.test.len(), config.min_test_dates),
    ] {
        if found < min {
            return Err(FoldError::TooFewDates {
                fold,
                bucket,
                found,
                min,
            });
        }
    }
    Ok(())
}

// ─── Holdout ─────────────────────────────────────────────────────────

/// Final window withheld from rotation.
///
/// `evaluate` takes `self`, so a holdout can be scored at most once.
#[derive(Debug)]
pub struct Holdout {
    train: Vec<RebalancePoint>,
    test: Vec<RebalancePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldoutResult<P> {
    pub params: P,
    pub train_dates: usize,
    pub train_score: f64,
    pub performance: PeriodPerformance,
}

impl Holdout {
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.test.iter().map(|p| p.rebalance_date)
    }

    pub fn len(&self) -> usize {
        self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test.is_empty()
    }

    /// Pick the best candidate on every rotation date known before the
    /// holdout starts, then score it once on the holdout.
    pub fn evaluate<O: FoldObjective>(
        self,
        objective: &O,
        candidates: &[O::Params],
        metric: SelectionMetric,
    ) -> Option<HoldoutResult<O::Params>> {
        if self.train.is_empty() || self.test.is_empty() {
            warn!("holdout has no training or test dates; skipped");
            return None;
        }
        let (best, train_score) = select_best(objective, candidates, &self.train, metric)?;
        let params = candidates[best].clone();
        let performance = objective.score(&params, &self.test);
        info!(
            dates = self.test.len(),
            params = ?params,
            mean_excess = ?performance.mean_excess,
            "holdout evaluated"
        );
        Some(HoldoutResult {
            params,
            train_dates: self.train.len(),
            train_score,
            performance,
        })
    }
}

/// Split the rotation from the holdout window.
///
/// Dates on or after `last - holdout_months` are withheld. The holdout's
/// training set is every rotation date evaluated before the holdout starts.
pub fn split_holdout(
    points: Vec<RebalancePoint>,
    holdout_months: Option<u32>,
) -> Result<(Vec<RebalancePoint>, Option<Holdout>), HarnessError> {
    let (Some(months), Some(last)) = (holdout_months, points.last().copied()) else {
        return Ok((points, None));
    };
    let cutoff = sub_months(last.rebalance_date, months)
        .ok_or(HarnessError::DateOutOfRange(last.rebalance_date))?;
    let (rotation, test): (Vec<RebalancePoint>, Vec<RebalancePoint>) =
        points.into_iter().partition(|p| p.rebalance_date < cutoff);
    let holdout_start = test.first().map(|p| p.rebalance_date).unwrap_or(cutoff);
    let train = rotation
        .iter()
        .filter(|p| p.evaluation_date < holdout_start)
        .copied()
        .collect();
    Ok((rotation, Some(Holdout { train, test })))
}

// ─── Orchestration ───────────────────────────────────────────────────

/// Result of one completed fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldResult<P> {
    pub fold_index: usize,
    pub train_dates: Vec<NaiveDate>,
    pub test_dates: Vec<NaiveDate>,
    pub params: P,
    pub train_score: f64,
    pub test_score: Option<f64>,
    pub train_performance: PeriodPerformance,
    pub test_performance: PeriodPerformance,
}

/// Everything the harness produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessReport<P> {
    pub folds: Vec<FoldResult<P>>,
    pub invalid_folds: Vec<FoldError>,
    pub holdout: Option<HoldoutResult<P>>,
    pub candidates: usize,
    pub cancelled: bool,
}

impl<P> HarnessReport<P> {
    /// Mean of the test scores of completed folds.
    pub fn mean_test_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.folds.iter().filter_map(|f| f.test_score).collect();
        crate::performance::mean_f64(&scores)
    }
}

pub struct WalkForwardHarness {
    config: WalkForwardConfig,
    cancel: CancelToken,
}

impl WalkForwardHarness {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// Plan every fold over `dates` without scoring anything.
    ///
    /// Returns the holdout (if configured) and one entry per test span.
    #[allow(clippy::type_complexity)]
    pub fn plan(
        &self,
        dates: &[NaiveDate],
    ) -> Result<(Vec<Result<FoldSpec, FoldError>>, Option<Holdout>), HarnessError> {
        let mut sorted = dates.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.is_empty() {
            return Err(HarnessError::NoDates);
        }
        let points = rebalance_points(&sorted, self.config.horizon_months)?;
        let (rotation, holdout) = split_holdout(points, self.config.holdout_months)?;
        let spans = test_spans(&rotation, &self.config.split)?;
        let folds = spans
            .into_iter()
            .enumerate()
            .map(|(i, span)| plan_fold(i, &rotation, span, &self.config))
            .collect();
        Ok((folds, holdout))
    }

    /// Run every fold, then the holdout.
    pub fn run<O: FoldObjective>(
        &self,
        dates: &[NaiveDate],
        objective: &O,
        candidates: &[O::Params],
    ) -> Result<HarnessReport<O::Params>, HarnessError> {
        if candidates.is_empty() {
            return Err(HarnessError::NoCandidates);
        }
        let (plans, holdout) = self.plan(dates)?;
        let metric = self.config.metric;

        let mut report = HarnessReport {
            folds: Vec::new(),
            invalid_folds: Vec::new(),
            holdout: None,
            candidates: candidates.len(),
            cancelled: false,
        };

        for plan in plans {
            if self.cancel.is_cancelled() {
                warn!(completed = report.folds.len(), "walk-forward cancelled");
                report.cancelled = true;
                return Ok(report);
            }
            let spec = match plan {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(error = %e, "invalid fold skipped");
                    report.invalid_folds.push(e);
                    continue;
                }
            };
            match run_fold(&spec, objective, candidates, metric) {
                Ok(result) => {
                    info!(
                        fold = result.fold_index,
                        train = result.train_dates.len(),
                        test = result.test_dates.len(),
                        params = ?result.params,
                        train_score = result.train_score,
                        test_score = ?result.test_score,
                        "fold complete"
                    );
                    report.folds.push(result);
                }
                Err(e) => {
                    warn!(error = %e, "invalid fold skipped");
                    report.invalid_folds.push(e);
                }
            }
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }
        report.holdout = holdout.and_then(|h| h.evaluate(objective, candidates, metric));
        Ok(report)
    }
}

fn select_best<O: FoldObjective>(
    objective: &O,
    candidates: &[O::Params],
    points: &[RebalancePoint],
    metric: SelectionMetric,
) -> Option<(usize, f64)> {
    let scores: Vec<Option<f64>> = candidates
        .par_iter()
        .map(|c| metric.extract(&objective.score(c, points)))
        .collect();
    let best = metric.best_index(&scores)?;
    scores[best].map(|s| (best, s))
}

fn run_fold<O: FoldObjective>(
    spec: &FoldSpec,
    objective: &O,
    candidates: &[O::Params],
    metric: SelectionMetric,
) -> Result<FoldResult<O::Params>, FoldError> {
    let (best, train_score) = select_best(objective, candidates, &spec.train, metric)
        .ok_or(FoldError::Unscorable {
            fold: spec.fold_index,
        })?;
    let params = candidates[best].clone();
    let train_performance = objective.score(&params, &spec.train);
    let test_performance = objective.score(&params, &spec.test);
    Ok(FoldResult {
        fold_index: spec.fold_index,
        train_dates: spec.train.iter().map(|p| p.rebalance_date).collect(),
        test_dates: spec.test.iter().map(|p| p.rebalance_date).collect(),
        params,
        train_score,
        test_score: metric.extract(&test_performance),
        train_performance,
        test_performance,
    })
}
