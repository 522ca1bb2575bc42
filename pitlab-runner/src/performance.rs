//! Summary statistics over a set of rebalance dates.
//!
//! Every statistic is computed from per-date outcomes. Dates whose portfolio
//! could not be built or evaluated are counted as skipped and never enter the
//! means as a zero return.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pitlab_core::backtest::BacktestPerformanceRecord;

/// A rebalance date paired with the date its outcome is measured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RebalancePoint {
    pub rebalance_date: NaiveDate,
    pub evaluation_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Nothing passed the screen.
    EmptyPortfolio,
    /// Portfolio built but no holding had usable prices.
    NoCoveredHoldings,
    /// The calculator rejected the request.
    EvaluationFailed,
}

/// What happened at one rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DateOutcome {
    Evaluated(BacktestPerformanceRecord),
    Skipped {
        point: RebalancePoint,
        reason: SkipReason,
    },
}

/// Summary of a strategy over a set of rebalance dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodPerformance {
    pub evaluated_dates: usize,
    pub skipped_dates: usize,
    pub mean_return: Option<f64>,
    pub mean_benchmark: Option<f64>,
    pub mean_excess: Option<f64>,
    /// Share of dates with positive excess return.
    pub hit_rate: Option<f64>,
    /// Mean excess over its sample standard deviation.
    pub information_ratio: Option<f64>,
    /// Holdings excluded for missing or invalid prices, over all dates.
    pub excluded_holdings: usize,
    pub records: Vec<BacktestPerformanceRecord>,
}

impl PeriodPerformance {
    pub fn empty() -> Self {
        Self::from_outcomes(Vec::new())
    }

    pub fn from_outcomes(outcomes: Vec<DateOutcome>) -> Self {
        let mut records = Vec::new();
        let mut skipped_dates = 0;
        for o in outcomes {
            match o {
                DateOutcome::Evaluated(r) if r.aggregate_return.is_some() => records.push(r),
                _ => skipped_dates += 1,
            }
        }
        records.sort_by_key(|r| r.rebalance_date);

        let returns: Vec<f64> = records.iter().filter_map(|r| r.aggregate_return).collect();
        let benchmarks: Vec<f64> = records.iter().filter_map(|r| r.benchmark_return).collect();
        let excess: Vec<f64> = records.iter().filter_map(|r| r.excess_return).collect();

        let hit_rate = (!excess.is_empty())
            .then(|| excess.iter().filter(|e| **e > 0.0).count() as f64 / excess.len() as f64);
        let information_ratio = match (mean_f64(&excess), std_dev(&excess)) {
            (Some(m), Some(s)) if s > 1e-15 => Some(m / s),
            _ => None,
        };

        Self {
            evaluated_dates: records.len(),
            skipped_dates,
            mean_return: mean_f64(&returns),
            mean_benchmark: mean_f64(&benchmarks),
            mean_excess: mean_f64(&excess),
            hit_rate,
            information_ratio,
            excluded_holdings: records.iter().map(|r| r.excluded.len()).sum(),
            records,
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation; `None` below two values.
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean_f64(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}
