//! Value-screen strategy, the objective the fold harness tunes.
//!
//! At each rebalance date the universe is valued as of that date, filtered by
//! PER (or forward PER) and PBR caps, ranked by the cheaper ratio first, and
//! the `top_n` names are held equal-weighted until the evaluation date.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use chrono::NaiveDate;
use pitlab_core::backtest::BacktestCalculator;
use pitlab_core::domain::{PortfolioSnapshot, SecurityCode};
use pitlab_core::valuation::{ValuationEngine, ValuationSnapshot};

use crate::performance::{DateOutcome, PeriodPerformance, RebalancePoint, SkipReason};
use crate::walk_forward::FoldObjective;

/// Tunable parameters of the value screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueScreenParams {
    /// Upper bound on the ranking ratio; `None` means no cap.
    pub max_per: Option<f64>,
    pub max_pbr: Option<f64>,
    pub top_n: usize,
    /// Rank by forward PER instead of trailing PER.
    pub use_forward_per: bool,
}

impl ValueScreenParams {
    fn ranking_ratio(&self, v: &ValuationSnapshot) -> Option<f64> {
        if self.use_forward_per {
            v.forward_per
        } else {
            v.per
        }
    }

    fn passes(&self, v: &ValuationSnapshot) -> bool {
        if !v.is_covered() {
            return false;
        }
        let Some(ratio) = self.ranking_ratio(v) else {
            return false;
        };
        if self.max_per.is_some_and(|cap| ratio > cap) {
            return false;
        }
        match self.max_pbr {
            Some(cap) => v.pbr.is_some_and(|pbr| pbr <= cap),
            None => true,
        }
    }
}

/// Value screen over a fixed universe.
#[derive(Debug, Clone)]
pub struct ValueScreen<'a> {
    valuation: ValuationEngine<'a>,
    backtest: BacktestCalculator<'a>,
    universe: Vec<SecurityCode>,
}

impl<'a> ValueScreen<'a> {
    pub fn new(
        valuation: ValuationEngine<'a>,
        backtest: BacktestCalculator<'a>,
        universe: Vec<SecurityCode>,
    ) -> Self {
        Self {
            valuation,
            backtest,
            universe,
        }
    }

    pub fn universe(&self) -> &[SecurityCode] {
        &self.universe
    }

    /// Value every security as of `as_of`, in parallel.
    pub fn valuations(&self, as_of: NaiveDate) -> Vec<ValuationSnapshot> {
        self.universe
            .par_iter()
            .map(|s| self.valuation.snapshot(s, as_of))
            .collect()
    }

    /// Securities passing the screen at `as_of`, cheapest first, at most `top_n`.
    pub fn screen(&self, params: &ValueScreenParams, as_of: NaiveDate) -> Vec<ValuationSnapshot> {
        let mut passing: Vec<ValuationSnapshot> = self
            .valuations(as_of)
            .into_iter()
            .filter(|v| params.passes(v))
            .collect();
        passing.sort_by(|a, b| {
            let ra = params.ranking_ratio(a).unwrap_or(f64::INFINITY);
            let rb = params.ranking_ratio(b).unwrap_or(f64::INFINITY);
            ra.partial_cmp(&rb)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.security.cmp(&b.security))
        });
        passing.truncate(params.top_n);
        passing
    }

    pub fn portfolio(&self, params: &ValueScreenParams, as_of: NaiveDate) -> Option<PortfolioSnapshot> {
        let picks: Vec<SecurityCode> = self
            .screen(params, as_of)
            .into_iter()
            .map(|v| v.security)
            .collect();
        PortfolioSnapshot::equal_weight(as_of, &picks).ok()
    }

    pub fn evaluate_point(&self, params: &ValueScreenParams, point: RebalancePoint) -> DateOutcome {
        let skipped = |reason| DateOutcome::Skipped { point, reason };
        let Some(portfolio) = self.portfolio(params, point.rebalance_date) else {
            return skipped(SkipReason::EmptyPortfolio);
        };
        match self.backtest.evaluate(&portfolio, point.evaluation_date) {
            Ok(record) if record.aggregate_return.is_some() => DateOutcome::Evaluated(record),
            Ok(_) => skipped(SkipReason::NoCoveredHoldings),
            Err(e) => {
                tracing::warn!(rebalance_date = %point.rebalance_date, error = %e, "evaluation failed");
                skipped(SkipReason::EvaluationFailed)
            }
        }
    }
}

impl FoldObjective for ValueScreen<'_> {
    type Params = ValueScreenParams;

    fn score(&self, params: &ValueScreenParams, points: &[RebalancePoint]) -> PeriodPerformance {
        let outcomes: Vec<DateOutcome> = points
            .par_iter()
            .map(|p| self.evaluate_point(params, *p))
            .collect();
        PeriodPerformance::from_outcomes(outcomes)
    }
}
