//! Split-adjusted portfolio returns against a benchmark.
//!
//! For a portfolio rebalanced on `R` and evaluated at `A`:
//!
//! - entry: first session strictly after `R` with an open or a close; the
//!   entry price is the open, else the close
//! - exit: latest close on or before `A`, observed on `exit_date`
//! - `split_multiplier = caf(entry_date, exit_date)`; the exit price divided
//!   by it is on the entry-date share basis
//! - `return = (exit / split_multiplier - entry) / entry`
//!
//! Holdings without usable prices are excluded with a reason and the
//! aggregate is re-weighted over the rest. Missing data is never a 0% return.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::adjustment::CafEngine;
use crate::data::Snapshot;
use crate::domain::{IndexCode, PortfolioHolding, PortfolioSnapshot, SecurityCode};

#[derive(Debug, Error, PartialEq)]
pub enum BacktestError {
    #[error("as-of date {as_of} is before rebalance date {rebalance_date}")]
    AsOfBeforeRebalance {
        rebalance_date: NaiveDate,
        as_of: NaiveDate,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// No session with an open or close after the rebalance date.
    NoEntryPrice,
    /// First session after the rebalance date falls after the as-of date.
    NotYetEntered,
    /// No close between the entry date and the as-of date.
    NoExitPrice,
    /// A price or the split multiplier was not usable.
    InvalidPrice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedHolding {
    pub security: SecurityCode,
    pub weight: f64,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingPerformance {
    pub security: SecurityCode,
    pub weight: f64,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub split_multiplier: f64,
    pub return_pct: f64,
}

/// Result of evaluating one rebalance at one as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestPerformanceRecord {
    pub rebalance_date: NaiveDate,
    pub as_of: NaiveDate,
    pub holdings: Vec<HoldingPerformance>,
    pub excluded: Vec<ExcludedHolding>,
    /// Sum of weights of the holdings in `holdings`.
    pub covered_weight: f64,
    pub is_partial: bool,
    /// Weighted return over covered holdings; `None` when nothing is covered.
    pub aggregate_return: Option<f64>,
    pub benchmark_return: Option<f64>,
    pub excess_return: Option<f64>,
}

/// Evaluates portfolios against one snapshot and one benchmark index.
#[derive(Debug, Clone)]
pub struct BacktestCalculator<'a> {
    snapshot: &'a Snapshot,
    caf: CafEngine<'a>,
    benchmark: IndexCode,
}

impl<'a> BacktestCalculator<'a> {
    pub fn new(snapshot: &'a Snapshot, benchmark: IndexCode) -> Self {
        Self {
            snapshot,
            caf: CafEngine::new(snapshot),
            benchmark,
        }
    }

    pub fn benchmark(&self) -> &IndexCode {
        &self.benchmark
    }

    pub fn evaluate(
        &self,
        portfolio: &PortfolioSnapshot,
        as_of: NaiveDate,
    ) -> Result<BacktestPerformanceRecord, BacktestError> {
        let rebalance_date = portfolio.rebalance_date();
        if as_of < rebalance_date {
            return Err(BacktestError::AsOfBeforeRebalance {
                rebalance_date,
                as_of,
            });
        }

        let mut holdings = Vec::with_capacity(portfolio.len());
        let mut excluded = Vec::new();
        for h in portfolio.holdings() {
            match self.holding_performance(h, as_of) {
                Ok(perf) => holdings.push(perf),
                Err(reason) => excluded.push(ExcludedHolding {
                    security: h.security.clone(),
                    weight: h.weight,
                    reason,
                }),
            }
        }

        let covered_weight: f64 = holdings.iter().map(|h| h.weight).sum();
        let aggregate_return = if holdings.is_empty() || covered_weight <= 0.0 {
            None
        } else {
            let weighted: f64 = holdings.iter().map(|h| h.weight * h.return_pct).sum();
            Some(weighted / covered_weight)
        };
        let benchmark_return = self.benchmark_return(rebalance_date, as_of);
        let excess_return = match (aggregate_return, benchmark_return) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        };

        if !excluded.is_empty() {
            debug!(
                rebalance_date = %rebalance_date,
                as_of = %as_of,
                excluded = excluded.len(),
                covered_weight,
                "partial portfolio coverage"
            );
        }

        Ok(BacktestPerformanceRecord {
            rebalance_date,
            as_of,
            is_partial: !excluded.is_empty(),
            holdings,
            excluded,
            covered_weight,
            aggregate_return,
            benchmark_return,
            excess_return,
        })
    }

    fn holding_performance(
        &self,
        holding: &PortfolioHolding,
        as_of: NaiveDate,
    ) -> Result<HoldingPerformance, ExclusionReason> {
        let security = &holding.security;
        let entry = self
            .snapshot
            .next_session_after(security, holding.rebalance_date)
            .ok_or(ExclusionReason::NoEntryPrice)?;
        if entry.date > as_of {
            return Err(ExclusionReason::NotYetEntered);
        }
        let entry_price = entry.entry_price().ok_or(ExclusionReason::NoEntryPrice)?;

        let (exit_date, exit_price) = self
            .snapshot
            .latest_close_on_or_before(security, as_of)
            .filter(|(d, _)| *d >= entry.date)
            .ok_or(ExclusionReason::NoExitPrice)?;

        // exit price is on the basis of its own date, not of `as_of`
        let split_multiplier = self.caf.cumulative_factor(security, entry.date, exit_date);
        if !(entry_price > 0.0 && split_multiplier.is_finite() && split_multiplier > 0.0) {
            return Err(ExclusionReason::InvalidPrice);
        }
        let return_pct = (exit_price / split_multiplier - entry_price) / entry_price;
        if !return_pct.is_finite() {
            return Err(ExclusionReason::InvalidPrice);
        }

        Ok(HoldingPerformance {
            security: security.clone(),
            weight: holding.weight,
            entry_date: entry.date,
            entry_price,
            exit_date,
            exit_price,
            split_multiplier,
            return_pct,
        })
    }

    fn benchmark_return(&self, rebalance_date: NaiveDate, as_of: NaiveDate) -> Option<f64> {
        let entry = self
            .snapshot
            .next_index_session_after(&self.benchmark, rebalance_date)?;
        if entry.date > as_of {
            return None;
        }
        let entry_level = entry.entry_level()?;
        let (exit_date, exit_level) = self
            .snapshot
            .latest_index_close_on_or_before(&self.benchmark, as_of)?;
        if exit_date < entry.date || entry_level <= 0.0 {
            return None;
        }
        Some((exit_level - entry_level) / entry_level)
    }
}
