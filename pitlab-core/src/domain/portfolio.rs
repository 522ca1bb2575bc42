//! Portfolio snapshots: the holdings chosen on one rebalance date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::ids::SecurityCode;

/// Weights of a snapshot must sum to 1 within this tolerance.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioHolding {
    pub rebalance_date: NaiveDate,
    pub security: SecurityCode,
    pub weight: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PortfolioError {
    #[error("portfolio for {0} has no holdings")]
    Empty(NaiveDate),

    #[error("holding {security} has invalid weight {weight}")]
    InvalidWeight { security: SecurityCode, weight: f64 },

    #[error("weights sum to {sum}, expected 1.0")]
    WeightSum { sum: f64 },

    #[error("security {0} appears more than once")]
    DuplicateSecurity(SecurityCode),

    #[error("holding for {security} is dated {found}, expected {expected}")]
    MixedRebalanceDates {
        security: SecurityCode,
        expected: NaiveDate,
        found: NaiveDate,
    },
}

/// Validated set of holdings for a single rebalance date.
///
/// Deserializing runs the same checks as [`PortfolioSnapshot::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PortfolioSnapshotRepr")]
pub struct PortfolioSnapshot {
    rebalance_date: NaiveDate,
    holdings: Vec<PortfolioHolding>,
}

#[derive(Deserialize)]
struct PortfolioSnapshotRepr {
    rebalance_date: NaiveDate,
    holdings: Vec<PortfolioHolding>,
}

impl TryFrom<PortfolioSnapshotRepr> for PortfolioSnapshot {
    type Error = PortfolioError;

    fn try_from(repr: PortfolioSnapshotRepr) -> Result<Self, Self::Error> {
        Self::new(repr.rebalance_date, repr.holdings)
    }
}

impl PortfolioSnapshot {
    pub fn new(
        rebalance_date: NaiveDate,
        holdings: Vec<PortfolioHolding>,
    ) -> Result<Self, PortfolioError> {
        if holdings.is_empty() {
            return Err(PortfolioError::Empty(rebalance_date));
        }

        let mut seen = HashSet::new();
        let mut sum = 0.0;
        for h in &holdings {
            if h.rebalance_date != rebalance_date {
                return Err(PortfolioError::MixedRebalanceDates {
                    security: h.security.clone(),
                    expected: rebalance_date,
                    found: h.rebalance_date,
                });
            }
            if !h.weight.is_finite() || h.weight < 0.0 {
                return Err(PortfolioError::InvalidWeight {
                    security: h.security.clone(),
                    weight: h.weight,
                });
            }
            if !seen.insert(h.security.clone()) {
                return Err(PortfolioError::DuplicateSecurity(h.security.clone()));
            }
            sum += h.weight;
        }

        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(PortfolioError::WeightSum { sum });
        }

        Ok(Self {
            rebalance_date,
            holdings,
        })
    }

    /// Equal-weight portfolio over `securities`.
    pub fn equal_weight(
        rebalance_date: NaiveDate,
        securities: &[SecurityCode],
    ) -> Result<Self, PortfolioError> {
        let n = securities.len();
        if n == 0 {
            return Err(PortfolioError::Empty(rebalance_date));
        }
        let w = 1.0 / n as f64;
        let holdings = securities
            .iter()
            .map(|s| PortfolioHolding {
                rebalance_date,
                security: s.clone(),
                weight: w,
            })
            .collect();
        Self::new(rebalance_date, holdings)
    }

    pub fn rebalance_date(&self) -> NaiveDate {
        self.rebalance_date
    }

    pub fn holdings(&self) -> &[PortfolioHolding] {
        &self.holdings
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}
