//! Daily price observations and benchmark index levels.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::SecurityCode;

/// One trading day for one security.
///
/// `adjustment_factor` is 1.0 on days without a corporate action. Any other
/// value marks a split, reverse split or bonus issue effective on `date`:
/// prices before `date` multiplied by the factor are comparable with prices
/// from `date` on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub security: SecurityCode,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub adjusted_close: Option<f64>,
    pub adjustment_factor: f64,
}

impl PriceObservation {
    /// True when this row marks a corporate action.
    pub fn is_adjustment_event(&self) -> bool {
        (self.adjustment_factor - 1.0).abs() > f64::EPSILON
    }

    /// Opening price, falling back to the close when the open is absent.
    pub fn entry_price(&self) -> Option<f64> {
        self.open.or(self.close)
    }
}

/// A corporate action derived from a [`PriceObservation`] whose factor is not 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentEvent {
    pub date: NaiveDate,
    pub factor: f64,
}

/// One day of a benchmark index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexLevel {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
}

impl IndexLevel {
    pub fn entry_level(&self) -> Option<f64> {
        self.open.or(self.close)
    }
}
