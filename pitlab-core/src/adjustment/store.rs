//! Adjustment factor store: the per-security daily corporate-action ratio.

use chrono::NaiveDate;

use crate::data::Snapshot;
use crate::domain::{AdjustmentEvent, SecurityCode};

/// Read-only access to daily adjustment factors.
///
/// Implementations must be pure functions of a fixed snapshot: the factor
/// for a (security, date) never changes during a run.
pub trait AdjustmentFactorStore: Send + Sync {
    /// Factor recorded for `date`, 1.0 when there is none.
    fn factor(&self, security: &SecurityCode, date: NaiveDate) -> f64;

    /// All corporate-action events of `security`, sorted by date.
    fn adjustment_events(&self, security: &SecurityCode) -> &[AdjustmentEvent];
}

impl AdjustmentFactorStore for Snapshot {
    fn factor(&self, security: &SecurityCode, date: NaiveDate) -> f64 {
        self.observation(security, date)
            .map(|o| o.adjustment_factor)
            .unwrap_or(1.0)
    }

    fn adjustment_events(&self, security: &SecurityCode) -> &[AdjustmentEvent] {
        self.events(security)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RawPriceRow, SnapshotBuilder};

    #[test]
    fn factor_defaults_to_one() {
        let mut b = SnapshotBuilder::new();
        b.push_price_row(RawPriceRow {
            code: "A".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            open: None,
            close: Some(50.0),
            adjusted_close: None,
            adjustment_factor: Some(0.5),
        })
        .unwrap();
        let snap = b.build();
        let a = SecurityCode::from("A");

        assert_eq!(snap.factor(&a, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()), 0.5);
        assert_eq!(snap.factor(&a, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()), 1.0);
        assert_eq!(snap.factor(&"ZZZ".into(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()), 1.0);
        assert_eq!(snap.adjustment_events(&a).len(), 1);
    }
}
