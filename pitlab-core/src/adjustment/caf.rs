//! Cumulative adjustment factor (CAF) engine.
//!
//! Factor convention: a factor `f` stored on date `d` means prices before `d`
//! multiplied by `f` are comparable with prices from `d` on. A 2-for-1 split
//! is stored as 0.5, a 1-for-2 reverse split as 2.0.
//!
//! `cumulative_factor(s, a, b)` with `a < b` is the product of factors on dates
//! in `(a, b]`. With `a > b` it is the reciprocal of the product over `(b, a]`,
//! so `caf(a, b) * caf(b, a) == 1`.
//!
//! Moving a quantity from the basis at `a` to the basis at `b`:
//! - share counts are divided by `caf(a, b)` (a 2-for-1 split doubles them)
//! - per-share figures and prices are multiplied by `caf(a, b)`
//!
//! Getting the share-count direction backwards skews every ratio of a security
//! that ever split by exactly the split ratio.

use chrono::NaiveDate;

use super::store::AdjustmentFactorStore;
use crate::domain::{AdjustmentEvent, SecurityCode};

/// Direction-aware compounding of adjustment factors between two dates.
#[derive(Clone, Copy)]
pub struct CafEngine<'a> {
    store: &'a dyn AdjustmentFactorStore,
}

impl<'a> CafEngine<'a> {
    pub fn new(store: &'a dyn AdjustmentFactorStore) -> Self {
        Self { store }
    }

    /// Compounded factor from `date_from` to `date_to`, in either direction.
    ///
    /// Returns 1.0 when no events fall in the range, including ranges entirely
    /// past the last stored observation.
    pub fn cumulative_factor(
        &self,
        security: &SecurityCode,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> f64 {
        if date_from <= date_to {
            self.product(security, date_from, date_to)
        } else {
            1.0 / self.product(security, date_to, date_from)
        }
    }

    /// Events with `after < date <= through`.
    pub fn events_between(
        &self,
        security: &SecurityCode,
        after: NaiveDate,
        through: NaiveDate,
    ) -> &'a [AdjustmentEvent] {
        let events = self.store.adjustment_events(security);
        if after >= through {
            return &[];
        }
        let start = events.partition_point(|e| e.date <= after);
        let end = events.partition_point(|e| e.date <= through);
        &events[start..end]
    }

    fn product(&self, security: &SecurityCode, after: NaiveDate, through: NaiveDate) -> f64 {
        self.events_between(security, after, through)
            .iter()
            .map(|e| e.factor)
            .product()
    }
}

impl std::fmt::Debug for CafEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CafEngine").finish_non_exhaustive()
    }
}

/// Share count moved onto the later basis.
pub fn rebase_share_count(count: f64, caf: f64) -> f64 {
    count / caf
}

/// Per-share figure (EPS, BVPS, a price) moved onto the later basis.
pub fn rebase_per_share(value: f64, caf: f64) -> f64 {
    value * caf
}

/// Date a record's figures are rebased from when answering at `as_of`.
///
/// A fiscal year that has not ended by `as_of` is already on the `as_of`
/// basis; clamping also keeps events after `as_of` out of the product.
pub fn rebase_anchor(period_end: NaiveDate, as_of: NaiveDate) -> NaiveDate {
    period_end.min(as_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RawPriceRow, Snapshot, SnapshotBuilder};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snapshot(rows: &[(&str, f64)]) -> Snapshot {
        let mut b = SnapshotBuilder::new();
        for (d, factor) in rows {
            b.push_price_row(RawPriceRow {
                code: "S".into(),
                date: date(d),
                open: None,
                close: Some(100.0),
                adjusted_close: None,
                adjustment_factor: Some(*factor),
            })
            .unwrap();
        }
        b.build()
    }

    #[test]
    fn no_events_gives_one() {
        let snap = snapshot(&[("2020-01-06", 1.0), ("2020-01-07", 1.0)]);
        let caf = CafEngine::new(&snap);
        let s = SecurityCode::from("S");
        assert_eq!(caf.cumulative_factor(&s, date("2020-01-01"), date("2020-12-31")), 1.0);
        assert_eq!(caf.cumulative_factor(&s, date("2020-12-31"), date("2020-01-01")), 1.0);
    }

    #[test]
    fn range_is_open_at_start_closed_at_end() {
        let snap = snapshot(&[("2020-03-02", 0.5)]);
        let caf = CafEngine::new(&snap);
        let s = SecurityCode::from("S");
        // event on the start date is excluded
        assert_eq!(caf.cumulative_factor(&s, date("2020-03-02"), date("2020-06-01")), 1.0);
        // event on the end date is included
        assert_eq!(caf.cumulative_factor(&s, date("2020-01-01"), date("2020-03-02")), 0.5);
    }

    #[test]
    fn factors_compound_and_invert_backwards() {
        let snap = snapshot(&[("2019-04-01", 0.5), ("2021-10-01", 0.2), ("2022-01-04", 1.0)]);
        let caf = CafEngine::new(&snap);
        let s = SecurityCode::from("S");
        let fwd = caf.cumulative_factor(&s, date("2019-01-01"), date("2022-01-01"));
        let back = caf.cumulative_factor(&s, date("2022-01-01"), date("2019-01-01"));
        assert!((fwd - 0.1).abs() < 1e-12);
        assert!((back - 10.0).abs() < 1e-9);
        assert!((fwd * back - 1.0).abs() < 1e-12);
    }

    #[test]
    fn range_past_last_observation_is_one() {
        let snap = snapshot(&[("2020-03-02", 0.5)]);
        let caf = CafEngine::new(&snap);
        let s = SecurityCode::from("S");
        assert_eq!(caf.cumulative_factor(&s, date("2030-01-01"), date("2031-01-01")), 1.0);
        assert_eq!(caf.cumulative_factor(&"UNKNOWN".into(), date("2000-01-01"), date("2031-01-01")), 1.0);
    }

    #[test]
    fn rebasing_directions() {
        // 2-for-1 split: factor 0.5
        assert_eq!(rebase_share_count(10.0, 0.5), 20.0);
        assert_eq!(rebase_per_share(80.0, 0.5), 40.0);
    }

    #[test]
    fn anchor_clamps_future_period_end() {
        assert_eq!(rebase_anchor(date("2025-03-31"), date("2024-08-10")), date("2024-08-10"));
        assert_eq!(rebase_anchor(date("2024-03-31"), date("2024-08-10")), date("2024-03-31"));
    }
}
