//! Month arithmetic and rebalance calendars.

use chrono::{Datelike, Months, NaiveDate};

use crate::domain::IndexLevel;

/// `date + months`, clamped to the end of the target month
/// (Jan 31 + 1 month is the last day of February).
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

/// `date - months`, clamped the same way as [`add_months`].
pub fn sub_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_sub_months(Months::new(months))
}

/// Last session of each calendar month in `[from, to]` with a close.
///
/// `levels` must be sorted by date, as stored in a snapshot.
pub fn month_end_sessions(levels: &[IndexLevel], from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut out: Vec<NaiveDate> = Vec::new();
    for level in levels
        .iter()
        .filter(|l| l.close.is_some() && l.date >= from && l.date <= to)
    {
        match out.last_mut() {
            Some(last) if same_month(*last, level.date) => *last = level.date,
            _ => out.push(level.date),
        }
    }
    out
}

fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
