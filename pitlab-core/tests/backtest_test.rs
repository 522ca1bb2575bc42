//! Backtest return scenarios: plain gain vs benchmark, split inside the
//! holding period, and partial coverage.

use chrono::NaiveDate;
use pitlab_core::backtest::{BacktestCalculator, ExclusionReason};
use pitlab_core::data::{RawIndexRow, RawPriceRow, Snapshot, SnapshotBuilder};
use pitlab_core::domain::{IndexCode, PortfolioSnapshot, SecurityCode};

const REBALANCE: &str = "2024-03-29";
const AS_OF: &str = "2024-06-28";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn price(code: &str, d: &str, open: Option<f64>, close: Option<f64>, factor: f64) -> RawPriceRow {
    RawPriceRow {
        code: code.into(),
        date: date(d),
        open,
        close,
        adjusted_close: None,
        adjustment_factor: Some(factor),
    }
}

fn topix(d: &str, open: f64, close: f64) -> RawIndexRow {
    RawIndexRow {
        index: "TOPIX".into(),
        date: date(d),
        open: Some(open),
        close: Some(close),
    }
}

fn with_benchmark(mut b: SnapshotBuilder) -> Snapshot {
    b.push_index_row(topix("2024-03-29", 990.0, 995.0)).unwrap();
    b.push_index_row(topix("2024-04-01", 1000.0, 1005.0)).unwrap();
    b.push_index_row(topix("2024-06-28", 1090.0, 1100.0)).unwrap();
    b.build()
}

fn codes(list: &[&str]) -> Vec<SecurityCode> {
    list.iter().map(|c| SecurityCode::from(*c)).collect()
}

#[test]
fn single_holding_against_benchmark() {
    let mut b = SnapshotBuilder::new();
    b.push_price_row(price("A", "2024-03-29", Some(95.0), Some(96.0), 1.0)).unwrap();
    b.push_price_row(price("A", "2024-04-01", Some(100.0), Some(101.0), 1.0)).unwrap();
    b.push_price_row(price("A", "2024-06-28", Some(118.0), Some(120.0), 1.0)).unwrap();
    let snap = with_benchmark(b);

    let calc = BacktestCalculator::new(&snap, IndexCode::new("TOPIX"));
    let p = PortfolioSnapshot::equal_weight(date(REBALANCE), &codes(&["A"])).unwrap();
    let rec = calc.evaluate(&p, date(AS_OF)).unwrap();

    let h = &rec.holdings[0];
    assert_eq!(h.entry_date, date("2024-04-01"));
    assert_eq!(h.entry_price, 100.0);
    assert_eq!(h.exit_date, date(AS_OF));
    assert_eq!(h.split_multiplier, 1.0);
    assert!((rec.aggregate_return.unwrap() - 0.20).abs() < 1e-12);
    assert!((rec.benchmark_return.unwrap() - 0.10).abs() < 1e-12);
    assert!((rec.excess_return.unwrap() - 0.10).abs() < 1e-12);
    assert!(!rec.is_partial);
    assert!((rec.covered_weight - 1.0).abs() < 1e-12);
}

#[test]
fn split_during_holding_is_not_a_loss() {
    let mut b = SnapshotBuilder::new();
    b.push_price_row(price("A", "2024-04-01", Some(100.0), Some(100.0), 1.0)).unwrap();
    b.push_price_row(price("A", "2024-05-01", Some(55.0), Some(55.0), 0.5)).unwrap();
    b.push_price_row(price("A", "2024-06-28", Some(60.0), Some(60.0), 1.0)).unwrap();
    let snap = with_benchmark(b);

    let calc = BacktestCalculator::new(&snap, IndexCode::new("TOPIX"));
    let p = PortfolioSnapshot::equal_weight(date(REBALANCE), &codes(&["A"])).unwrap();
    let rec = calc.evaluate(&p, date(AS_OF)).unwrap();

    let h = &rec.holdings[0];
    assert_eq!(h.split_multiplier, 0.5);
    assert!((h.return_pct - 0.20).abs() < 1e-12);
    assert!(rec.aggregate_return.unwrap() > 0.0);
}

#[test]
fn split_on_entry_date_is_already_in_entry_price() {
    let mut b = SnapshotBuilder::new();
    b.push_price_row(price("A", "2024-04-01", Some(50.0), Some(50.0), 0.5)).unwrap();
    b.push_price_row(price("A", "2024-06-28", Some(55.0), Some(55.0), 1.0)).unwrap();
    let snap = with_benchmark(b);

    let calc = BacktestCalculator::new(&snap, IndexCode::new("TOPIX"));
    let p = PortfolioSnapshot::equal_weight(date(REBALANCE), &codes(&["A"])).unwrap();
    let rec = calc.evaluate(&p, date(AS_OF)).unwrap();
    assert_eq!(rec.holdings[0].split_multiplier, 1.0);
    assert!((rec.aggregate_return.unwrap() - 0.10).abs() < 1e-12);
}

#[test]
fn missing_exit_is_excluded_and_weights_renormalized() {
    let mut b = SnapshotBuilder::new();
    b.push_price_row(price("A", "2024-04-01", Some(100.0), Some(100.0), 1.0)).unwrap();
    b.push_price_row(price("A", "2024-06-28", Some(110.0), Some(110.0), 1.0)).unwrap();
    b.push_price_row(price("B", "2024-04-01", Some(100.0), Some(100.0), 1.0)).unwrap();
    b.push_price_row(price("B", "2024-06-28", Some(120.0), Some(120.0), 1.0)).unwrap();
    // C trades once with an open but never prints a close
    b.push_price_row(price("C", "2024-04-01", Some(100.0), None, 1.0)).unwrap();
    let snap = with_benchmark(b);

    let calc = BacktestCalculator::new(&snap, IndexCode::new("TOPIX"));
    let p = PortfolioSnapshot::equal_weight(date(REBALANCE), &codes(&["A", "B", "C"])).unwrap();
    let rec = calc.evaluate(&p, date(AS_OF)).unwrap();

    assert!(rec.is_partial);
    assert_eq!(rec.holdings.len(), 2);
    assert_eq!(rec.excluded.len(), 1);
    assert_eq!(rec.excluded[0].security, SecurityCode::from("C"));
    assert_eq!(rec.excluded[0].reason, ExclusionReason::NoExitPrice);
    assert!((rec.covered_weight - 2.0 / 3.0).abs() < 1e-9);
    assert!((rec.aggregate_return.unwrap() - 0.15).abs() < 1e-12);
}

#[test]
fn unknown_benchmark_gives_no_excess() {
    let mut b = SnapshotBuilder::new();
    b.push_price_row(price("A", "2024-04-01", Some(100.0), Some(100.0), 1.0)).unwrap();
    b.push_price_row(price("A", "2024-06-28", Some(120.0), Some(120.0), 1.0)).unwrap();
    let snap = with_benchmark(b);

    let calc = BacktestCalculator::new(&snap, IndexCode::new("NIKKEI225"));
    let p = PortfolioSnapshot::equal_weight(date(REBALANCE), &codes(&["A"])).unwrap();
    let rec = calc.evaluate(&p, date(AS_OF)).unwrap();
    assert!(rec.aggregate_return.is_some());
    assert_eq!(rec.benchmark_return, None);
    assert_eq!(rec.excess_return, None);
}

#[test]
fn split_after_last_close_does_not_rebase_the_exit() {
    let mut b = SnapshotBuilder::new();
    b.push_price_row(price("A", "2024-04-01", Some(100.0), Some(100.0), 1.0)).unwrap();
    b.push_price_row(price("A", "2024-06-27", Some(100.0), Some(100.0), 1.0)).unwrap();
    // split takes effect on a day without a close
    b.push_price_row(price("A", "2024-06-28", None, None, 0.5)).unwrap();
    let snap = with_benchmark(b);

    let calc = BacktestCalculator::new(&snap, IndexCode::new("TOPIX"));
    let p = PortfolioSnapshot::equal_weight(date(REBALANCE), &codes(&["A"])).unwrap();
    let rec = calc.evaluate(&p, date(AS_OF)).unwrap();

    let h = &rec.holdings[0];
    assert_eq!(h.exit_date, date("2024-06-27"));
    assert_eq!(h.exit_price, 100.0);
    assert_eq!(h.split_multiplier, 1.0);
    assert!(h.return_pct.abs() < 1e-12);
}
