//! Look-ahead contamination tests for the resolver and valuation engine.
//!
//! Method: build a truncated snapshot holding only facts known at E and a full
//! snapshot that also holds later disclosures, later prices and a split after
//! E. Every answer at E must be identical between the two.

use chrono::NaiveDate;
use pitlab_core::data::{RawPriceRow, Snapshot, SnapshotBuilder};
use pitlab_core::domain::{FinancialFields, FinancialStatementRecord, PeriodType, SecurityCode};
use pitlab_core::resolver::FinancialRecordResolver;
use pitlab_core::valuation::ValuationEngine;

const CODE: &str = "99840";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn price(d: &str, close: f64, factor: f64) -> RawPriceRow {
    RawPriceRow {
        code: CODE.into(),
        date: date(d),
        open: Some(close),
        close: Some(close),
        adjusted_close: None,
        adjustment_factor: Some(factor),
    }
}

fn statement(
    period_type: PeriodType,
    disclosed: &str,
    period_end: &str,
    profit: Option<f64>,
    forecast_profit: Option<f64>,
) -> FinancialStatementRecord {
    FinancialStatementRecord {
        security: SecurityCode::from(CODE),
        disclosure_date: date(disclosed),
        period_type,
        period_end: date(period_end),
        actual: FinancialFields {
            profit,
            equity: profit.map(|p| p * 10.0),
            ..FinancialFields::default()
        },
        forecast: FinancialFields {
            profit: forecast_profit,
            ..FinancialFields::default()
        },
        shares_outstanding: Some(1000.0),
        treasury_shares: Some(10.0),
    }
}

fn known_at_e() -> (Vec<RawPriceRow>, Vec<FinancialStatementRecord>) {
    let prices = vec![
        price("2023-03-31", 500.0, 1.0),
        price("2023-06-30", 520.0, 1.0),
        price("2023-09-29", 540.0, 1.0),
    ];
    let statements = vec![
        statement(PeriodType::Fy, "2022-05-13", "2022-03-31", Some(80.0), Some(90.0)),
        statement(PeriodType::Q3, "2023-02-10", "2023-03-31", None, Some(95.0)),
        statement(PeriodType::Fy, "2023-05-12", "2023-03-31", Some(100.0), Some(110.0)),
        statement(PeriodType::Q1, "2023-08-10", "2024-03-31", Some(30.0), Some(115.0)),
    ];
    (prices, statements)
}

fn build(prices: Vec<RawPriceRow>, statements: Vec<FinancialStatementRecord>) -> Snapshot {
    let mut b = SnapshotBuilder::new();
    for p in prices {
        b.push_price_row(p).unwrap();
    }
    for s in statements {
        b.add_statement(s).unwrap();
    }
    b.build()
}

fn truncated() -> Snapshot {
    let (prices, statements) = known_at_e();
    build(prices, statements)
}

fn full() -> Snapshot {
    let (mut prices, mut statements) = known_at_e();
    prices.push(price("2023-10-02", 270.0, 0.5));
    prices.push(price("2024-03-29", 300.0, 1.0));
    statements.push(statement(PeriodType::Q2, "2023-11-10", "2024-03-31", Some(60.0), Some(120.0)));
    statements.push(statement(PeriodType::Fy, "2024-05-10", "2024-03-31", Some(125.0), Some(130.0)));
    // restatement of the FY the query uses, disclosed after E
    statements.push(statement(PeriodType::Fy, "2023-11-01", "2023-03-31", Some(999.0), None));
    build(prices, statements)
}

#[test]
fn resolution_at_e_ignores_later_disclosures() {
    let e = date("2023-09-29");
    let s = SecurityCode::from(CODE);
    let t = truncated();
    let f = full();
    let rt = FinancialRecordResolver::new(&t).resolve(&s, e);
    let rf = FinancialRecordResolver::new(&f).resolve(&s, e);
    assert_eq!(rt, rf);

    let r = rf.into_resolved().unwrap();
    assert_eq!(r.fy.record.disclosure_date, date("2023-05-12"));
    assert_eq!(r.forecast.unwrap().disclosure_date, date("2023-08-10"));
}

#[test]
fn valuation_at_e_ignores_later_prices_and_splits() {
    let e = date("2023-09-29");
    let s = SecurityCode::from(CODE);
    let t = truncated();
    let f = full();
    let t_resolver = FinancialRecordResolver::new(&t);
    let f_resolver = FinancialRecordResolver::new(&f);
    let vt = ValuationEngine::new(&t, &t_resolver).snapshot(&s, e);
    let vf = ValuationEngine::new(&f, &f_resolver).snapshot(&s, e);
    assert_eq!(vt, vf);
    assert_eq!(vf.caf_fy, Some(1.0));
}

#[test]
fn every_date_in_known_window_is_stable() {
    let s = SecurityCode::from(CODE);
    let t = truncated();
    let f = full();
    let t_resolver = FinancialRecordResolver::new(&t);
    let f_resolver = FinancialRecordResolver::new(&f);
    let vt = ValuationEngine::new(&t, &t_resolver);
    let vf = ValuationEngine::new(&f, &f_resolver);

    let mut d = date("2022-01-01");
    while d <= date("2023-09-29") {
        assert_eq!(vt.snapshot(&s, d), vf.snapshot(&s, d), "diverged at {d}");
        d = d.succ_opt().unwrap();
    }
}
