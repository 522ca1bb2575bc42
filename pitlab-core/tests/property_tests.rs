//! Property tests for point-in-time invariants.
//!
//! Uses proptest to verify:
//! 1. CAF round trip: caf(a, b) * caf(b, a) == 1 for any pair of dates
//! 2. CAF composition: caf(a, c) == caf(a, b) * caf(b, c) for a <= b <= c
//! 3. No look-ahead: everything resolved at E was disclosed on or before E

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use pitlab_core::adjustment::CafEngine;
use pitlab_core::data::{RawPriceRow, Snapshot, SnapshotBuilder};
use pitlab_core::domain::{FinancialFields, FinancialStatementRecord, PeriodType, SecurityCode};
use pitlab_core::resolver::{FinancialRecordResolver, ImputationSource};

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 5).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_factor() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(1.0),
        Just(0.5),
        Just(0.2),
        Just(0.1),
        Just(2.0),
        Just(1.0 / 3.0),
        (0.05..5.0_f64),
    ]
}

fn arb_events() -> impl Strategy<Value = Vec<(i64, f64)>> {
    prop::collection::vec((0..3000_i64, arb_factor()), 0..20)
}

fn arb_period_type() -> impl Strategy<Value = PeriodType> {
    prop_oneof![
        Just(PeriodType::Fy),
        Just(PeriodType::Q3),
        Just(PeriodType::Q2),
        Just(PeriodType::Q1),
    ]
}

fn arb_opt_value() -> impl Strategy<Value = Option<f64>> {
    prop::option::of(1.0..1000.0_f64)
}

fn arb_statement() -> impl Strategy<Value = FinancialStatementRecord> {
    (
        0..3000_i64,
        0..8_i64,
        arb_period_type(),
        (arb_opt_value(), arb_opt_value(), arb_opt_value()),
        (arb_opt_value(), arb_opt_value()),
    )
        .prop_map(|(disclosed, year, period_type, actual, forecast)| {
            let period_end = NaiveDate::from_ymd_opt(2015 + year as i32, 3, 31).unwrap();
            FinancialStatementRecord {
                security: SecurityCode::from("S"),
                disclosure_date: base() + Duration::days(disclosed),
                period_type,
                period_end,
                actual: FinancialFields {
                    profit: actual.0,
                    equity: actual.1,
                    eps: actual.2,
                    ..FinancialFields::default()
                },
                forecast: FinancialFields {
                    profit: forecast.0,
                    eps: forecast.1,
                    ..FinancialFields::default()
                },
                shares_outstanding: Some(1000.0),
                treasury_shares: None,
            }
        })
}

fn event_snapshot(events: &[(i64, f64)]) -> Snapshot {
    let mut b = SnapshotBuilder::new();
    for (offset, factor) in events {
        b.push_price_row(RawPriceRow {
            code: "S".into(),
            date: base() + Duration::days(*offset),
            open: None,
            close: Some(100.0),
            adjusted_close: None,
            adjustment_factor: Some(*factor),
        })
        .unwrap();
    }
    b.build()
}

// ── 1. CAF round trip ────────────────────────────────────────────────

proptest! {
    #[test]
    fn caf_round_trip_is_one(
        events in arb_events(),
        a in -100..3100_i64,
        b in -100..3100_i64,
    ) {
        let snap = event_snapshot(&events);
        let caf = CafEngine::new(&snap);
        let s = SecurityCode::from("S");
        let (da, db) = (base() + Duration::days(a), base() + Duration::days(b));
        let product = caf.cumulative_factor(&s, da, db) * caf.cumulative_factor(&s, db, da);
        prop_assert!((product - 1.0).abs() < 1e-9, "product was {}", product);
    }
}

// ── 2. CAF composition ───────────────────────────────────────────────

proptest! {
    #[test]
    fn caf_composes_over_adjacent_ranges(
        events in arb_events(),
        mut points in prop::collection::vec(-100..3100_i64, 3),
    ) {
        points.sort_unstable();
        let snap = event_snapshot(&events);
        let caf = CafEngine::new(&snap);
        let s = SecurityCode::from("S");
        let d: Vec<NaiveDate> = points.iter().map(|p| base() + Duration::days(*p)).collect();
        let whole = caf.cumulative_factor(&s, d[0], d[2]);
        let parts = caf.cumulative_factor(&s, d[0], d[1]) * caf.cumulative_factor(&s, d[1], d[2]);
        prop_assert!((whole - parts).abs() <= 1e-9 * whole.abs().max(1.0));
    }
}

// ── 3. No look-ahead ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn resolved_records_are_disclosed_by_as_of(
        statements in prop::collection::vec(arb_statement(), 0..25),
        as_of in 0..3200_i64,
    ) {
        let mut b = SnapshotBuilder::new();
        for s in statements {
            b.add_statement(s).unwrap();
        }
        let snap = b.build();
        let resolver = FinancialRecordResolver::new(&snap);
        let e = base() + Duration::days(as_of);

        if let Some(r) = resolver.resolve(&SecurityCode::from("S"), e).into_resolved() {
            prop_assert!(r.fy.record.disclosure_date <= e);
            prop_assert_eq!(r.fy.record.period_type, PeriodType::Fy);
            if let Some(fc) = &r.forecast {
                prop_assert!(fc.disclosure_date <= e);
            }
            for f in &r.fy.imputed {
                let src_date = match f.source {
                    ImputationSource::Forecast { disclosure_date, .. } => disclosure_date,
                    ImputationSource::Quarterly { disclosure_date, .. } => disclosure_date,
                };
                prop_assert!(src_date <= e);
            }
        }
    }
}
