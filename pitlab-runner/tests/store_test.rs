//! Result store under concurrent writers and damaged files.

use std::io::Write;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, NaiveDate};
use pitlab_core::backtest::BacktestPerformanceRecord;
use pitlab_runner::{ResultStore, StoredPerformance};

fn record(rebalance_date: NaiveDate, ret: f64) -> BacktestPerformanceRecord {
    BacktestPerformanceRecord {
        rebalance_date,
        as_of: rebalance_date + Duration::days(365),
        holdings: Vec::new(),
        excluded: Vec::new(),
        covered_weight: 1.0,
        is_partial: false,
        aggregate_return: Some(ret),
        benchmark_return: Some(0.0),
        excess_return: Some(ret),
    }
}

#[test]
fn concurrent_writers_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultStore::new(dir.path().join("results.jsonl")));
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    let date = start + Duration::days(t * 100 + i);
                    store
                        .upsert(StoredPerformance::new(format!("run-{t}"), record(date, 0.01)))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.load_all().unwrap().len(), 40);
    assert_eq!(store.load_run("run-2").unwrap().len(), 10);
}

#[test]
fn malformed_lines_are_skipped_and_kept_on_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.jsonl");
    let store = ResultStore::new(&path);
    let date = NaiveDate::from_ymd_opt(2021, 6, 30).unwrap();
    store
        .upsert(StoredPerformance::new("run", record(date, 0.2)))
        .unwrap();

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "{{not json").unwrap();
        writeln!(f).unwrap();
    }
    assert_eq!(store.load_all().unwrap().len(), 1);

    store
        .upsert(StoredPerformance::new("run", record(date, 0.3)))
        .unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "{not json");
    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record.aggregate_return, Some(0.3));

    // a second rewrite does not duplicate the kept line
    store
        .upsert(StoredPerformance::new("run", record(date, 0.4)))
        .unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().filter(|l| *l == "{not json").count(), 1);
}
