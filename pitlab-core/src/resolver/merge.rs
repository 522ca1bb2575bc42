//! Duplicate-disclosure merge.
//!
//! Records sharing a [`DisclosureKey`] describe the same disclosure. They are
//! folded into one record: the base is the record with the most non-null
//! actual fields (then most non-null fields overall, then ingestion order),
//! and its null fields are filled from the others in ingestion order. A
//! non-null value is never overwritten and values are never averaged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::domain::{DisclosureKey, FieldName, FinancialFields, FinancialStatementRecord};

/// A scalar slot of a statement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordField {
    Actual(FieldName),
    Forecast(FieldName),
    SharesOutstanding,
    TreasuryShares,
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Actual(name) => write!(f, "{name}"),
            Self::Forecast(name) => write!(f, "forecast_{name}"),
            Self::SharesOutstanding => f.write_str("shares_outstanding"),
            Self::TreasuryShares => f.write_str("treasury_shares"),
        }
    }
}

/// One disclosure after duplicates were folded together.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub record: FinancialStatementRecord,
    /// Fields where two duplicates disagreed; the base value was kept.
    pub conflicts: Vec<RecordField>,
    /// Number of raw records folded into this one.
    pub merged_from: usize,
}

/// Merge every group of duplicates in `records`.
///
/// `records` must keep ingestion order among duplicates. The result is sorted
/// by (period_end, disclosure_date).
pub fn merge_duplicates(records: &[FinancialStatementRecord]) -> Vec<MergedRecord> {
    let mut groups: BTreeMap<DisclosureKey, Vec<&FinancialStatementRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(r.key()).or_default().push(r);
    }

    let mut merged: Vec<MergedRecord> = groups
        .into_iter()
        .map(|(key, group)| {
            let m = merge_group(&group);
            if !m.conflicts.is_empty() {
                let fields: Vec<String> = m.conflicts.iter().map(ToString::to_string).collect();
                warn!(
                    security = %key.security,
                    disclosure_date = %key.disclosure_date,
                    period_type = %key.period_type,
                    period_end = %key.period_end,
                    fields = ?fields,
                    "duplicate disclosures disagree; keeping base values"
                );
            }
            m
        })
        .collect();
    merged.sort_by_key(|m| (m.record.period_end, m.record.disclosure_date));
    merged
}

fn merge_group(group: &[&FinancialStatementRecord]) -> MergedRecord {
    let mut base_idx = 0;
    for (i, r) in group.iter().enumerate().skip(1) {
        let b = group[base_idx];
        let candidate = (r.actual.non_null_count(), r.non_null_count());
        let current = (b.actual.non_null_count(), b.non_null_count());
        // strictly greater: earlier ingestion wins ties
        if candidate > current {
            base_idx = i;
        }
    }

    let mut record = group[base_idx].clone();
    let mut conflicts = Vec::new();
    for (i, other) in group.iter().enumerate() {
        if i == base_idx {
            continue;
        }
        fill_fields(&mut record.actual, &other.actual, RecordField::Actual, &mut conflicts);
        fill_fields(&mut record.forecast, &other.forecast, RecordField::Forecast, &mut conflicts);
        fill_slot(
            &mut record.shares_outstanding,
            other.shares_outstanding,
            RecordField::SharesOutstanding,
            &mut conflicts,
        );
        fill_slot(
            &mut record.treasury_shares,
            other.treasury_shares,
            RecordField::TreasuryShares,
            &mut conflicts,
        );
    }
    conflicts.sort();
    conflicts.dedup();

    MergedRecord {
        record,
        conflicts,
        merged_from: group.len(),
    }
}

fn fill_fields(
    base: &mut FinancialFields,
    other: &FinancialFields,
    tag: fn(FieldName) -> RecordField,
    conflicts: &mut Vec<RecordField>,
) {
    for name in FieldName::ALL {
        let mut slot = base.get(name);
        fill_slot(&mut slot, other.get(name), tag(name), conflicts);
        base.set(name, slot);
    }
}

fn fill_slot(
    slot: &mut Option<f64>,
    other: Option<f64>,
    field: RecordField,
    conflicts: &mut Vec<RecordField>,
) {
    match (*slot, other) {
        (None, Some(v)) => *slot = Some(v),
        (Some(a), Some(b)) if !same_value(a, b) => conflicts.push(field),
        _ => {}
    }
}

fn same_value(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}
