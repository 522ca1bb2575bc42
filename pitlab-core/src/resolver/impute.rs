//! Cross-source imputation of null actual fields on a chosen FY record.
//!
//! For each null actual field, in order:
//! 1. the same field's forecast value from another visible annual record of
//!    the same fiscal year (latest disclosure first);
//! 2. the latest quarterly record of the same fiscal year disclosed strictly
//!    before the FY record, using its actual value, else its forecast value.
//!
//! Callers pass only records already visible at the query date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::merge::{MergedRecord, RecordField};
use crate::domain::{FieldName, FinancialStatementRecord, PeriodType};

/// Where an imputed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImputationSource {
    /// Forecast value of the same field on another annual record of the
    /// fiscal year.
    Forecast {
        disclosure_date: NaiveDate,
        period_type: PeriodType,
    },
    /// Figure from an earlier quarterly statement of the fiscal year.
    Quarterly {
        disclosure_date: NaiveDate,
        period_type: PeriodType,
        from_forecast: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImputedField {
    pub field: FieldName,
    pub value: f64,
    pub source: ImputationSource,
}

/// FY record with its null actual fields filled where possible.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputedRecord {
    pub record: FinancialStatementRecord,
    pub imputed: Vec<ImputedField>,
    /// Duplicate conflicts carried over from the merge.
    pub conflicts: Vec<RecordField>,
}

impl ImputedRecord {
    pub fn was_imputed(&self, field: FieldName) -> bool {
        self.imputed.iter().any(|f| f.field == field)
    }
}

pub(crate) fn impute(fy: &MergedRecord, visible: &[&MergedRecord]) -> ImputedRecord {
    let base = &fy.record;

    // same fiscal year, not the FY record itself, newest disclosure first
    let mut siblings: Vec<&FinancialStatementRecord> = visible
        .iter()
        .map(|m| &m.record)
        .filter(|r| r.period_end == base.period_end && r.key() != base.key())
        .collect();
    siblings.sort_by(|a, b| b.disclosure_date.cmp(&a.disclosure_date));

    let earlier_quarterly = siblings
        .iter()
        .find(|r| r.period_type.is_quarterly() && r.disclosure_date < base.disclosure_date)
        .copied();

    let mut record = base.clone();
    let mut imputed = Vec::new();

    for field in FieldName::ALL {
        if record.actual.get(field).is_some() {
            continue;
        }

        let forecast_hit = siblings
            .iter()
            .filter(|r| !r.period_type.is_quarterly())
            .find_map(|r| {
                r.forecast.get(field).map(|v| {
                    (
                        v,
                        ImputationSource::Forecast {
                            disclosure_date: r.disclosure_date,
                            period_type: r.period_type,
                        },
                    )
                })
            });

        let from_quarterly = || {
            let q = earlier_quarterly?;
            let (v, from_forecast) = match q.actual.get(field) {
                Some(v) => (v, false),
                None => (q.forecast.get(field)?, true),
            };
            Some((
                v,
                ImputationSource::Quarterly {
                    disclosure_date: q.disclosure_date,
                    period_type: q.period_type,
                    from_forecast,
                },
            ))
        };

        if let Some((value, source)) = forecast_hit.or_else(from_quarterly) {
            record.actual.set(field, Some(value));
            imputed.push(ImputedField {
                field,
                value,
                source,
            });
        }
    }

    if !imputed.is_empty() {
        debug!(
            security = %record.security,
            period_end = %record.period_end,
            fields = imputed.len(),
            "imputed null FY fields"
        );
    }

    ImputedRecord {
        record,
        imputed,
        conflicts: fy.conflicts.clone(),
    }
}
