//! Financial record resolver.
//!
//! Answers "which statement figures were known about this security at date E":
//! the latest FY record disclosed by E (with null actual fields imputed from
//! the same fiscal year's other disclosures) and the latest disclosure by E
//! that carries a forecast.
//!
//! Duplicates are merged once in [`FinancialRecordResolver::new`]. Every query
//! then scans only records passing [`FinancialRecordResolver::visible`], the
//! single `disclosure_date <= as_of` filter.

pub mod impute;
pub mod merge;

pub use impute::{ImputationSource, ImputedField, ImputedRecord};
pub use merge::{merge_duplicates, MergedRecord, RecordField};

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::data::Snapshot;
use crate::domain::{FinancialStatementRecord, PeriodType, SecurityCode};

/// Figures known about one security at one date.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFinancials {
    pub fy: ImputedRecord,
    /// Most recent disclosure carrying forecast profit or forecast EPS.
    pub forecast: Option<FinancialStatementRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No FY statement disclosed by the query date.
    NoCoverage,
    Resolved(ResolvedFinancials),
}

impl Resolution {
    pub fn resolved(&self) -> Option<&ResolvedFinancials> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::NoCoverage => None,
        }
    }

    pub fn into_resolved(self) -> Option<ResolvedFinancials> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::NoCoverage => None,
        }
    }
}

/// Point-in-time statement lookups over a snapshot.
#[derive(Debug)]
pub struct FinancialRecordResolver {
    records: BTreeMap<SecurityCode, Vec<MergedRecord>>,
}

impl FinancialRecordResolver {
    pub fn new(snapshot: &Snapshot) -> Self {
        let mut records = BTreeMap::new();
        let mut duplicates = 0usize;
        let mut conflicted = 0usize;
        for security in snapshot.securities() {
            let merged = merge_duplicates(snapshot.statements(&security));
            if merged.is_empty() {
                continue;
            }
            duplicates += merged.iter().map(|m| m.merged_from - 1).sum::<usize>();
            conflicted += merged.iter().filter(|m| !m.conflicts.is_empty()).count();
            records.insert(security, merged);
        }
        debug!(
            securities = records.len(),
            duplicates, conflicted, "statement records merged"
        );
        Self { records }
    }

    /// Merged records of `security` disclosed on or before `as_of`.
    pub fn visible<'a>(
        &'a self,
        security: &SecurityCode,
        as_of: NaiveDate,
    ) -> impl Iterator<Item = &'a MergedRecord> + 'a {
        self.records
            .get(security)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter(move |m| m.record.is_disclosed_by(as_of))
    }

    pub fn resolve(&self, security: &SecurityCode, as_of: NaiveDate) -> Resolution {
        let visible: Vec<&MergedRecord> = self.visible(security, as_of).collect();

        let fy = visible
            .iter()
            .filter(|m| m.record.period_type == PeriodType::Fy)
            .max_by_key(|m| (m.record.period_end, m.record.disclosure_date));
        let Some(fy) = fy else {
            return Resolution::NoCoverage;
        };

        let forecast = visible
            .iter()
            .filter(|m| m.record.has_forecast())
            .max_by_key(|m| (m.record.disclosure_date, m.record.period_end))
            .map(|m| m.record.clone());

        Resolution::Resolved(ResolvedFinancials {
            fy: impute::impute(fy, &visible),
            forecast,
        })
    }
}
