//! Immutable snapshot arena of the ingested tables.
//!
//! A `Snapshot` is built once per run by `SnapshotBuilder`, which is the only
//! place rows are validated. Afterwards it is shared by reference (it is
//! `Send + Sync`) and never mutated, so every component that reads it sees the
//! same facts for the whole run.
//!
//! Layout:
//! - prices per security, sorted by date, one row per date
//! - adjustment events per security (rows whose factor != 1.0), sorted by date
//! - statements per security, sorted by (period_end, disclosure_date), with
//!   ingestion order kept among equal keys
//! - index levels per index code, sorted by date

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::source::{DataError, RawIndexRow, RawPriceRow, RawStatementRow, SnapshotSource};
use crate::domain::{
    AdjustmentEvent, FinancialFields, FinancialStatementRecord, IndexCode, IndexLevel,
    PeriodType, PriceObservation, SecurityCode, SnapshotHash,
};

#[derive(Debug)]
pub struct Snapshot {
    prices: BTreeMap<SecurityCode, Vec<PriceObservation>>,
    events: BTreeMap<SecurityCode, Vec<AdjustmentEvent>>,
    statements: BTreeMap<SecurityCode, Vec<FinancialStatementRecord>>,
    indices: BTreeMap<IndexCode, Vec<IndexLevel>>,
    hash: SnapshotHash,
}

impl Snapshot {
    /// Read every table from `source` and build a validated snapshot.
    pub fn load(source: &dyn SnapshotSource) -> Result<Self, DataError> {
        let mut builder = SnapshotBuilder::new();
        for row in source.price_rows()? {
            builder.push_price_row(row)?;
        }
        for row in source.statement_rows()? {
            builder.push_statement_row(row)?;
        }
        for row in source.index_rows()? {
            builder.push_index_row(row)?;
        }
        debug!(source = source.name(), "snapshot source read");
        Ok(builder.build())
    }

    pub fn hash(&self) -> &SnapshotHash {
        &self.hash
    }

    /// Every security with prices or statements, in code order.
    pub fn securities(&self) -> Vec<SecurityCode> {
        let mut codes: Vec<SecurityCode> = self
            .prices
            .keys()
            .chain(self.statements.keys())
            .cloned()
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    pub fn prices(&self, security: &SecurityCode) -> &[PriceObservation] {
        self.prices.get(security).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn events(&self, security: &SecurityCode) -> &[AdjustmentEvent] {
        self.events.get(security).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn statements(&self, security: &SecurityCode) -> &[FinancialStatementRecord] {
        self.statements.get(security).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn index_levels(&self, index: &IndexCode) -> &[IndexLevel] {
        self.indices.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The observation recorded for exactly `date`, if any.
    pub fn observation(&self, security: &SecurityCode, date: NaiveDate) -> Option<&PriceObservation> {
        let rows = self.prices(security);
        rows.binary_search_by_key(&date, |o| o.date)
            .ok()
            .map(|i| &rows[i])
    }

    /// Latest close on or before `date`, with the date it was observed.
    pub fn latest_close_on_or_before(
        &self,
        security: &SecurityCode,
        date: NaiveDate,
    ) -> Option<(NaiveDate, f64)> {
        let rows = self.prices(security);
        let end = rows.partition_point(|o| o.date <= date);
        rows[..end]
            .iter()
            .rev()
            .find_map(|o| o.close.map(|c| (o.date, c)))
    }

    /// First observation strictly after `date` that has an open or a close.
    pub fn next_session_after(
        &self,
        security: &SecurityCode,
        date: NaiveDate,
    ) -> Option<&PriceObservation> {
        let rows = self.prices(security);
        let start = rows.partition_point(|o| o.date <= date);
        rows[start..].iter().find(|o| o.entry_price().is_some())
    }

    pub fn latest_index_close_on_or_before(
        &self,
        index: &IndexCode,
        date: NaiveDate,
    ) -> Option<(NaiveDate, f64)> {
        let rows = self.index_levels(index);
        let end = rows.partition_point(|l| l.date <= date);
        rows[..end]
            .iter()
            .rev()
            .find_map(|l| l.close.map(|c| (l.date, c)))
    }

    pub fn next_index_session_after(&self, index: &IndexCode, date: NaiveDate) -> Option<&IndexLevel> {
        let rows = self.index_levels(index);
        let start = rows.partition_point(|l| l.date <= date);
        rows[start..].iter().find(|l| l.entry_level().is_some())
    }
}

/// Validating builder for [`Snapshot`].
///
/// Price and index rows are keyed by date: a later row for the same
/// (security, date) replaces the earlier one.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    prices: BTreeMap<SecurityCode, BTreeMap<NaiveDate, PriceObservation>>,
    statements: BTreeMap<SecurityCode, Vec<FinancialStatementRecord>>,
    indices: BTreeMap<IndexCode, BTreeMap<NaiveDate, IndexLevel>>,
    replaced_prices: usize,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_price_row(&mut self, row: RawPriceRow) -> Result<(), DataError> {
        self.add_observation(PriceObservation {
            security: SecurityCode::new(row.code),
            date: row.date,
            open: row.open,
            close: row.close,
            adjusted_close: row.adjusted_close,
            adjustment_factor: row.adjustment_factor.unwrap_or(1.0),
        })
    }

    pub fn add_observation(&mut self, obs: PriceObservation) -> Result<(), DataError> {
        let invalid = |reason: String| DataError::InvalidRow {
            code: obs.security.to_string(),
            date: obs.date,
            reason,
        };
        if !obs.adjustment_factor.is_finite() || obs.adjustment_factor <= 0.0 {
            return Err(invalid(format!(
                "adjustment factor {} must be finite and > 0",
                obs.adjustment_factor
            )));
        }
        for (label, value) in [
            ("open", obs.open),
            ("close", obs.close),
            ("adjusted close", obs.adjusted_close),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(invalid(format!("{label} {v} must be finite and > 0")));
                }
            }
        }

        let by_date = self.prices.entry(obs.security.clone()).or_default();
        if by_date.insert(obs.date, obs).is_some() {
            self.replaced_prices += 1;
        }
        Ok(())
    }

    pub fn push_statement_row(&mut self, row: RawStatementRow) -> Result<(), DataError> {
        let period_type: PeriodType = row.type_of_period.parse()?;
        self.add_statement(FinancialStatementRecord {
            security: SecurityCode::new(row.code),
            disclosure_date: row.disclosed_date,
            period_type,
            period_end: row.fiscal_year_end,
            actual: FinancialFields {
                operating_profit: row.operating_profit,
                profit: row.profit,
                equity: row.equity,
                eps: row.eps,
                bvps: row.bvps,
            },
            forecast: FinancialFields {
                operating_profit: row.forecast_operating_profit,
                profit: row.forecast_profit,
                equity: row.forecast_equity,
                eps: row.forecast_eps,
                bvps: row.forecast_bvps,
            },
            shares_outstanding: row.shares_outstanding,
            treasury_shares: row.treasury_shares,
        })
    }

    pub fn add_statement(&mut self, record: FinancialStatementRecord) -> Result<(), DataError> {
        let invalid = |reason: String| DataError::InvalidRow {
            code: record.security.to_string(),
            date: record.disclosure_date,
            reason,
        };
        for fields in [&record.actual, &record.forecast] {
            for name in crate::domain::FieldName::ALL {
                if let Some(v) = fields.get(name) {
                    if !v.is_finite() {
                        return Err(invalid(format!("{name} is not finite")));
                    }
                }
            }
        }
        for (label, value) in [
            ("shares outstanding", record.shares_outstanding),
            ("treasury shares", record.treasury_shares),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(format!("{label} {v} must be finite and >= 0")));
                }
            }
        }
        self.statements
            .entry(record.security.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    pub fn push_index_row(&mut self, row: RawIndexRow) -> Result<(), DataError> {
        self.add_index_level(
            IndexCode::new(row.index),
            IndexLevel {
                date: row.date,
                open: row.open,
                close: row.close,
            },
        )
    }

    pub fn add_index_level(&mut self, index: IndexCode, level: IndexLevel) -> Result<(), DataError> {
        for v in [level.open, level.close].into_iter().flatten() {
            if !v.is_finite() || v <= 0.0 {
                return Err(DataError::InvalidRow {
                    code: index.to_string(),
                    date: level.date,
                    reason: format!("index level {v} must be finite and > 0"),
                });
            }
        }
        self.indices.entry(index).or_default().insert(level.date, level);
        Ok(())
    }

    pub fn build(self) -> Snapshot {
        let prices: BTreeMap<SecurityCode, Vec<PriceObservation>> = self
            .prices
            .into_iter()
            .map(|(code, by_date)| (code, by_date.into_values().collect()))
            .collect();

        let events = prices
            .iter()
            .map(|(code, rows)| {
                let evs: Vec<AdjustmentEvent> = rows
                    .iter()
                    .filter(|o| o.is_adjustment_event())
                    .map(|o| AdjustmentEvent {
                        date: o.date,
                        factor: o.adjustment_factor,
                    })
                    .collect();
                (code.clone(), evs)
            })
            .filter(|(_, evs)| !evs.is_empty())
            .collect();

        let mut statements = self.statements;
        for records in statements.values_mut() {
            // stable: duplicates keep ingestion order
            records.sort_by_key(|r| (r.period_end, r.disclosure_date));
        }

        let indices: BTreeMap<IndexCode, Vec<IndexLevel>> = self
            .indices
            .into_iter()
            .map(|(code, by_date)| (code, by_date.into_values().collect()))
            .collect();

        let hash = compute_snapshot_hash(&prices, &statements, &indices);

        let snapshot = Snapshot {
            prices,
            events,
            statements,
            indices,
            hash,
        };
        info!(
            securities = snapshot.securities().len(),
            price_rows = snapshot.prices.values().map(Vec::len).sum::<usize>(),
            statement_rows = snapshot.statements.values().map(Vec::len).sum::<usize>(),
            replaced_price_rows = self.replaced_prices,
            hash = %snapshot.hash,
            "snapshot built"
        );
        snapshot
    }
}

/// Deterministic BLAKE3 hash over all tables.
///
/// BTreeMap iteration gives a fixed security order, so the hash does not
/// depend on ingestion order of prices or index levels.
fn compute_snapshot_hash(
    prices: &BTreeMap<SecurityCode, Vec<PriceObservation>>,
    statements: &BTreeMap<SecurityCode, Vec<FinancialStatementRecord>>,
    indices: &BTreeMap<IndexCode, Vec<IndexLevel>>,
) -> SnapshotHash {
    fn opt(hasher: &mut blake3::Hasher, v: Option<f64>) {
        match v {
            Some(x) => {
                hasher.update(&[1]);
                hasher.update(&x.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }

    let mut hasher = blake3::Hasher::new();
    for (code, rows) in prices {
        hasher.update(b"P");
        hasher.update(code.as_str().as_bytes());
        for o in rows {
            hasher.update(o.date.to_string().as_bytes());
            opt(&mut hasher, o.open);
            opt(&mut hasher, o.close);
            opt(&mut hasher, o.adjusted_close);
            hasher.update(&o.adjustment_factor.to_le_bytes());
        }
    }
    for (code, rows) in statements {
        hasher.update(b"S");
        hasher.update(code.as_str().as_bytes());
        for r in rows {
            hasher.update(r.disclosure_date.to_string().as_bytes());
            hasher.update(r.period_type.label().as_bytes());
            hasher.update(r.period_end.to_string().as_bytes());
            for fields in [&r.actual, &r.forecast] {
                for name in crate::domain::FieldName::ALL {
                    opt(&mut hasher, fields.get(name));
                }
            }
            opt(&mut hasher, r.shares_outstanding);
            opt(&mut hasher, r.treasury_shares);
        }
    }
    for (code, rows) in indices {
        hasher.update(b"I");
        hasher.update(code.0.as_bytes());
        for l in rows {
            hasher.update(l.date.to_string().as_bytes());
            opt(&mut hasher, l.open);
            opt(&mut hasher, l.close);
        }
    }
    SnapshotHash::from_hash(&hasher.finalize().to_hex().to_string())
}
