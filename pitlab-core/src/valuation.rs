//! Valuation metrics: market cap, PER, PBR and forward PER at a date.
//!
//! Statement figures are moved onto the share basis at the query date `E`
//! before they meet the price at `E`:
//!
//! - `caf_fy = caf(min(fy.period_end, E), E)`, `caf_fc` likewise for the
//!   forecast record
//! - `shares_now = (shares_outstanding - treasury) / caf_fy`
//! - `market_cap = close(E) * shares_now`
//! - `eps_now = eps * caf_fy`, `bvps_now = bvps * caf_fy`,
//!   `forecast_eps_now = forecast_eps * caf_fc`
//!
//! Ratios with a missing, non-finite or non-positive denominator are `None`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::adjustment::{rebase_anchor, rebase_per_share, rebase_share_count, CafEngine};
use crate::data::Snapshot;
use crate::domain::{FinancialStatementRecord, SecurityCode};
use crate::resolver::{FinancialRecordResolver, ImputedField, ImputedRecord, RecordField, Resolution};

/// `numerator / denominator`, or `None` when the denominator is missing,
/// non-finite or `<= 0`, or the result is not finite.
pub fn safe_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if !d.is_finite() || d <= 0.0 || !n.is_finite() {
        return None;
    }
    let r = n / d;
    r.is_finite().then_some(r)
}

/// Everything the ratios are computed from, for one (security, date).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValuationInput {
    pub security: SecurityCode,
    pub as_of: NaiveDate,
    pub fy: ImputedRecord,
    pub forecast: Option<FinancialStatementRecord>,
    pub caf_fy: f64,
    pub caf_fc: Option<f64>,
    /// Latest close on or before `as_of`, with its date.
    pub price: Option<(NaiveDate, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Covered,
    /// No FY statement disclosed by the date.
    NoCoverage,
    /// Statements exist but no close on or before the date.
    NoPrice,
}

/// Flat valuation result for one security at one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub security: SecurityCode,
    pub as_of: NaiveDate,
    pub coverage: Coverage,
    pub price: Option<f64>,
    pub price_date: Option<NaiveDate>,
    pub fy_period_end: Option<NaiveDate>,
    pub fy_disclosure_date: Option<NaiveDate>,
    pub forecast_disclosure_date: Option<NaiveDate>,
    pub caf_fy: Option<f64>,
    pub caf_fc: Option<f64>,
    pub shares_now: Option<f64>,
    pub market_cap: Option<f64>,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub forward_per: Option<f64>,
    pub eps_now: Option<f64>,
    pub bvps_now: Option<f64>,
    pub forecast_eps_now: Option<f64>,
    pub imputed: Vec<ImputedField>,
    pub conflicts: Vec<RecordField>,
}

impl ValuationSnapshot {
    fn empty(security: SecurityCode, as_of: NaiveDate, coverage: Coverage) -> Self {
        Self {
            security,
            as_of,
            coverage,
            price: None,
            price_date: None,
            fy_period_end: None,
            fy_disclosure_date: None,
            forecast_disclosure_date: None,
            caf_fy: None,
            caf_fc: None,
            shares_now: None,
            market_cap: None,
            per: None,
            pbr: None,
            forward_per: None,
            eps_now: None,
            bvps_now: None,
            forecast_eps_now: None,
            imputed: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn is_covered(&self) -> bool {
        self.coverage == Coverage::Covered
    }
}

/// Point-in-time valuation over a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ValuationEngine<'a> {
    snapshot: &'a Snapshot,
    resolver: &'a FinancialRecordResolver,
    caf: CafEngine<'a>,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(snapshot: &'a Snapshot, resolver: &'a FinancialRecordResolver) -> Self {
        Self {
            snapshot,
            resolver,
            caf: CafEngine::new(snapshot),
        }
    }

    pub fn snapshot_data(&self) -> &'a Snapshot {
        self.snapshot
    }

    /// Resolved statements, adjustment factors and price, or `None` when no
    /// FY statement was disclosed by `as_of`.
    pub fn input(&self, security: &SecurityCode, as_of: NaiveDate) -> Option<ResolvedValuationInput> {
        let resolved = match self.resolver.resolve(security, as_of) {
            Resolution::NoCoverage => return None,
            Resolution::Resolved(r) => r,
        };

        let caf_fy = self.caf.cumulative_factor(
            security,
            rebase_anchor(resolved.fy.record.period_end, as_of),
            as_of,
        );
        let caf_fc = resolved.forecast.as_ref().map(|fc| {
            self.caf
                .cumulative_factor(security, rebase_anchor(fc.period_end, as_of), as_of)
        });

        Some(ResolvedValuationInput {
            security: security.clone(),
            as_of,
            fy: resolved.fy,
            forecast: resolved.forecast,
            caf_fy,
            caf_fc,
            price: self.snapshot.latest_close_on_or_before(security, as_of),
        })
    }

    pub fn snapshot(&self, security: &SecurityCode, as_of: NaiveDate) -> ValuationSnapshot {
        match self.input(security, as_of) {
            None => ValuationSnapshot::empty(security.clone(), as_of, Coverage::NoCoverage),
            Some(input) => compute(input),
        }
    }
}

fn compute(input: ResolvedValuationInput) -> ValuationSnapshot {
    let fy = &input.fy.record;
    let coverage = if input.price.is_some() {
        Coverage::Covered
    } else {
        Coverage::NoPrice
    };

    let shares_now = fy
        .net_shares()
        .map(|n| rebase_share_count(n, input.caf_fy));
    let price = input.price.map(|(_, p)| p);
    let market_cap = match (price, shares_now) {
        (Some(p), Some(s)) if (p * s).is_finite() => Some(p * s),
        _ => None,
    };

    let forecast_profit = input.forecast.as_ref().and_then(|fc| fc.forecast.profit);
    let forecast_eps_now = match (&input.forecast, input.caf_fc) {
        (Some(fc), Some(caf)) => fc.forecast.eps.map(|v| rebase_per_share(v, caf)),
        _ => None,
    };

    ValuationSnapshot {
        security: input.security.clone(),
        as_of: input.as_of,
        coverage,
        price,
        price_date: input.price.map(|(d, _)| d),
        fy_period_end: Some(fy.period_end),
        fy_disclosure_date: Some(fy.disclosure_date),
        forecast_disclosure_date: input.forecast.as_ref().map(|fc| fc.disclosure_date),
        caf_fy: Some(input.caf_fy),
        caf_fc: input.caf_fc,
        shares_now,
        market_cap,
        per: safe_ratio(market_cap, fy.actual.profit),
        pbr: safe_ratio(market_cap, fy.actual.equity),
        forward_per: safe_ratio(market_cap, forecast_profit),
        eps_now: fy.actual.eps.map(|v| rebase_per_share(v, input.caf_fy)),
        bvps_now: fy.actual.bvps.map(|v| rebase_per_share(v, input.caf_fy)),
        forecast_eps_now,
        imputed: input.fy.imputed.clone(),
        conflicts: input.fy.conflicts.clone(),
    }
}
