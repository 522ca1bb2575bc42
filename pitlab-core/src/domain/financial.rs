//! Financial statement records.
//!
//! A record is keyed by (security, disclosure date, period type, period end).
//! `period_end` is the end of the fiscal year the statement belongs to, so the
//! quarterly statements of a fiscal year share its `period_end`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::ids::SecurityCode;

/// Reporting period of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    #[serde(rename = "FY")]
    Fy,
    #[serde(rename = "3Q")]
    Q3,
    #[serde(rename = "2Q")]
    Q2,
    #[serde(rename = "1Q")]
    Q1,
}

impl PeriodType {
    pub fn is_quarterly(&self) -> bool {
        !matches!(self, Self::Fy)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fy => "FY",
            Self::Q3 => "3Q",
            Self::Q2 => "2Q",
            Self::Q1 => "1Q",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown period type '{0}' (expected FY, 3Q, 2Q or 1Q)")]
pub struct UnknownPeriodType(pub String);

impl FromStr for PeriodType {
    type Err = UnknownPeriodType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "FY" => Ok(Self::Fy),
            "3Q" => Ok(Self::Q3),
            "2Q" => Ok(Self::Q2),
            "1Q" => Ok(Self::Q1),
            other => Err(UnknownPeriodType(other.to_string())),
        }
    }
}

/// The figures that come in actual/forecast pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    OperatingProfit,
    Profit,
    Equity,
    Eps,
    Bvps,
}

impl FieldName {
    pub const ALL: [FieldName; 5] = [
        FieldName::OperatingProfit,
        FieldName::Profit,
        FieldName::Equity,
        FieldName::Eps,
        FieldName::Bvps,
    ];
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OperatingProfit => "operating_profit",
            Self::Profit => "profit",
            Self::Equity => "equity",
            Self::Eps => "eps",
            Self::Bvps => "bvps",
        };
        f.write_str(name)
    }
}

/// One set of statement figures. Every field may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialFields {
    pub operating_profit: Option<f64>,
    pub profit: Option<f64>,
    pub equity: Option<f64>,
    pub eps: Option<f64>,
    pub bvps: Option<f64>,
}

impl FinancialFields {
    pub fn get(&self, field: FieldName) -> Option<f64> {
        match field {
            FieldName::OperatingProfit => self.operating_profit,
            FieldName::Profit => self.profit,
            FieldName::Equity => self.equity,
            FieldName::Eps => self.eps,
            FieldName::Bvps => self.bvps,
        }
    }

    pub fn set(&mut self, field: FieldName, value: Option<f64>) {
        let slot = match field {
            FieldName::OperatingProfit => &mut self.operating_profit,
            FieldName::Profit => &mut self.profit,
            FieldName::Equity => &mut self.equity,
            FieldName::Eps => &mut self.eps,
            FieldName::Bvps => &mut self.bvps,
        };
        *slot = value;
    }

    pub fn non_null_count(&self) -> usize {
        FieldName::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }
}

/// A disclosed financial statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatementRecord {
    pub security: SecurityCode,
    pub disclosure_date: NaiveDate,
    pub period_type: PeriodType,
    pub period_end: NaiveDate,
    pub actual: FinancialFields,
    pub forecast: FinancialFields,
    pub shares_outstanding: Option<f64>,
    pub treasury_shares: Option<f64>,
}

/// Primary key of a disclosure. Records sharing it are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DisclosureKey {
    pub security: SecurityCode,
    pub disclosure_date: NaiveDate,
    pub period_type: PeriodType,
    pub period_end: NaiveDate,
}

impl FinancialStatementRecord {
    pub fn key(&self) -> DisclosureKey {
        DisclosureKey {
            security: self.security.clone(),
            disclosure_date: self.disclosure_date,
            period_type: self.period_type,
            period_end: self.period_end,
        }
    }

    /// Visible to a query answered at `as_of`.
    pub fn is_disclosed_by(&self, as_of: NaiveDate) -> bool {
        self.disclosure_date <= as_of
    }

    /// Carries a usable forecast (forecast profit or forecast EPS).
    pub fn has_forecast(&self) -> bool {
        self.forecast.profit.is_some() || self.forecast.eps.is_some()
    }

    /// Shares outstanding net of treasury stock, on the basis at `period_end`.
    /// Missing treasury counts as zero.
    pub fn net_shares(&self) -> Option<f64> {
        self.shares_outstanding
            .map(|shares| shares - self.treasury_shares.unwrap_or(0.0))
    }

    /// Number of non-null scalar fields (actual + forecast + share counts).
    pub fn non_null_count(&self) -> usize {
        self.actual.non_null_count()
            + self.forecast.non_null_count()
            + usize::from(self.shares_outstanding.is_some())
            + usize::from(self.treasury_shares.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_type_parses_exchange_labels() {
        assert_eq!("FY".parse::<PeriodType>().unwrap(), PeriodType::Fy);
        assert_eq!("3Q".parse::<PeriodType>().unwrap(), PeriodType::Q3);
        assert_eq!(" 1Q ".parse::<PeriodType>().unwrap(), PeriodType::Q1);
        assert!("4Q".parse::<PeriodType>().is_err());
        assert!("fy".parse::<PeriodType>().is_err());
    }

    #[test]
    fn period_type_serde_uses_labels() {
        let json = serde_json::to_string(&PeriodType::Q2).unwrap();
        assert_eq!(json, "\"2Q\"");
    }

    #[test]
    fn fields_get_and_set() {
        let mut f = FinancialFields::default();
        assert_eq!(f.non_null_count(), 0);
        f.set(FieldName::Equity, Some(1000.0));
        assert_eq!(f.get(FieldName::Equity), Some(1000.0));
        assert_eq!(f.non_null_count(), 1);
    }

    #[test]
    fn net_shares_treats_missing_treasury_as_zero() {
        let rec = FinancialStatementRecord {
            security: SecurityCode::from("13010"),
            disclosure_date: NaiveDate::from_ymd_opt(2023, 5, 10).unwrap(),
            period_type: PeriodType::Fy,
            period_end: NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
            actual: FinancialFields::default(),
            forecast: FinancialFields::default(),
            shares_outstanding: Some(1_000.0),
            treasury_shares: None,
        };
        assert_eq!(rec.net_shares(), Some(1_000.0));
    }
}
