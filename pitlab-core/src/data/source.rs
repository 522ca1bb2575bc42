//! Snapshot source trait, raw ingestion rows and structured error types.
//!
//! The `SnapshotSource` trait abstracts over where the ingested tables live
//! (CSV exports, Parquet price tables) so the snapshot builder can validate
//! rows from any of them at one boundary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::UnknownPeriodType;

/// Daily price row as delivered by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRow {
    pub code: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub adjusted_close: Option<f64>,
    /// Absent means no corporate action (1.0).
    pub adjustment_factor: Option<f64>,
}

/// Financial statement row as delivered by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatementRow {
    pub code: String,
    pub disclosed_date: NaiveDate,
    pub type_of_period: String,
    pub fiscal_year_end: NaiveDate,
    pub operating_profit: Option<f64>,
    pub profit: Option<f64>,
    pub equity: Option<f64>,
    pub eps: Option<f64>,
    pub bvps: Option<f64>,
    pub forecast_operating_profit: Option<f64>,
    pub forecast_profit: Option<f64>,
    pub forecast_equity: Option<f64>,
    pub forecast_eps: Option<f64>,
    pub forecast_bvps: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub treasury_shares: Option<f64>,
}

/// Benchmark index row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIndexRow {
    pub index: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
}

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {message}")]
    Csv { path: String, message: String },

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("invalid row for {code} on {date}: {reason}")]
    InvalidRow {
        code: String,
        date: NaiveDate,
        reason: String,
    },

    #[error(transparent)]
    PeriodType(#[from] UnknownPeriodType),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Where ingested tables come from.
///
/// Implementations only read and decode rows. Validation happens in
/// [`SnapshotBuilder`](super::snapshot::SnapshotBuilder).
pub trait SnapshotSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn price_rows(&self) -> Result<Vec<RawPriceRow>, DataError>;

    fn statement_rows(&self) -> Result<Vec<RawStatementRow>, DataError>;

    fn index_rows(&self) -> Result<Vec<RawIndexRow>, DataError>;
}
