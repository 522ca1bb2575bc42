//! Parquet price table.
//!
//! Columns: `code` (str), `date` (date), `open`, `close`, `adjusted_close`,
//! `adjustment_factor` (nullable f64). Writes are atomic: write to `.tmp`,
//! then rename into place.

use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use super::source::{DataError, RawPriceRow};

const EXPECTED_COLUMNS: [&str; 6] = [
    "code",
    "date",
    "open",
    "close",
    "adjusted_close",
    "adjustment_factor",
];

#[derive(Debug, Clone)]
pub struct ParquetPriceTable {
    path: PathBuf,
}

impl ParquetPriceTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, rows: &[RawPriceRow]) -> Result<(), DataError> {
        if rows.is_empty() {
            return Err(DataError::ValidationError("no price rows to write".into()));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DataError::ParquetError(format!("failed to create dir: {e}")))?;
        }

        let mut df = rows_to_dataframe(rows)?;
        let tmp_path = self.path.with_extension("parquet.tmp");
        let file = fs::File::create(&tmp_path)
            .map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::ParquetError(format!("atomic rename failed: {e}"))
        })
    }

    pub fn read(&self) -> Result<Vec<RawPriceRow>, DataError> {
        let file = fs::File::open(&self.path)
            .map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

        for col_name in &EXPECTED_COLUMNS {
            if df.column(col_name).is_err() {
                return Err(DataError::ValidationError(format!(
                    "missing column '{col_name}'"
                )));
            }
        }

        dataframe_to_rows(&df)
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn rows_to_dataframe(rows: &[RawPriceRow]) -> Result<DataFrame, DataError> {
    let codes: Vec<String> = rows.iter().map(|r| r.code.clone()).collect();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<Option<f64>> = rows.iter().map(|r| r.open).collect();
    let closes: Vec<Option<f64>> = rows.iter().map(|r| r.close).collect();
    let adjusted: Vec<Option<f64>> = rows.iter().map(|r| r.adjusted_close).collect();
    let factors: Vec<Option<f64>> = rows.iter().map(|r| r.adjustment_factor).collect();

    DataFrame::new(vec![
        Column::new("code".into(), codes),
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("close".into(), closes),
        Column::new("adjusted_close".into(), adjusted),
        Column::new("adjustment_factor".into(), factors),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<RawPriceRow>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
    };
    let type_err = |name: &str, e: PolarsError| {
        DataError::ParquetError(format!("{name} column type: {e}"))
    };

    let code_ca = col("code")?.str().map_err(|e| type_err("code", e))?;
    let date_ca = col("date")?.date().map_err(|e| type_err("date", e))?;
    let open_ca = col("open")?.f64().map_err(|e| type_err("open", e))?;
    let close_ca = col("close")?.f64().map_err(|e| type_err("close", e))?;
    let adj_ca = col("adjusted_close")?
        .f64()
        .map_err(|e| type_err("adjusted_close", e))?;
    let factor_ca = col("adjustment_factor")?
        .f64()
        .map_err(|e| type_err("adjustment_factor", e))?;

    let epoch = epoch();
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let code = code_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null code at row {i}")))?;
        let days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        rows.push(RawPriceRow {
            code: code.to_string(),
            date: epoch + chrono::Duration::days(days as i64),
            open: open_ca.get(i),
            close: close_ca.get(i),
            adjusted_close: adj_ca.get(i),
            adjustment_factor: factor_ca.get(i),
        });
    }
    Ok(rows)
}
