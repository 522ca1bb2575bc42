//! File exports from the ingestion collaborator.
//!
//! Three tables with headers matching the `Raw*Row` field names:
//! - prices: `code,date,open,close,adjusted_close,adjustment_factor`
//!   (CSV, or a Parquet table when the path ends in `.parquet`)
//! - statements: `code,disclosed_date,type_of_period,fiscal_year_end,...` (CSV)
//! - index levels: `index,date,open,close` (CSV, optional)
//!
//! Empty CSV cells decode as `None`.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use super::parquet::ParquetPriceTable;
use super::source::{DataError, RawIndexRow, RawPriceRow, RawStatementRow, SnapshotSource};

#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    prices: PathBuf,
    statements: PathBuf,
    index: Option<PathBuf>,
}

impl FileSnapshotSource {
    pub fn new(prices: impl Into<PathBuf>, statements: impl Into<PathBuf>) -> Self {
        Self {
            prices: prices.into(),
            statements: statements.into(),
            index: None,
        }
    }

    pub fn with_index(mut self, index: impl Into<PathBuf>) -> Self {
        self.index = Some(index.into());
        self
    }
}

impl SnapshotSource for FileSnapshotSource {
    fn name(&self) -> &str {
        "files"
    }

    fn price_rows(&self) -> Result<Vec<RawPriceRow>, DataError> {
        if self.prices.extension().and_then(|e| e.to_str()) == Some("parquet") {
            return ParquetPriceTable::new(&self.prices).read();
        }
        read_rows(&self.prices)
    }

    fn statement_rows(&self) -> Result<Vec<RawStatementRow>, DataError> {
        read_rows(&self.statements)
    }

    fn index_rows(&self) -> Result<Vec<RawIndexRow>, DataError> {
        match &self.index {
            Some(path) => read_rows(path),
            None => Ok(Vec::new()),
        }
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DataError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| DataError::Io {
        path: display.clone(),
        source: e,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize().enumerate() {
        let row: T = record.map_err(|e| DataError::Csv {
            path: display.clone(),
            message: format!("row {}: {e}", i + 1),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_prices_with_empty_cells_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let prices = write_file(
            dir.path(),
            "prices.csv",
            "code,date,open,close,adjusted_close,adjustment_factor\n\
             72030,2021-09-28,,10000,2000,1.0\n\
             72030,2021-09-29,2010,2020,2020,0.2\n",
        );
        let statements = write_file(
            dir.path(),
            "statements.csv",
            "code,disclosed_date,type_of_period,fiscal_year_end,operating_profit,profit,equity,eps,bvps,\
forecast_operating_profit,forecast_profit,forecast_equity,forecast_eps,forecast_bvps,shares_outstanding,treasury_shares\n\
             72030,2021-05-12,FY,2021-03-31,2197748,2245261,24288329,803.23,8585.2,,,,,,3262997492,463000000\n",
        );
        let source = FileSnapshotSource::new(prices, statements);

        let rows = source.price_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].open, None);
        assert_eq!(rows[0].close, Some(10000.0));
        assert_eq!(rows[1].adjustment_factor, Some(0.2));

        let stmts = source.statement_rows().unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].type_of_period, "FY");
        assert_eq!(stmts[0].fiscal_year_end, NaiveDate::from_ymd_opt(2021, 3, 31).unwrap());
        assert_eq!(stmts[0].forecast_profit, None);

        assert!(source.index_rows().unwrap().is_empty());
    }

    #[test]
    fn parquet_prices_are_read_through_the_price_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.parquet");
        let row = RawPriceRow {
            code: "13010".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            open: Some(3500.0),
            close: Some(3520.0),
            adjusted_close: Some(3520.0),
            adjustment_factor: None,
        };
        ParquetPriceTable::new(&path).write(&[row.clone()]).unwrap();

        let source = FileSnapshotSource::new(&path, "unused.csv");
        assert_eq!(source.price_rows().unwrap(), vec![row]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = FileSnapshotSource::new("/nonexistent/prices.csv", "/nonexistent/s.csv");
        assert!(matches!(source.price_rows(), Err(DataError::Io { .. })));
    }

    #[test]
    fn malformed_row_reports_row_number() {
        let dir = tempfile::tempdir().unwrap();
        let index = write_file(
            dir.path(),
            "index.csv",
            "index,date,open,close\nTOPIX,2024-01-04,2450.1,2461.3\nTOPIX,not-a-date,1,1\n",
        );
        let source = FileSnapshotSource::new("unused", "unused").with_index(index);
        match source.index_rows() {
            Err(DataError::Csv { message, .. }) => assert!(message.starts_with("row 2")),
            other => panic!("expected CSV error, got {other:?}"),
        }
    }
}
