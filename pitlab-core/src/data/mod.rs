//! Ingestion boundary and the immutable snapshot arena

pub mod files;
pub mod parquet;
pub mod snapshot;
pub mod source;

pub use files::FileSnapshotSource;
pub use parquet::ParquetPriceTable;
pub use snapshot::{Snapshot, SnapshotBuilder};
pub use source::{DataError, RawIndexRow, RawPriceRow, RawStatementRow, SnapshotSource};
