//! PitLab Core — point-in-time fundamentals, adjustment factors, valuation and
//! split-consistent backtest returns.
//!
//! This crate contains the engine:
//! - Domain types (prices, statements, portfolios)
//! - Ingestion boundary and the immutable `Snapshot` arena
//! - Adjustment factor store and the cumulative adjustment factor engine
//! - Financial record resolver with duplicate merge and imputation
//! - Valuation metrics (market cap, PER, PBR, forward PER)
//! - Backtest returns against a benchmark index

pub mod adjustment;
pub mod backtest;
pub mod calendar;
pub mod data;
pub mod domain;
pub mod resolver;
pub mod valuation;
