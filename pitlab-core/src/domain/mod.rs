//! Domain types for point-in-time valuation

pub mod financial;
pub mod ids;
pub mod portfolio;
pub mod price;

pub use financial::{
    DisclosureKey, FieldName, FinancialFields, FinancialStatementRecord, PeriodType,
    UnknownPeriodType,
};
pub use ids::{IndexCode, SecurityCode, SnapshotHash};
pub use portfolio::{PortfolioError, PortfolioHolding, PortfolioSnapshot, WEIGHT_TOLERANCE};
pub use price::{AdjustmentEvent, IndexLevel, PriceObservation};
