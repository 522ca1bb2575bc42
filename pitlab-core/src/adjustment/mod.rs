//! Corporate-action adjustment: factor store and cumulative factors

pub mod caf;
pub mod store;

pub use caf::{rebase_anchor, rebase_per_share, rebase_share_count, CafEngine};
pub use store::AdjustmentFactorStore;
