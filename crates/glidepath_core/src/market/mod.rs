//! Capital market assumptions
//!
//! Asset-class returns, volatilities and correlations, the inflation process,
//! and regime shifts. Snapshots are immutable; every change produces a new one.

mod assumptions;
mod defaults;
pub mod inflation;
pub mod linalg;
mod regime;

pub use assumptions::{
    AssetClassAssumption, AssetSpec, AssumptionSet, CapitalMarketAssumptions, PortfolioStats,
};
pub use defaults::{DEFAULT_ASSUMPTIONS_VERSION, DEFAULT_RISK_FREE_RATE, default_set};
pub use inflation::{InflationParameters, MIN_INFLATION_RATE};
pub use linalg::EIGENVALUE_FLOOR;
pub use regime::{MarketRegime, RegimeMultipliers};
