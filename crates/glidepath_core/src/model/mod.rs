mod allocation;
mod ids;
mod parameters;
mod results;

pub use allocation::{PortfolioAllocation, WEIGHT_SUM_TOLERANCE};
pub use ids::{AssetClassId, AssetSleeve};
pub use parameters::{
    MAX_CONTRIBUTION_GROWTH, MAX_PATHS, MAX_WITHDRAWAL_RATE, MAX_YEARS, MIN_CONTRIBUTION_GROWTH,
    MIN_WITHDRAWAL_RATE, SimulationParameters,
};
pub use results::{BackendKind, PathResults, RunSummary, SampledPath};
