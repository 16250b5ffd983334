//! Integration tests for the glidepath engine and planner
//!
//! Tests are organized by topic:
//! - `engine` - Reproducibility, backend equivalence and cancellation
//! - `properties` - Monotonicity, percentile ordering and the reference plan
//! - `tradeoffs` - Scenario runs against a baseline
//! - `planner` - Request to report, end to end

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::{BackendPreference, SimulationEngine};
use crate::market::CapitalMarketAssumptions;
use crate::model::{AssetClassId, PortfolioAllocation, SimulationParameters};

mod engine;

pub(crate) fn assumptions() -> Arc<CapitalMarketAssumptions> {
    Arc::new(CapitalMarketAssumptions::default_assumptions())
}

pub(crate) fn engine_with(config: EngineConfig) -> SimulationEngine {
    SimulationEngine::new(assumptions(), config).unwrap()
}

pub(crate) fn engine(backend: BackendPreference) -> SimulationEngine {
    engine_with(EngineConfig {
        backend,
        cpu_workers: Some(4),
        ..Default::default()
    })
}

/// 70/30 large-cap and corporate bonds
pub(crate) fn balanced() -> PortfolioAllocation {
    PortfolioAllocation::from_pairs([
        (AssetClassId::US_LARGE_CAP, 0.7),
        (AssetClassId::CORPORATE_BONDS, 0.3),
    ])
    .unwrap()
}

/// 50k saved, 6k a year, 20 years each side of retirement, 4% withdrawals
pub(crate) fn reference_params(n_paths: usize) -> SimulationParameters {
    SimulationParameters {
        n_paths,
        years_accumulation: 20,
        years_retirement: 20,
        initial_value: 50_000.0,
        annual_contribution: 6_000.0,
        contribution_growth_rate: 0.0,
        withdrawal_rate: 0.04,
        rebalance_frequency_months: 12,
        seed: 42,
    }
}
