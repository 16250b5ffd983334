//! Monte Carlo retirement projection library
//!
//! This crate projects a retirement plan over many correlated market paths.
//! It supports:
//! - Capital market assumptions with regime shifts and correlation repair
//! - Risk-tier model portfolios with age adjustment and custom weights
//! - A two-phase (accumulation, retirement) path simulation on a CPU worker
//!   pool or a streamed kernel backend with automatic fallback
//! - Outcome, risk, return, withdrawal-rate and goal metrics with
//!   distribution tests
//! - Trade-off scenarios ranked by net benefit with a Pareto front
//! - A planner that turns one request into a full report
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use glidepath_core::{CapitalMarketAssumptions, GlidepathConfig, PlanningRequest, RetirementPlanner};
//!
//! let planner = RetirementPlanner::new(
//!     Arc::new(CapitalMarketAssumptions::default_assumptions()),
//!     GlidepathConfig::default(),
//! )?;
//! let report = planner.plan(&PlanningRequest {
//!     current_age: 40,
//!     retirement_age: 65,
//!     current_savings: 150_000.0,
//!     annual_contribution: 15_000.0,
//!     ..Default::default()
//! })?;
//! println!("{:.1}%", report.results.success_probability() * 100.0);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod analysis;
pub mod engine;
pub mod error;
pub mod market;
pub mod planner;
pub mod portfolio;
pub mod rng;
pub mod tradeoff;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use analysis::{ComprehensiveResults, analyze, compare};
pub use config::{AnalysisConfig, EngineConfig, GlidepathConfig, TradeOffConfig};
pub use engine::{BackendPreference, CancellationToken, SimulationBackend, SimulationEngine};
pub use error::{PlanningError, Result};
pub use market::{CapitalMarketAssumptions, MarketRegime};
pub use model::{AssetClassId, PathResults, PortfolioAllocation, SimulationParameters};
pub use planner::{PlanningReport, PlanningRequest, RetirementPlanner};
pub use portfolio::{PortfolioMapper, RiskTier};
pub use tradeoff::{TradeOffAnalyzer, TradeOffReport, TradeOffScenario};
