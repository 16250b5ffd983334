//! Retirement planner
//!
//! Ties the pieces together for one request: validation, allocation,
//! baseline simulation, analysis, optional trade-off and stress runs, and
//! the final report.

mod report;
mod request;

use std::sync::Arc;

use jiff::Timestamp;

use crate::analysis::{self, ComprehensiveResults};
use crate::config::GlidepathConfig;
use crate::engine::{CancellationToken, SimulationEngine};
use crate::error::{AllocationViolation, PlanningError, ValidationError};
use crate::market::{CapitalMarketAssumptions, MarketRegime};
use crate::model::{PortfolioAllocation, SimulationParameters};
use crate::portfolio::{PortfolioMapper, blended_expense_ratio, etf_recommendations};
use crate::tradeoff::{PlanBaseline, TradeOffAnalyzer, TradeOffReport};

pub use report::{
    LOW_SUCCESS, MAX_SCENARIO_RECOMMENDATIONS, PlanningReport, Priority, Recommendation,
    RecommendationKind, STRESS_FLOOR, StressTestResult,
};
pub use request::{MAX_AGE, MAX_LIFE_EXPECTANCY, MIN_AGE, PlanningRequest};

/// Regimes a plan is stressed under when stress tests are requested
pub const STRESS_REGIMES: [MarketRegime; 2] = [MarketRegime::Bear, MarketRegime::Crisis];

/// Plans retirements against one assumption snapshot
#[derive(Debug, Clone)]
pub struct RetirementPlanner {
    assumptions: Arc<CapitalMarketAssumptions>,
    engine: SimulationEngine,
    mapper: PortfolioMapper,
    config: GlidepathConfig,
}

impl RetirementPlanner {
    pub fn new(
        assumptions: Arc<CapitalMarketAssumptions>,
        config: GlidepathConfig,
    ) -> Result<Self, PlanningError> {
        config.validate()?;
        let engine = SimulationEngine::new(Arc::clone(&assumptions), config.engine.clone())?;
        Ok(Self::with_engine(engine, config))
    }

    /// Use a prepared engine, e.g. one with a specific device
    #[must_use]
    pub fn with_engine(engine: SimulationEngine, config: GlidepathConfig) -> Self {
        let assumptions = Arc::clone(engine.assumptions());
        Self {
            mapper: PortfolioMapper::new(Arc::clone(&assumptions)),
            assumptions,
            engine,
            config,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    #[must_use]
    pub fn mapper(&self) -> &PortfolioMapper {
        &self.mapper
    }

    pub fn plan(&self, request: &PlanningRequest) -> Result<PlanningReport, PlanningError> {
        self.plan_with_cancel(request, &CancellationToken::new())
    }

    /// Build the allocation a request asks for, with its soft warnings
    pub fn allocation_for(
        &self,
        request: &PlanningRequest,
    ) -> Result<(PortfolioAllocation, Vec<AllocationViolation>), ValidationError> {
        if let Some(weights) = &request.custom_allocation {
            return self.mapper.custom_allocation(weights.clone());
        }
        let allocation = if request.age_adjusted {
            self.mapper
                .age_adjusted_portfolio(request.risk_tolerance, request.current_age)?
        } else {
            self.mapper.model_portfolio(request.risk_tolerance)?
        };
        let warnings = self
            .mapper
            .validate(&allocation)
            .map_err(ValidationError::Allocation)?;
        Ok((allocation, warnings))
    }

    pub fn plan_with_cancel(
        &self,
        request: &PlanningRequest,
        cancel: &CancellationToken,
    ) -> Result<PlanningReport, PlanningError> {
        request.validate()?;
        let (allocation, allocation_warnings) = self.allocation_for(request)?;
        let params = request.simulation_parameters();
        params.validate()?;

        tracing::info!(
            age = request.current_age,
            retirement_age = request.retirement_age,
            tier = %request.risk_tolerance,
            n_paths = params.n_paths,
            seed = params.seed,
            "planning retirement"
        );

        let paths = self
            .engine
            .run_with_cancel(&allocation, &params, cancel)
            .map_err(|e| {
                PlanningError::engine(
                    e,
                    format!("baseline run, n_paths={}, seed={}", params.n_paths, params.seed),
                )
            })?;
        let results = analysis::analyze(&paths, request.target_value, &self.config.analysis)?;

        let tradeoffs = if request.include_tradeoffs {
            Some(self.tradeoffs(request, &allocation, &params, &results, cancel)?)
        } else {
            None
        };

        let stress_tests = if request.include_stress_tests {
            self.stress_tests(&allocation, &params, &results, cancel)?
        } else {
            Vec::new()
        };

        let recommendations = report::recommendations(
            &results,
            &allocation_warnings,
            tradeoffs.as_ref(),
            &stress_tests,
        );
        let portfolio = self.assumptions.portfolio_stats(&allocation)?;
        let etfs = etf_recommendations(&allocation);

        tracing::info!(
            success_probability = results.success_probability(),
            median_retirement_balance = results.median_retirement_balance(),
            recommendations = recommendations.len(),
            "plan complete"
        );

        Ok(PlanningReport {
            generated_at: Timestamp::now(),
            assumptions_version: self.assumptions.version().to_string(),
            regime: self.assumptions.regime(),
            blended_expense_ratio: blended_expense_ratio(&etfs),
            etf_recommendations: etfs,
            allocation,
            allocation_warnings,
            portfolio,
            parameters: params,
            run: paths.summary,
            results,
            tradeoffs,
            stress_tests,
            recommendations,
        })
    }

    fn tradeoffs(
        &self,
        request: &PlanningRequest,
        allocation: &PortfolioAllocation,
        params: &SimulationParameters,
        results: &ComprehensiveResults,
        cancel: &CancellationToken,
    ) -> Result<TradeOffReport, PlanningError> {
        let analyzer = TradeOffAnalyzer::new(
            self.engine.clone(),
            self.mapper.clone(),
            self.config.analysis.clone(),
            self.config.tradeoff.clone(),
        );
        let scenarios = analyzer.resolve(&request.tradeoff_scenarios)?;
        let baseline = PlanBaseline {
            allocation: allocation.clone(),
            params: params.clone(),
            annual_income: request.annual_income,
        };
        analyzer.analyze(&baseline, results, &scenarios, request.target_value, cancel)
    }

    /// Re-run the baseline plan under each stress regime
    pub fn stress_tests(
        &self,
        allocation: &PortfolioAllocation,
        params: &SimulationParameters,
        baseline: &ComprehensiveResults,
        cancel: &CancellationToken,
    ) -> Result<Vec<StressTestResult>, PlanningError> {
        STRESS_REGIMES
            .iter()
            .map(|&regime| {
                let span = tracing::info_span!("stress_test", %regime);
                let _guard = span.enter();

                let shifted = Arc::new(self.assumptions.with_regime(regime)?);
                let paths = self
                    .engine
                    .with_assumptions(shifted)
                    .run_with_cancel(allocation, params, cancel)
                    .map_err(|e| PlanningError::engine(e, format!("stress test, regime={regime}")))?;
                let results = analysis::analyze(&paths, None, &self.config.analysis)?;
                Ok(StressTestResult {
                    regime,
                    success_probability: results.success_probability(),
                    median_retirement_balance: results.median_retirement_balance(),
                    success_rate_delta: (results.success_probability()
                        - baseline.success_probability())
                        * 100.0,
                })
            })
            .collect()
    }
}
