//! Trade-off analysis
//!
//! Each scenario is applied to the baseline plan, simulated, analyzed and
//! compared against the baseline run. Scenarios are independent engine
//! invocations with the baseline's seed, so running them concurrently gives
//! the same results as running them in order.

mod scenario;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::{self, Comparison, ComprehensiveResults};
use crate::config::{AnalysisConfig, TradeOffConfig};
use crate::engine::{CancellationToken, SimulationEngine};
use crate::error::{LookupError, PlanningError};
use crate::model::{PortfolioAllocation, SimulationParameters};
use crate::portfolio::PortfolioMapper;

pub use scenario::{
    ImpactTag, ParameterDelta, PlanBaseline, TradeOffScenario, catalog, difficulty, scenario,
};

/// Result of one scenario against the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub description: String,
    pub expected_impact: ImpactTag,
    pub implementation_difficulty: u8,
    pub allocation: PortfolioAllocation,
    pub params: SimulationParameters,
    pub success_probability: f64,
    pub median_retirement_balance: f64,
    /// Volatility of annualized accumulation returns
    pub volatility: f64,
    /// In percentage points
    pub success_rate_delta: f64,
    pub median_balance_delta_pct: f64,
    pub net_benefit_score: f64,
    pub comparison: Comparison,
    pub pareto_optimal: bool,
    /// 1-based position by net benefit
    pub rank: usize,
}

/// All scenarios of one analysis, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffReport {
    pub baseline_success_probability: f64,
    pub baseline_median_balance: f64,
    pub scenarios: Vec<ScenarioOutcome>,
    /// Scenarios not dominated in (success probability, volatility)
    pub pareto_optimal: Vec<String>,
}

impl TradeOffReport {
    #[must_use]
    pub fn best(&self) -> Option<&ScenarioOutcome> {
        self.scenarios.first()
    }
}

/// Weighted benefit of a scenario: success and median gains less a
/// difficulty penalty
#[must_use]
pub fn net_benefit(
    config: &TradeOffConfig,
    success_rate_delta: f64,
    median_balance_delta_pct: f64,
    difficulty: u8,
) -> f64 {
    config.success_weight * success_rate_delta + config.median_weight * median_balance_delta_pct
        - config.difficulty_weight * f64::from(difficulty)
}

/// Indices of points not dominated when maximizing the first coordinate and
/// minimizing the second
#[must_use]
pub fn pareto_front(points: &[(f64, f64)]) -> Vec<usize> {
    (0..points.len())
        .filter(|&i| {
            let (success, vol) = points[i];
            !points.iter().enumerate().any(|(j, &(s, v))| {
                j != i && s >= success && v <= vol && (s > success || v < vol)
            })
        })
        .collect()
}

/// Runs scenarios against a baseline with a shared engine
#[derive(Debug, Clone)]
pub struct TradeOffAnalyzer {
    engine: SimulationEngine,
    mapper: PortfolioMapper,
    analysis: AnalysisConfig,
    config: TradeOffConfig,
}

impl TradeOffAnalyzer {
    #[must_use]
    pub fn new(
        engine: SimulationEngine,
        mapper: PortfolioMapper,
        analysis: AnalysisConfig,
        config: TradeOffConfig,
    ) -> Self {
        Self {
            engine,
            mapper,
            analysis,
            config,
        }
    }

    /// Resolve scenario names, falling back to the configured defaults when
    /// `names` is empty
    pub fn resolve(&self, names: &[String]) -> Result<Vec<TradeOffScenario>, LookupError> {
        let names = if names.is_empty() {
            &self.config.default_scenarios
        } else {
            names
        };
        names.iter().map(|n| scenario(n)).collect()
    }

    fn run_scenario(
        &self,
        scenario: &TradeOffScenario,
        baseline: &PlanBaseline,
        baseline_results: &ComprehensiveResults,
        target_value: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<ScenarioOutcome, PlanningError> {
        let span = tracing::info_span!("tradeoff_scenario", scenario = %scenario.name);
        let _guard = span.enter();

        let plan = scenario.apply(baseline, &self.mapper)?;
        let paths = self
            .engine
            .run_with_cancel(&plan.allocation, &plan.params, &cancel.child())
            .map_err(|e| PlanningError::engine(e, format!("trade-off scenario {}", scenario.name)))?;
        let results = analysis::analyze(&paths, target_value, &self.analysis)?;
        let comparison = analysis::compare(baseline_results, &results)?;

        let success_rate_delta = comparison.success_rate_delta;
        let median_balance_delta_pct = comparison.median_improvement_pct;
        let net_benefit_score = net_benefit(
            &self.config,
            success_rate_delta,
            median_balance_delta_pct,
            scenario.difficulty,
        );
        tracing::debug!(
            success = results.success_probability(),
            success_rate_delta,
            net_benefit_score,
            "scenario analyzed"
        );

        Ok(ScenarioOutcome {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            expected_impact: scenario.expected_impact,
            implementation_difficulty: scenario.difficulty,
            allocation: plan.allocation,
            params: plan.params,
            success_probability: results.success_probability(),
            median_retirement_balance: results.median_retirement_balance(),
            volatility: results.risk.volatility,
            success_rate_delta,
            median_balance_delta_pct,
            net_benefit_score,
            comparison,
            pareto_optimal: false,
            rank: 0,
        })
    }

    /// Run every scenario against `baseline`, rank by net benefit and mark
    /// the Pareto set
    pub fn analyze(
        &self,
        baseline: &PlanBaseline,
        baseline_results: &ComprehensiveResults,
        scenarios: &[TradeOffScenario],
        target_value: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<TradeOffReport, PlanningError> {
        let run = |s: &TradeOffScenario| {
            self.run_scenario(s, baseline, baseline_results, target_value, cancel)
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<ScenarioOutcome> = if self.config.parallel {
            scenarios.par_iter().map(run).collect::<Result<_, _>>()?
        } else {
            scenarios.iter().map(run).collect::<Result<_, _>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<ScenarioOutcome> = scenarios.iter().map(run).collect::<Result<_, _>>()?;

        let mut outcomes = outcomes;
        let points: Vec<(f64, f64)> = outcomes
            .iter()
            .map(|o| (o.success_probability, o.volatility))
            .collect();
        for i in pareto_front(&points) {
            outcomes[i].pareto_optimal = true;
        }

        outcomes.sort_by(|a, b| b.net_benefit_score.total_cmp(&a.net_benefit_score));
        for (i, outcome) in outcomes.iter_mut().enumerate() {
            outcome.rank = i + 1;
        }
        let pareto_optimal = outcomes
            .iter()
            .filter(|o| o.pareto_optimal)
            .map(|o| o.name.clone())
            .collect();

        Ok(TradeOffReport {
            baseline_success_probability: baseline_results.success_probability(),
            baseline_median_balance: baseline_results.median_retirement_balance(),
            scenarios: outcomes,
            pareto_optimal,
        })
    }
}
