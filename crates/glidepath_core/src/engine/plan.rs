use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, NumericalError};
use crate::market::linalg::cholesky_lower;
use crate::market::{CapitalMarketAssumptions, InflationParameters, MarketRegime, PortfolioStats};
use crate::model::{
    AssetClassId, BackendKind, PathResults, PortfolioAllocation, RunSummary, SampledPath,
    SimulationParameters,
};

use super::stream::RetirementOutcome;

/// Share of the risk-adjusted expected return credited to retirement months
/// beyond the replayed accumulation window
pub const BLENDED_RETURN_HAIRCUT: f64 = 0.8;

/// How asset weights evolve between rebalances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightDrift {
    /// Returns are applied at the target weights every month
    #[default]
    Static,
    /// Weights drift with realized asset returns until the next rebalance
    Tracked,
}

/// Fully resolved, validated inputs of one engine run.
///
/// Built once per run; backends only read it.
#[derive(Debug, Clone)]
pub struct RunPlan {
    params: SimulationParameters,
    assets: Vec<AssetClassId>,
    target_weights: Vec<f64>,
    monthly_means: Vec<f64>,
    /// Row-major lower Cholesky factor of the monthly covariance
    cholesky: Vec<f64>,
    contributions: Vec<f64>,
    inflation: InflationParameters,
    blended_monthly_return: f64,
    portfolio: PortfolioStats,
    drift: WeightDrift,
    sample_paths: usize,
    regime: MarketRegime,
}

impl RunPlan {
    /// Validate parameters and allocation against `assumptions` and
    /// factorize the monthly covariance of the allocated assets
    pub fn build(
        assumptions: &CapitalMarketAssumptions,
        allocation: &PortfolioAllocation,
        params: &SimulationParameters,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        params.validate()?;

        let mut indices = Vec::with_capacity(allocation.len());
        let mut assets = Vec::with_capacity(allocation.len());
        let mut target_weights = Vec::with_capacity(allocation.len());
        for (id, weight) in allocation.iter() {
            indices.push(assumptions.index_of(id)?);
            assets.push(id.clone());
            target_weights.push(weight);
        }

        let k = indices.len();
        let correlation = assumptions.correlation_subset(&indices);
        let l_corr = cholesky_lower(&correlation, "allocation correlation")?;

        let mut monthly_means = Vec::with_capacity(k);
        let mut cholesky = vec![0.0; k * k];
        let month_scale = 12.0_f64.sqrt();
        for (row, &idx) in indices.iter().enumerate() {
            let asset = &assumptions.assets()[idx];
            monthly_means.push(asset.expected_return / 12.0);
            let scale = asset.volatility / month_scale;
            for col in 0..=row {
                cholesky[row * k + col] = l_corr[(row, col)] * scale;
            }
        }
        if cholesky.iter().chain(&monthly_means).any(|v| !v.is_finite()) {
            return Err(NumericalError::NonFinite {
                context: "monthly covariance factor",
            }
            .into());
        }

        let portfolio = assumptions.portfolio_stats(allocation)?;
        let risk_adjusted =
            (portfolio.expected_return - 0.5 * portfolio.volatility.powi(2)).max(0.0);
        let blended_monthly_return = risk_adjusted * BLENDED_RETURN_HAIRCUT / 12.0;

        Ok(Self {
            params: params.clone(),
            assets,
            target_weights,
            monthly_means,
            cholesky,
            contributions: params.contribution_schedule(),
            inflation: *assumptions.inflation(),
            blended_monthly_return,
            portfolio,
            drift: config.weight_drift,
            sample_paths: config.sample_paths.min(params.n_paths),
            regime: assumptions.regime(),
        })
    }

    #[must_use]
    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    #[must_use]
    pub fn n_paths(&self) -> usize {
        self.params.n_paths
    }

    #[must_use]
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn assets(&self) -> &[AssetClassId] {
        &self.assets
    }

    #[must_use]
    pub fn target_weights(&self) -> &[f64] {
        &self.target_weights
    }

    #[must_use]
    pub fn monthly_means(&self) -> &[f64] {
        &self.monthly_means
    }

    #[must_use]
    pub fn cholesky(&self) -> &[f64] {
        &self.cholesky
    }

    #[must_use]
    pub fn contributions(&self) -> &[f64] {
        &self.contributions
    }

    #[must_use]
    pub fn inflation(&self) -> &InflationParameters {
        &self.inflation
    }

    #[must_use]
    pub fn blended_monthly_return(&self) -> f64 {
        self.blended_monthly_return
    }

    #[must_use]
    pub fn portfolio(&self) -> &PortfolioStats {
        &self.portfolio
    }

    #[must_use]
    pub fn drift(&self) -> WeightDrift {
        self.drift
    }

    #[must_use]
    pub fn sample_paths(&self) -> usize {
        self.sample_paths
    }

    #[must_use]
    pub fn regime(&self) -> MarketRegime {
        self.regime
    }

    #[must_use]
    pub fn accumulation_months(&self) -> usize {
        self.params.accumulation_months()
    }

    #[must_use]
    pub fn retirement_months(&self) -> usize {
        self.params.retirement_months()
    }

    #[must_use]
    pub fn total_months(&self) -> usize {
        self.params.total_months()
    }

    #[must_use]
    pub fn summary(&self, backend: BackendKind) -> RunSummary {
        RunSummary {
            initial_value: self.params.initial_value,
            total_contributions: self.contributions.iter().sum(),
            years_accumulation: self.params.years_accumulation,
            years_retirement: self.params.years_retirement,
            withdrawal_rate: self.params.withdrawal_rate,
            inflation_assumption: self.inflation.long_term_target,
            portfolio_expected_return: self.portfolio.expected_return,
            portfolio_volatility: self.portfolio.volatility,
            seed: self.params.seed,
            backend,
            fallback_reason: None,
        }
    }

    /// Package per-path outputs of a finished run
    pub(crate) fn results(
        &self,
        backend: BackendKind,
        retirement_balance: Vec<f64>,
        outcomes: Vec<RetirementOutcome>,
        sampled_paths: Vec<SampledPath>,
    ) -> PathResults {
        let mut final_balance = Vec::with_capacity(outcomes.len());
        let mut depletion_month = Vec::with_capacity(outcomes.len());
        let mut sustainable_rate = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            final_balance.push(outcome.final_balance);
            depletion_month.push(outcome.depletion_month);
            sustainable_rate.push(outcome.sustainable_rate);
        }
        PathResults {
            retirement_balance,
            final_balance,
            depletion_month,
            sustainable_rate,
            sampled_paths,
            summary: self.summary(backend),
        }
    }
}
