//! Runtime configuration
//!
//! Every field has a default, so a partial YAML or JSON document (or none at
//! all) yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::engine::{BackendPreference, WeightDrift};
use crate::error::ValidationError;

/// Top-level configuration for a planner instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlidepathConfig {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
    pub tradeoff: TradeOffConfig,
}

impl GlidepathConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.engine.validate()?;
        self.analysis.validate()?;
        self.tradeoff.validate()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Request {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendPreference,
    /// Worker threads for the CPU backend; all available cores when unset
    pub cpu_workers: Option<usize>,
    pub gpu_streams: usize,
    /// Months advanced per kernel launch
    pub gpu_batch_months: usize,
    pub gpu_memory_bytes: usize,
    /// Paths whose full monthly trace is kept for diagnostics
    pub sample_paths: usize,
    pub weight_drift: WeightDrift,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            cpu_workers: None,
            gpu_streams: 4,
            gpu_batch_months: 12,
            gpu_memory_bytes: 256 * 1024 * 1024,
            sample_paths: 100,
            weight_drift: WeightDrift::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cpu_workers == Some(0) {
            return Err(invalid("engine.cpu_workers", "must be at least 1"));
        }
        if self.gpu_streams == 0 {
            return Err(invalid("engine.gpu_streams", "must be at least 1"));
        }
        if self.gpu_batch_months == 0 {
            return Err(invalid("engine.gpu_batch_months", "must be at least 1"));
        }
        Ok(())
    }

    /// Resolved CPU worker count
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.cpu_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Annual rate Sharpe and Sortino ratios are measured against
    pub risk_free_rate: f64,
    /// Success probability a withdrawal rate must clear to be called optimal
    pub success_threshold: f64,
    pub candidate_withdrawal_rates: Vec<f64>,
    pub wealth_thresholds: Vec<f64>,
    pub confidence_level: f64,
    /// Annual growth assumed when extrapolating the median toward a threshold
    pub goal_growth_rate: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
            success_threshold: 0.90,
            candidate_withdrawal_rates: vec![0.03, 0.035, 0.04, 0.045, 0.05, 0.055, 0.06],
            wealth_thresholds: vec![500_000.0, 1_000_000.0, 2_000_000.0, 5_000_000.0],
            confidence_level: 0.95,
            goal_growth_rate: 0.05,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.success_threshold > 0.0 && self.success_threshold < 1.0) {
            return Err(invalid("analysis.success_threshold", "must be in (0, 1)"));
        }
        if !(0.5..1.0).contains(&self.confidence_level) {
            return Err(invalid("analysis.confidence_level", "must be in [0.5, 1)"));
        }
        if self.goal_growth_rate <= 0.0 {
            return Err(invalid("analysis.goal_growth_rate", "must be positive"));
        }
        if self
            .candidate_withdrawal_rates
            .iter()
            .any(|r| !(0.0..=1.0).contains(r))
        {
            return Err(invalid(
                "analysis.candidate_withdrawal_rates",
                "rates must be in [0, 1]",
            ));
        }
        if self.wealth_thresholds.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(invalid("analysis.wealth_thresholds", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeOffConfig {
    /// Weight of the success-rate change, in percentage points
    pub success_weight: f64,
    /// Weight of the median-balance change, in percent
    pub median_weight: f64,
    /// Penalty per point of implementation difficulty
    pub difficulty_weight: f64,
    /// Scenario names run when a request does not list its own
    pub default_scenarios: Vec<String>,
    /// Run scenarios concurrently
    pub parallel: bool,
}

impl Default for TradeOffConfig {
    fn default() -> Self {
        Self {
            success_weight: 1.0,
            median_weight: 0.1,
            difficulty_weight: 0.5,
            default_scenarios: [
                "save_3pct_more",
                "work_2_years_longer",
                "spend_10pct_less",
                "more_aggressive",
                "more_conservative",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            parallel: false,
        }
    }
}

impl TradeOffConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let weights = [self.success_weight, self.median_weight, self.difficulty_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("tradeoff weights", "must be finite and non-negative"));
        }
        Ok(())
    }
}
