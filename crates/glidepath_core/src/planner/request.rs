use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{AssetClassId, MAX_PATHS, SimulationParameters};
use crate::portfolio::RiskTier;

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 100;
pub const MAX_LIFE_EXPECTANCY: u32 = 120;

fn default_life_expectancy() -> u32 {
    95
}

fn default_withdrawal_rate() -> f64 {
    0.04
}

fn default_n_paths() -> usize {
    10_000
}

fn default_seed() -> u64 {
    42
}

fn default_rebalance() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

/// Inbound planning request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningRequest {
    pub current_age: u32,
    pub retirement_age: u32,
    #[serde(default = "default_life_expectancy")]
    pub life_expectancy: u32,
    #[serde(default)]
    pub annual_income: f64,
    #[serde(default)]
    pub current_savings: f64,
    #[serde(default)]
    pub annual_contribution: f64,
    #[serde(default)]
    pub contribution_growth_rate: f64,
    #[serde(default = "default_withdrawal_rate")]
    pub withdrawal_rate: f64,
    pub risk_tolerance: RiskTier,
    /// Replaces the risk-tier model portfolio when present
    #[serde(default)]
    pub custom_allocation: Option<BTreeMap<AssetClassId, f64>>,
    /// Age-adjust the model portfolio
    #[serde(default = "default_true")]
    pub age_adjusted: bool,
    /// Desired balance at retirement
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default = "default_n_paths")]
    pub n_paths: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_rebalance")]
    pub rebalance_frequency_months: u32,
    #[serde(default)]
    pub include_tradeoffs: bool,
    /// Scenario names; the configured defaults when empty
    #[serde(default)]
    pub tradeoff_scenarios: Vec<String>,
    #[serde(default)]
    pub include_stress_tests: bool,
}

impl Default for PlanningRequest {
    fn default() -> Self {
        Self {
            current_age: 35,
            retirement_age: 65,
            life_expectancy: default_life_expectancy(),
            annual_income: 0.0,
            current_savings: 0.0,
            annual_contribution: 0.0,
            contribution_growth_rate: 0.0,
            withdrawal_rate: default_withdrawal_rate(),
            risk_tolerance: RiskTier::Moderate,
            custom_allocation: None,
            age_adjusted: true,
            target_value: None,
            n_paths: default_n_paths(),
            seed: default_seed(),
            rebalance_frequency_months: default_rebalance(),
            include_tradeoffs: false,
            tradeoff_scenarios: Vec::new(),
            include_stress_tests: false,
        }
    }
}

fn reject(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Request {
        field,
        reason: reason.into(),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(reject(field, format!("must be a non-negative amount, got {value}")))
    }
}

impl PlanningRequest {
    /// Check the request fields that parameter validation cannot see.
    ///
    /// Range checks on the derived simulation parameters run afterwards in
    /// [`SimulationParameters::validate`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_AGE..=MAX_AGE).contains(&self.current_age) {
            return Err(reject(
                "current_age",
                format!("must be between {MIN_AGE} and {MAX_AGE}, got {}", self.current_age),
            ));
        }
        if self.retirement_age <= self.current_age || self.retirement_age > MAX_AGE {
            return Err(reject(
                "retirement_age",
                format!(
                    "must be after the current age ({}) and at most {MAX_AGE}, got {}",
                    self.current_age, self.retirement_age
                ),
            ));
        }
        if self.life_expectancy <= self.retirement_age
            || self.life_expectancy > MAX_LIFE_EXPECTANCY
        {
            return Err(reject(
                "life_expectancy",
                format!(
                    "must be after the retirement age ({}) and at most {MAX_LIFE_EXPECTANCY}, got {}",
                    self.retirement_age, self.life_expectancy
                ),
            ));
        }

        non_negative("annual_income", self.annual_income)?;
        non_negative("current_savings", self.current_savings)?;
        non_negative("annual_contribution", self.annual_contribution)?;
        if self.annual_income > 0.0 && self.annual_contribution > self.annual_income {
            return Err(reject(
                "annual_contribution",
                "cannot exceed annual income",
            ));
        }
        if self.current_savings + self.annual_contribution <= 0.0 {
            return Err(reject(
                "current_savings",
                "savings and contributions are both zero; nothing to project",
            ));
        }
        if self
            .target_value
            .is_some_and(|t| !(t.is_finite() && t > 0.0))
        {
            return Err(reject("target_value", "must be positive"));
        }
        if self.n_paths == 0 || self.n_paths > MAX_PATHS {
            return Err(reject(
                "n_paths",
                format!("must be between 1 and {MAX_PATHS}, got {}", self.n_paths),
            ));
        }
        if self.custom_allocation.as_ref().is_some_and(BTreeMap::is_empty) {
            return Err(reject("custom_allocation", "is empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn years_accumulation(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }

    #[must_use]
    pub fn years_retirement(&self) -> u32 {
        self.life_expectancy.saturating_sub(self.retirement_age)
    }

    /// Engine parameters derived from the request
    #[must_use]
    pub fn simulation_parameters(&self) -> SimulationParameters {
        SimulationParameters {
            n_paths: self.n_paths,
            years_accumulation: self.years_accumulation(),
            years_retirement: self.years_retirement(),
            initial_value: self.current_savings,
            annual_contribution: self.annual_contribution,
            contribution_growth_rate: self.contribution_growth_rate,
            withdrawal_rate: self.withdrawal_rate,
            rebalance_frequency_months: self.rebalance_frequency_months,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PlanningRequest {
        PlanningRequest {
            current_age: 40,
            retirement_age: 65,
            annual_income: 90_000.0,
            current_savings: 150_000.0,
            annual_contribution: 15_000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_derives_parameters() {
        let r = request();
        r.validate().unwrap();
        let p = r.simulation_parameters();
        assert_eq!(p.years_accumulation, 25);
        assert_eq!(p.years_retirement, 30);
        assert_eq!(p.initial_value, 150_000.0);
        p.validate().unwrap();
    }

    #[test]
    fn test_age_rules() {
        let cases = [
            (17, 65, 95, "current_age"),
            (101, 105, 110, "current_age"),
            (60, 60, 95, "retirement_age"),
            (60, 55, 95, "retirement_age"),
            (40, 65, 65, "life_expectancy"),
            (40, 65, 121, "life_expectancy"),
        ];
        for (current_age, retirement_age, life_expectancy, field) in cases {
            let r = PlanningRequest {
                current_age,
                retirement_age,
                life_expectancy,
                ..request()
            };
            match r.validate() {
                Err(ValidationError::Request { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected {field} rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_money_rules() {
        let over = PlanningRequest {
            annual_contribution: 100_000.0,
            ..request()
        };
        assert!(matches!(
            over.validate(),
            Err(ValidationError::Request {
                field: "annual_contribution",
                ..
            })
        ));

        let nothing = PlanningRequest {
            current_savings: 0.0,
            annual_contribution: 0.0,
            ..request()
        };
        assert!(nothing.validate().is_err());

        let negative = PlanningRequest {
            annual_income: -1.0,
            ..request()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_yaml_style_defaults() {
        let json = r#"{ "current_age": 30, "retirement_age": 60, "current_savings": 10000, "risk_tolerance": "moderately_aggressive" }"#;
        let r: PlanningRequest = serde_json::from_str(json).unwrap();
        assert_eq!(r.life_expectancy, 95);
        assert_eq!(r.n_paths, 10_000);
        assert!(r.age_adjusted);
        assert_eq!(r.risk_tolerance, RiskTier::ModeratelyAggressive);
        r.validate().unwrap();
    }
}
