use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_WITHDRAWAL_RATE: f64 = 0.01;
pub const MAX_WITHDRAWAL_RATE: f64 = 0.20;
pub const MIN_CONTRIBUTION_GROWTH: f64 = -0.10;
pub const MAX_CONTRIBUTION_GROWTH: f64 = 0.20;
pub const MAX_PATHS: usize = 2_000_000;
pub const MAX_YEARS: u32 = 100;

fn default_rebalance_frequency() -> u32 {
    12
}

fn default_seed() -> u64 {
    42
}

/// Everything the engine needs besides the allocation and the assumptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub n_paths: usize,
    pub years_accumulation: u32,
    pub years_retirement: u32,
    pub initial_value: f64,
    pub annual_contribution: f64,
    #[serde(default)]
    pub contribution_growth_rate: f64,
    pub withdrawal_rate: f64,
    #[serde(default = "default_rebalance_frequency")]
    pub rebalance_frequency_months: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            n_paths: 10_000,
            years_accumulation: 30,
            years_retirement: 30,
            initial_value: 0.0,
            annual_contribution: 0.0,
            contribution_growth_rate: 0.0,
            withdrawal_rate: 0.04,
            rebalance_frequency_months: default_rebalance_frequency(),
            seed: default_seed(),
        }
    }
}

impl SimulationParameters {
    /// Check every range constraint; the first violation is returned.
    pub fn validate(&self) -> Result<(), ValidationError> {
        fn check(
            ok: bool,
            name: &'static str,
            value: f64,
            constraint: &'static str,
        ) -> Result<(), ValidationError> {
            if ok {
                Ok(())
            } else {
                Err(ValidationError::Parameter {
                    name,
                    value,
                    constraint,
                })
            }
        }

        check(
            self.n_paths > 0 && self.n_paths <= MAX_PATHS,
            "n_paths",
            self.n_paths as f64,
            "0 < n_paths <= 2,000,000",
        )?;
        check(
            self.years_accumulation > 0 && self.years_accumulation <= MAX_YEARS,
            "years_accumulation",
            f64::from(self.years_accumulation),
            "0 < years <= 100",
        )?;
        check(
            self.years_retirement > 0 && self.years_retirement <= MAX_YEARS,
            "years_retirement",
            f64::from(self.years_retirement),
            "0 < years <= 100",
        )?;
        check(
            self.initial_value.is_finite() && self.initial_value >= 0.0,
            "initial_value",
            self.initial_value,
            ">= 0",
        )?;
        check(
            self.annual_contribution.is_finite() && self.annual_contribution >= 0.0,
            "annual_contribution",
            self.annual_contribution,
            ">= 0",
        )?;
        check(
            (MIN_WITHDRAWAL_RATE..=MAX_WITHDRAWAL_RATE).contains(&self.withdrawal_rate),
            "withdrawal_rate",
            self.withdrawal_rate,
            "in [0.01, 0.20]",
        )?;
        check(
            (MIN_CONTRIBUTION_GROWTH..=MAX_CONTRIBUTION_GROWTH)
                .contains(&self.contribution_growth_rate),
            "contribution_growth_rate",
            self.contribution_growth_rate,
            "in [-0.10, 0.20]",
        )?;
        check(
            self.rebalance_frequency_months > 0,
            "rebalance_frequency_months",
            f64::from(self.rebalance_frequency_months),
            "> 0",
        )?;
        Ok(())
    }

    #[must_use]
    pub fn accumulation_months(&self) -> usize {
        self.years_accumulation as usize * 12
    }

    #[must_use]
    pub fn retirement_months(&self) -> usize {
        self.years_retirement as usize * 12
    }

    #[must_use]
    pub fn total_months(&self) -> usize {
        self.accumulation_months() + self.retirement_months()
    }

    /// Monthly contribution schedule for the accumulation phase.
    ///
    /// The base contribution is spread evenly over twelve months and grows by
    /// `contribution_growth_rate` once every twelve months.
    #[must_use]
    pub fn contribution_schedule(&self) -> Vec<f64> {
        let base_monthly = self.annual_contribution / 12.0;
        let growth = 1.0 + self.contribution_growth_rate;
        let mut schedule = Vec::with_capacity(self.accumulation_months());
        let mut monthly = base_monthly;
        for year in 0..self.years_accumulation {
            if year > 0 {
                monthly *= growth;
            }
            schedule.extend(std::iter::repeat_n(monthly, 12));
        }
        schedule
    }

    /// Total nominal contributions over the accumulation phase
    #[must_use]
    pub fn total_contributions(&self) -> f64 {
        self.contribution_schedule().iter().sum()
    }
}
