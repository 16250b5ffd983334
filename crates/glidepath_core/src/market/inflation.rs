use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::rng::{RngStream, path_rng};

/// Simulated inflation never falls below this annual rate
pub const MIN_INFLATION_RATE: f64 = 0.0005;

/// Monthly step of the discretized process, in years
pub const MONTH_DT: f64 = 1.0 / 12.0;

/// Parameters of the mean-reverting inflation process (annual rates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InflationParameters {
    pub current_level: f64,
    pub long_term_target: f64,
    pub volatility: f64,
    pub mean_reversion_speed: f64,
}

impl Default for InflationParameters {
    fn default() -> Self {
        Self {
            current_level: 0.031,
            long_term_target: 0.025,
            volatility: 0.012,
            mean_reversion_speed: 0.35,
        }
    }
}

impl InflationParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let ok = self.current_level.is_finite()
            && self.long_term_target.is_finite()
            && (-0.5..=1.0).contains(&self.current_level)
            && (-0.5..=1.0).contains(&self.long_term_target)
            && self.volatility.is_finite()
            && self.volatility >= 0.0
            && self.mean_reversion_speed.is_finite()
            && self.mean_reversion_speed >= 0.0
            && self.mean_reversion_speed * MONTH_DT <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(ValidationError::Assumptions(format!(
                "inflation parameters out of range: {self:?}"
            )))
        }
    }

    /// One Euler step of the Ornstein-Uhlenbeck process, floored
    #[inline]
    #[must_use]
    pub fn step(&self, previous: f64, z: f64) -> f64 {
        let drift = self.mean_reversion_speed * (self.long_term_target - previous) * MONTH_DT;
        let shock = self.volatility * MONTH_DT.sqrt() * z;
        (previous + drift + shock).max(MIN_INFLATION_RATE)
    }

    /// Starting rate, floored like every subsequent step
    #[must_use]
    pub fn initial_rate(&self) -> f64 {
        self.current_level.max(MIN_INFLATION_RATE)
    }
}

/// Growth of the price level over one month at an annual `rate`
#[inline]
#[must_use]
pub fn monthly_factor(rate: f64) -> f64 {
    (1.0 + rate).powf(MONTH_DT)
}

/// Annual inflation rates for one path, one per month
pub fn sample_path<R: Rng + ?Sized>(
    params: &InflationParameters,
    rng: &mut R,
    months: usize,
) -> Vec<f64> {
    let mut rates = Vec::with_capacity(months);
    let mut rate = params.initial_rate();
    for _ in 0..months {
        let z: f64 = StandardNormal.sample(rng);
        rate = params.step(rate, z);
        rates.push(rate);
    }
    rates
}

/// Inflation paths for `n_paths` paths over `years`, seeded per path.
///
/// Path `i` is identical to the inflation sequence the CPU backend draws for
/// path `i` of a run with the same seed.
#[must_use]
pub fn simulate_paths(
    params: &InflationParameters,
    years: u32,
    n_paths: usize,
    seed: u64,
) -> Vec<Vec<f64>> {
    let months = years as usize * 12;
    (0..n_paths)
        .map(|path| {
            let mut rng = path_rng(seed, path, RngStream::Inflation);
            sample_path(params, &mut rng, months)
        })
        .collect()
}
