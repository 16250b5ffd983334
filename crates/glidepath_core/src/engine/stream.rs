//! Per-path monthly arithmetic shared by both backends
//!
//! The backends differ in how they schedule paths and draw normals; the
//! monthly portfolio step and the retirement decrement order live here so
//! they cannot diverge.

use rand::Rng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal};

use crate::market::inflation::monthly_factor;
use crate::rng::{RngStream, box_muller, path_rng};

use super::plan::{RunPlan, WeightDrift};

/// Source of independent standard normal deviates
pub(crate) trait NormalSource: Default {
    fn fill<R: Rng + ?Sized>(&mut self, rng: &mut R, out: &mut [f64]);

    fn sample_one<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let mut z = [0.0];
        self.fill(rng, &mut z);
        z[0]
    }
}

/// `rand_distr` ziggurat sampler
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Ziggurat;

impl NormalSource for Ziggurat {
    #[inline]
    fn fill<R: Rng + ?Sized>(&mut self, rng: &mut R, out: &mut [f64]) {
        for z in out {
            *z = StandardNormal.sample(rng);
        }
    }
}

/// Box-Muller transform over raw uniforms, as the device kernel draws them.
/// An odd trailing deviate is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BoxMuller;

impl NormalSource for BoxMuller {
    #[inline]
    fn fill<R: Rng + ?Sized>(&mut self, rng: &mut R, out: &mut [f64]) {
        for pair in out.chunks_mut(2) {
            let u1 = 1.0 - rng.random::<f64>();
            let u2 = rng.random::<f64>();
            let (z0, z1) = box_muller(u1, u2);
            pair[0] = z0;
            if let Some(second) = pair.get_mut(1) {
                *second = z1;
            }
        }
    }
}

/// Advance one month of one path.
///
/// `z` holds independent normals; `weights` are the path's current weights
/// and `asset_returns` is scratch of the same length. `month` is the 0-based
/// month within the phase; weights snap back to target after every
/// `rebalance_frequency_months`-th month.
#[inline]
pub(crate) fn portfolio_month(
    plan: &RunPlan,
    z: &[f64],
    weights: &mut [f64],
    asset_returns: &mut [f64],
    month: usize,
) -> f64 {
    let k = plan.n_assets();
    let chol = plan.cholesky();
    let means = plan.monthly_means();

    let mut portfolio_return = 0.0;
    for i in 0..k {
        let row = &chol[i * k..=i * k + i];
        let shock: f64 = row.iter().zip(z).map(|(l, z)| l * z).sum();
        let r = means[i] + shock;
        asset_returns[i] = r;
        portfolio_return += weights[i] * r;
    }

    if plan.drift() == WeightDrift::Tracked {
        let growth = 1.0 + portfolio_return;
        if growth > 0.0 {
            for (w, r) in weights.iter_mut().zip(asset_returns.iter()) {
                *w *= (1.0 + r) / growth;
            }
        }
    }

    let rebalance = plan.params().rebalance_frequency_months as usize;
    if (month + 1) % rebalance == 0 {
        weights.copy_from_slice(plan.target_weights());
    }
    portfolio_return
}

/// Monthly portfolio returns of one path
pub(crate) struct ReturnStream<'a, N: NormalSource = Ziggurat> {
    plan: &'a RunPlan,
    rng: SmallRng,
    normals: N,
    z: Vec<f64>,
    weights: Vec<f64>,
    asset_returns: Vec<f64>,
    month: usize,
}

impl<'a, N: NormalSource> ReturnStream<'a, N> {
    /// Stream for `path_index`; a fresh stream always replays the same sequence
    pub(crate) fn new(plan: &'a RunPlan, path_index: usize) -> Self {
        let k = plan.n_assets();
        Self {
            plan,
            rng: path_rng(plan.params().seed, path_index, RngStream::Returns),
            normals: N::default(),
            z: vec![0.0; k],
            weights: plan.target_weights().to_vec(),
            asset_returns: vec![0.0; k],
            month: 0,
        }
    }

    #[inline]
    pub(crate) fn next_return(&mut self) -> f64 {
        self.normals.fill(&mut self.rng, &mut self.z);
        let r = portfolio_month(
            self.plan,
            &self.z,
            &mut self.weights,
            &mut self.asset_returns,
            self.month,
        );
        self.month += 1;
        r
    }
}

/// Annual inflation rate of one path, advanced monthly
pub(crate) struct InflationStream<'a, N: NormalSource = Ziggurat> {
    plan: &'a RunPlan,
    rng: SmallRng,
    normals: N,
    rate: f64,
}

impl<'a, N: NormalSource> InflationStream<'a, N> {
    pub(crate) fn new(plan: &'a RunPlan, path_index: usize) -> Self {
        Self {
            plan,
            rng: path_rng(plan.params().seed, path_index, RngStream::Inflation),
            normals: N::default(),
            rate: plan.inflation().initial_rate(),
        }
    }

    #[inline]
    pub(crate) fn next_rate(&mut self) -> f64 {
        let z = self.normals.sample_one(&mut self.rng);
        self.rate = self.plan.inflation().step(self.rate, z);
        self.rate
    }
}

/// Final state of one path's retirement phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RetirementOutcome {
    pub final_balance: f64,
    pub depletion_month: Option<u32>,
    pub sustainable_rate: f64,
}

/// Balance and withdrawal bookkeeping for one retiring path.
///
/// Each month the inflation-scaled withdrawal is taken first and the
/// remainder is grown. Alongside the balance, the ledger accumulates the
/// present value (at the path's realized returns) of a unit initial
/// withdrawal rate, which yields the highest rate the path could sustain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetirementLedger {
    start_balance: f64,
    balance: f64,
    monthly_withdrawal: f64,
    cumulative_inflation: f64,
    growth: f64,
    withdrawal_pv: f64,
    depletion_month: Option<u32>,
    month: u32,
}

impl RetirementLedger {
    pub(crate) fn new(retirement_balance: f64, withdrawal_rate: f64) -> Self {
        Self {
            start_balance: retirement_balance,
            balance: retirement_balance,
            monthly_withdrawal: retirement_balance * withdrawal_rate / 12.0,
            cumulative_inflation: 1.0,
            growth: 1.0,
            withdrawal_pv: 0.0,
            depletion_month: None,
            month: 0,
        }
    }

    #[inline]
    pub(crate) fn step(&mut self, portfolio_return: f64, inflation_rate: f64) {
        self.month += 1;
        self.withdrawal_pv += self.cumulative_inflation / (12.0 * self.growth);

        let growth = (1.0 + portfolio_return).max(0.0);
        if self.depletion_month.is_none() {
            self.balance -= self.monthly_withdrawal * self.cumulative_inflation;
            if self.balance <= 0.0 {
                self.balance = 0.0;
                self.depletion_month = Some(self.month);
            } else {
                self.balance *= growth;
            }
        }
        self.growth *= growth;
        self.cumulative_inflation *= monthly_factor(inflation_rate);
    }

    #[inline]
    pub(crate) fn balance(&self) -> f64 {
        self.balance
    }

    pub(crate) fn finish(&self) -> RetirementOutcome {
        let sustainable_rate = if self.start_balance > 0.0 && self.withdrawal_pv > 0.0 {
            1.0 / self.withdrawal_pv
        } else {
            0.0
        };
        RetirementOutcome {
            final_balance: self.balance,
            depletion_month: self.depletion_month,
            sustainable_rate,
        }
    }
}

/// Return for retirement month `month` (0-based): the replayed accumulation
/// sequence while it lasts, then the blended constant
#[inline]
pub(crate) fn retirement_return<N: NormalSource>(
    plan: &RunPlan,
    replay: &mut ReturnStream<'_, N>,
    month: usize,
) -> f64 {
    if month < plan.accumulation_months() {
        replay.next_return()
    } else {
        plan.blended_monthly_return()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_flat_market_depletes_on_schedule() {
        // 12% of 1200 per year with flat returns and prices lasts 100 months
        let mut ledger = RetirementLedger::new(1_200.0, 0.12);
        for _ in 0..120 {
            ledger.step(0.0, 0.0);
        }
        let outcome = ledger.finish();
        assert_eq!(outcome.final_balance, 0.0);
        assert_eq!(outcome.depletion_month, Some(100));
        // 120 months of unit withdrawals have a present value of 10 years
        assert!((outcome.sustainable_rate - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_ledger_sustainable_rate_separates_success() {
        let returns: Vec<f64> = (0..240).map(|m| if m % 7 == 0 { -0.03 } else { 0.008 }).collect();
        let inflation = 0.03;

        let mut ledger = RetirementLedger::new(1_000_000.0, 0.04);
        for r in &returns {
            ledger.step(*r, inflation);
        }
        let sustainable = ledger.finish().sustainable_rate;

        for rate in [sustainable * 0.98, sustainable * 1.02] {
            let mut ledger = RetirementLedger::new(1_000_000.0, rate);
            for r in &returns {
                ledger.step(*r, inflation);
            }
            let survived = ledger.finish().final_balance > 0.0;
            assert_eq!(survived, rate < sustainable, "rate {rate}");
        }
    }

    #[test]
    fn test_zero_balance_is_depleted() {
        let mut ledger = RetirementLedger::new(0.0, 0.04);
        ledger.step(0.01, 0.02);
        let outcome = ledger.finish();
        assert_eq!(outcome.depletion_month, Some(1));
        assert_eq!(outcome.sustainable_rate, 0.0);
    }

    #[test]
    fn test_box_muller_fills_odd_lengths() {
        let mut rng = path_rng(3, 0, RngStream::Returns);
        let mut out = [f64::NAN; 5];
        BoxMuller.fill(&mut rng, &mut out);
        assert!(out.iter().all(|z| z.is_finite()));
    }
}
