use std::ops::Range;

#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::BackendError;
use crate::model::{BackendKind, PathResults, SampledPath};

use super::SimulationBackend;
use super::cancel::CancellationToken;
use super::plan::RunPlan;
use super::state::{RunState, RunTracker};
use super::stream::{
    InflationStream, RetirementLedger, RetirementOutcome, ReturnStream, retirement_return,
};

/// Data-parallel backend over a fixed-size worker pool.
///
/// Paths are split into one contiguous partition per worker. Every path
/// draws from its own seeded streams, so output does not depend on the
/// worker count.
#[derive(Debug)]
pub struct CpuBackend {
    workers: usize,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

struct Accumulated {
    balance: f64,
    trace: Option<Vec<f64>>,
}

struct Retired {
    outcome: RetirementOutcome,
    trace: Option<Vec<f64>>,
}

impl CpuBackend {
    pub fn new(workers: usize) -> Result<Self, BackendError> {
        let workers = workers.max(1);
        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("glidepath-cpu-{i}"))
            .build()
            .map_err(|e| BackendError::WorkerPool(e.to_string()))?;

        Ok(Self {
            workers,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn partitions(&self, n_paths: usize) -> Vec<Range<usize>> {
        let size = n_paths.div_ceil(self.workers).max(1);
        (0..n_paths)
            .step_by(size)
            .map(|start| start..(start + size).min(n_paths))
            .collect()
    }

    /// Run `f` over every partition and concatenate the results in path order
    fn run_partitions<T, F>(&self, n_paths: usize, f: F) -> Result<Vec<T>, BackendError>
    where
        T: Send,
        F: Fn(Range<usize>) -> Result<Vec<T>, BackendError> + Sync,
    {
        let partitions = self.partitions(n_paths);

        #[cfg(feature = "parallel")]
        let chunks: Vec<Vec<T>> = self.pool.install(|| {
            partitions
                .into_par_iter()
                .map(&f)
                .collect::<Result<Vec<_>, _>>()
        })?;

        #[cfg(not(feature = "parallel"))]
        let chunks: Vec<Vec<T>> = partitions
            .into_iter()
            .map(&f)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(chunks.into_iter().flatten().collect())
    }
}

fn accumulate_path(
    plan: &RunPlan,
    path: usize,
    cancel: &CancellationToken,
) -> Result<Accumulated, BackendError> {
    let mut returns: ReturnStream<'_> = ReturnStream::new(plan, path);
    let mut trace = (path < plan.sample_paths()).then(|| Vec::with_capacity(plan.total_months()));
    let mut balance = plan.params().initial_value;

    for &contribution in plan.contributions() {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        balance = balance * (1.0 + returns.next_return()) + contribution;
        if let Some(trace) = trace.as_mut() {
            trace.push(balance);
        }
    }
    Ok(Accumulated { balance, trace })
}

fn retire_path(
    plan: &RunPlan,
    path: usize,
    retirement_balance: f64,
    cancel: &CancellationToken,
) -> Result<Retired, BackendError> {
    let mut replay: ReturnStream<'_> = ReturnStream::new(plan, path);
    let mut inflation: InflationStream<'_> = InflationStream::new(plan, path);
    for _ in 0..plan.accumulation_months() {
        inflation.next_rate();
    }

    let mut ledger = RetirementLedger::new(retirement_balance, plan.params().withdrawal_rate);
    let mut trace = (path < plan.sample_paths())
        .then(|| Vec::with_capacity(plan.retirement_months()));
    for month in 0..plan.retirement_months() {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let r = retirement_return(plan, &mut replay, month);
        ledger.step(r, inflation.next_rate());
        if let Some(trace) = trace.as_mut() {
            trace.push(ledger.balance());
        }
    }
    Ok(Retired {
        outcome: ledger.finish(),
        trace,
    })
}

impl SimulationBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn run(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<PathResults, BackendError> {
        let mut tracker = RunTracker::new(BackendKind::Cpu);
        let n = plan.n_paths();
        cancel.reset_progress();
        tracing::debug!(
            workers = self.workers,
            partitions = self.partitions(n).len(),
            "cpu run partitioned"
        );

        tracker.advance(RunState::AccumulationRun);
        let accumulated: Vec<Accumulated> = self
            .run_partitions(n, |range| {
                range.map(|p| accumulate_path(plan, p, cancel)).collect()
            })
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(RunState::RetirementRun);
        let retired: Vec<Retired> = self
            .run_partitions(n, |range| {
                let len = range.len();
                let out = range
                    .map(|p| retire_path(plan, p, accumulated[p].balance, cancel))
                    .collect::<Result<Vec<_>, _>>()?;
                cancel.record_paths(len);
                Ok(out)
            })
            .map_err(|e| tracker.fail(e))?;

        let retirement_balance: Vec<f64> = accumulated.iter().map(|a| a.balance).collect();
        let mut sampled_paths = Vec::with_capacity(plan.sample_paths());
        let mut outcomes = Vec::with_capacity(n);
        for (path, (acc, ret)) in accumulated.into_iter().zip(retired).enumerate() {
            if let (Some(mut monthly_balances), Some(tail)) = (acc.trace, ret.trace) {
                monthly_balances.extend(tail);
                sampled_paths.push(SampledPath {
                    path_index: path,
                    monthly_balances,
                });
            }
            outcomes.push(ret.outcome);
        }

        tracker.advance(RunState::Completed);
        Ok(plan.results(BackendKind::Cpu, retirement_balance, outcomes, sampled_paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_cover_all_paths() {
        let backend = CpuBackend::new(3).unwrap();
        let parts = backend.partitions(10);
        assert_eq!(parts, vec![0..4, 4..8, 8..10]);

        let parts = backend.partitions(2);
        assert_eq!(parts, vec![0..1, 1..2]);
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(CpuBackend::new(0).unwrap().workers(), 1);
    }
}
