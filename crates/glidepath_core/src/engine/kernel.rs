//! Kernel-based backend over an abstract compute device
//!
//! Paths are partitioned across a small number of compute streams. Each
//! stream owns a pooled set of device buffers holding the full state of its
//! partition; one kernel launch advances every lane of a partition by a
//! batch of months. Only summary arrays are read back.
//!
//! [`HostDevice`] executes kernels on host threads with the same buffer and
//! launch discipline, so the backend runs wherever no accelerator is present.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::SmallRng;

use crate::error::BackendError;
use crate::model::{BackendKind, PathResults, SampledPath};
use crate::rng::{RngStream, path_rng};

use super::SimulationBackend;
use super::cancel::CancellationToken;
use super::plan::RunPlan;
use super::state::{RunState, RunTracker};
use super::stream::{BoxMuller, NormalSource, RetirementLedger, RetirementOutcome, portfolio_month};

/// Largest asset count the path kernel is compiled for
pub const MAX_KERNEL_ASSETS: usize = 32;

/// Static description of a compute device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub memory_bytes: usize,
    pub max_streams: usize,
    pub max_kernel_assets: usize,
}

/// A device that can hold path buffers and execute the path kernel
pub trait ComputeDevice: Send + Sync + fmt::Debug {
    fn info(&self) -> &DeviceInfo;

    /// Specialize the path kernel for `n_assets` assets
    fn compile(&self, n_assets: usize) -> Result<(), BackendError> {
        let max = self.info().max_kernel_assets;
        if n_assets == 0 || n_assets > max {
            return Err(BackendError::KernelCompile(format!(
                "path kernel supports 1..={max} assets, got {n_assets}"
            )));
        }
        Ok(())
    }

    /// Execute one launch on `stream`; returns once the stream is synchronized
    fn launch(&self, stream: usize, launch: &mut KernelLaunch<'_>) -> Result<(), BackendError>;
}

/// Emulated device that runs kernels on the calling host thread
#[derive(Debug, Clone)]
pub struct HostDevice {
    info: DeviceInfo,
}

impl HostDevice {
    #[must_use]
    pub fn new(memory_bytes: usize, max_streams: usize) -> Self {
        Self {
            info: DeviceInfo {
                name: "host-emulated".to_string(),
                memory_bytes,
                max_streams: max_streams.max(1),
                max_kernel_assets: MAX_KERNEL_ASSETS,
            },
        }
    }
}

impl ComputeDevice for HostDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn launch(&self, _stream: usize, launch: &mut KernelLaunch<'_>) -> Result<(), BackendError> {
        launch.execute();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelPhase {
    Accumulation,
    Retirement,
}

/// Device-resident state of one stream's partition, structure-of-arrays.
///
/// Pooled per stream and reused across launches and runs. A run holds the
/// backend's run lease while it uses the pools; `reset` clears them at the
/// end of the run while keeping the allocations.
#[derive(Debug, Default)]
pub struct DeviceBuffers {
    paths: Range<usize>,
    n_assets: usize,
    total_months: usize,
    traced_lanes: usize,
    return_rngs: Vec<SmallRng>,
    inflation_rngs: Vec<SmallRng>,
    inflation_rate: Vec<f64>,
    weights: Vec<f64>,
    balance: Vec<f64>,
    retirement_balance: Vec<f64>,
    ledgers: Vec<RetirementLedger>,
    traces: Vec<f64>,
    z: Vec<f64>,
    asset_returns: Vec<f64>,
}

impl DeviceBuffers {
    /// Device bytes needed for one lane
    #[must_use]
    pub fn bytes_per_lane(n_assets: usize) -> usize {
        2 * size_of::<SmallRng>()
            + (n_assets + 3) * size_of::<f64>()
            + size_of::<RetirementLedger>()
    }

    /// Device bytes needed for a partition of `lanes` paths, `traced` of them
    /// with full traces
    #[must_use]
    pub fn bytes_for(lanes: usize, traced: usize, n_assets: usize, total_months: usize) -> usize {
        lanes * Self::bytes_per_lane(n_assets)
            + traced * total_months * size_of::<f64>()
            + 2 * n_assets * size_of::<f64>()
    }

    #[must_use]
    pub fn lanes(&self) -> usize {
        self.paths.len()
    }

    fn load(&mut self, plan: &RunPlan, paths: Range<usize>) {
        let seed = plan.params().seed;
        let k = plan.n_assets();
        self.n_assets = k;
        self.total_months = plan.total_months();
        self.traced_lanes = plan.sample_paths().min(paths.end).saturating_sub(paths.start);

        self.return_rngs.clear();
        self.inflation_rngs.clear();
        for p in paths.clone() {
            self.return_rngs.push(path_rng(seed, p, RngStream::Returns));
            self.inflation_rngs.push(path_rng(seed, p, RngStream::Inflation));
        }
        let lanes = paths.len();
        self.inflation_rate.clear();
        self.inflation_rate
            .resize(lanes, plan.inflation().initial_rate());
        self.weights.clear();
        for _ in 0..lanes {
            self.weights.extend_from_slice(plan.target_weights());
        }
        self.balance.clear();
        self.balance.resize(lanes, plan.params().initial_value);
        self.retirement_balance.clear();
        self.ledgers.clear();
        self.traces.clear();
        self.traces.resize(self.traced_lanes * self.total_months, 0.0);
        self.z.clear();
        self.z.resize(k, 0.0);
        self.asset_returns.clear();
        self.asset_returns.resize(k, 0.0);
        self.paths = paths;
    }

    /// Snapshot retirement balances, replay the return streams from their
    /// seeds and open a withdrawal ledger per lane
    fn begin_retirement(&mut self, plan: &RunPlan) {
        let seed = plan.params().seed;
        self.retirement_balance.clear();
        self.retirement_balance.extend_from_slice(&self.balance);
        for (lane, p) in self.paths.clone().enumerate() {
            self.return_rngs[lane] = path_rng(seed, p, RngStream::Returns);
        }
        self.weights.clear();
        for _ in 0..self.lanes() {
            self.weights.extend_from_slice(plan.target_weights());
        }
        self.ledgers.clear();
        let rate = plan.params().withdrawal_rate;
        self.ledgers.extend(
            self.retirement_balance
                .iter()
                .map(|&b| RetirementLedger::new(b, rate)),
        );
    }

    fn reset(&mut self) {
        self.paths = 0..0;
        self.traced_lanes = 0;
        self.return_rngs.clear();
        self.inflation_rngs.clear();
        self.inflation_rate.clear();
        self.weights.clear();
        self.balance.clear();
        self.retirement_balance.clear();
        self.ledgers.clear();
        self.traces.clear();
    }
}

/// One kernel launch: a phase, a month range and the buffers it advances
pub struct KernelLaunch<'a> {
    plan: &'a RunPlan,
    phase: KernelPhase,
    months: Range<usize>,
    buffers: &'a mut DeviceBuffers,
}

impl<'a> KernelLaunch<'a> {
    fn new(
        plan: &'a RunPlan,
        phase: KernelPhase,
        months: Range<usize>,
        buffers: &'a mut DeviceBuffers,
    ) -> Self {
        Self {
            plan,
            phase,
            months,
            buffers,
        }
    }

    #[must_use]
    pub fn phase(&self) -> KernelPhase {
        self.phase
    }

    #[must_use]
    pub fn months(&self) -> Range<usize> {
        self.months.clone()
    }

    #[must_use]
    pub fn lanes(&self) -> usize {
        self.buffers.lanes()
    }

    /// Advance every lane through the launch's month range
    pub fn execute(&mut self) {
        let plan = self.plan;
        let k = self.buffers.n_assets;
        let acc_months = plan.accumulation_months();
        let total = self.buffers.total_months;
        let mut normals = BoxMuller;
        let b = &mut *self.buffers;

        for lane in 0..b.paths.len() {
            let weights = &mut b.weights[lane * k..(lane + 1) * k];
            for month in self.months.clone() {
                let inflation = {
                    let z = normals.sample_one(&mut b.inflation_rngs[lane]);
                    b.inflation_rate[lane] = plan.inflation().step(b.inflation_rate[lane], z);
                    b.inflation_rate[lane]
                };

                let balance = match self.phase {
                    KernelPhase::Accumulation => {
                        normals.fill(&mut b.return_rngs[lane], &mut b.z);
                        let r = portfolio_month(plan, &b.z, weights, &mut b.asset_returns, month);
                        b.balance[lane] =
                            b.balance[lane] * (1.0 + r) + plan.contributions()[month];
                        b.balance[lane]
                    }
                    KernelPhase::Retirement => {
                        let r = if month < acc_months {
                            normals.fill(&mut b.return_rngs[lane], &mut b.z);
                            portfolio_month(plan, &b.z, weights, &mut b.asset_returns, month)
                        } else {
                            plan.blended_monthly_return()
                        };
                        let ledger = &mut b.ledgers[lane];
                        ledger.step(r, inflation);
                        ledger.balance()
                    }
                };

                if lane < b.traced_lanes {
                    let offset = match self.phase {
                        KernelPhase::Accumulation => month,
                        KernelPhase::Retirement => acc_months + month,
                    };
                    b.traces[lane * total + offset] = balance;
                }
            }
        }
    }
}

/// Output slices one stream writes its partition's summaries into
struct StreamOutput<'a> {
    retirement_balance: &'a mut [f64],
    outcomes: &'a mut [Option<RetirementOutcome>],
}

/// Kernel backend: paths partitioned over compute streams with pooled,
/// resident device buffers.
///
/// Runs sharing one backend are serialized on the run lease, which is held
/// across both phases; the pools only ever hold one run's state.
#[derive(Debug)]
pub struct GpuBackend {
    device: Arc<dyn ComputeDevice>,
    streams: usize,
    batch_months: usize,
    run_lease: Mutex<()>,
    pools: Vec<Mutex<DeviceBuffers>>,
}

impl GpuBackend {
    pub fn new(
        device: Arc<dyn ComputeDevice>,
        streams: usize,
        batch_months: usize,
    ) -> Result<Self, BackendError> {
        let info = device.info();
        if info.memory_bytes == 0 {
            return Err(BackendError::Unavailable(format!(
                "{} reports no device memory",
                info.name
            )));
        }
        let streams = streams.clamp(1, info.max_streams.max(1));
        tracing::debug!(device = %info.name, streams, batch_months, "kernel backend ready");
        Ok(Self {
            device,
            streams,
            batch_months: batch_months.max(1),
            run_lease: Mutex::new(()),
            pools: (0..streams).map(|_| Mutex::new(DeviceBuffers::default())).collect(),
        })
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    #[must_use]
    pub fn streams(&self) -> usize {
        self.streams
    }

    fn partitions(&self, n_paths: usize) -> Vec<Range<usize>> {
        let streams = self.streams.min(n_paths).max(1);
        let size = n_paths.div_ceil(streams);
        (0..n_paths)
            .step_by(size)
            .map(|start| start..(start + size).min(n_paths))
            .collect()
    }

    /// Month ranges of one phase, `batch_months` at a time
    fn batches(&self, months: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..months)
            .step_by(self.batch_months)
            .map(move |start| start..(start + self.batch_months).min(months))
    }

    fn check_memory(&self, plan: &RunPlan, partitions: &[Range<usize>]) -> Result<(), BackendError> {
        let available = self.device.info().memory_bytes / self.streams;
        for part in partitions {
            let traced = plan.sample_paths().min(part.end).saturating_sub(part.start);
            let required =
                DeviceBuffers::bytes_for(part.len(), traced, plan.n_assets(), plan.total_months());
            if required > available {
                return Err(BackendError::OutOfDeviceMemory {
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Pool of `stream`. A pool poisoned by a panicked stream is reused, since
    /// `DeviceBuffers::load` rewrites every buffer before the next launch.
    fn lock_pool(&self, stream: usize) -> MutexGuard<'_, DeviceBuffers> {
        self.pools[stream]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn launch_phase(
        &self,
        stream: usize,
        plan: &RunPlan,
        phase: KernelPhase,
        months: usize,
        buffers: &mut DeviceBuffers,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        for batch in self.batches(months) {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            let mut launch = KernelLaunch::new(plan, phase, batch, buffers);
            self.device.launch(stream, &mut launch)?;
        }
        Ok(())
    }

    fn accumulate_stream(
        &self,
        stream: usize,
        plan: &RunPlan,
        paths: Range<usize>,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        let mut buffers = self.lock_pool(stream);
        buffers.load(plan, paths);
        self.launch_phase(
            stream,
            plan,
            KernelPhase::Accumulation,
            plan.accumulation_months(),
            &mut buffers,
            cancel,
        )
    }

    fn retire_stream(
        &self,
        stream: usize,
        plan: &RunPlan,
        output: StreamOutput<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SampledPath>, BackendError> {
        let mut buffers = self.lock_pool(stream);
        buffers.begin_retirement(plan);
        self.launch_phase(
            stream,
            plan,
            KernelPhase::Retirement,
            plan.retirement_months(),
            &mut buffers,
            cancel,
        )?;

        output
            .retirement_balance
            .copy_from_slice(&buffers.retirement_balance);
        for (slot, ledger) in output.outcomes.iter_mut().zip(&buffers.ledgers) {
            *slot = Some(ledger.finish());
        }
        cancel.record_paths(buffers.lanes());

        let total = buffers.total_months;
        let start = buffers.paths.start;
        Ok((0..buffers.traced_lanes)
            .map(|lane| SampledPath {
                path_index: start + lane,
                monthly_balances: buffers.traces[lane * total..(lane + 1) * total].to_vec(),
            })
            .collect())
    }

    fn reset_pools(&self) {
        for stream in 0..self.pools.len() {
            self.lock_pool(stream).reset();
        }
    }

    fn run_phases(
        &self,
        plan: &RunPlan,
        cancel: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> Result<PathResults, BackendError> {
        let n = plan.n_paths();
        self.device.compile(plan.n_assets())?;
        let partitions = self.partitions(n);
        self.check_memory(plan, &partitions)?;
        tracing::debug!(
            device = %self.device.info().name,
            streams = partitions.len(),
            batch_months = self.batch_months,
            "kernel run partitioned"
        );

        tracker.advance(RunState::AccumulationRun);
        join_streams(std::thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .iter()
                .enumerate()
                .map(|(stream, paths)| {
                    let paths = paths.clone();
                    scope.spawn(move || self.accumulate_stream(stream, plan, paths, cancel))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        }))?;

        // device synchronization point between phases
        tracker.advance(RunState::RetirementRun);
        let mut retirement_balance = vec![0.0; n];
        let mut outcomes: Vec<Option<RetirementOutcome>> = vec![None; n];
        let size = partitions.first().map_or(n, |p| p.len()).max(1);
        let traces = join_streams(std::thread::scope(|scope| {
            let handles: Vec<_> = retirement_balance
                .chunks_mut(size)
                .zip(outcomes.chunks_mut(size))
                .enumerate()
                .map(|(stream, (rb, out))| {
                    let output = StreamOutput {
                        retirement_balance: rb,
                        outcomes: out,
                    };
                    scope.spawn(move || self.retire_stream(stream, plan, output, cancel))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        }))?;

        let outcomes = outcomes
            .into_iter()
            .enumerate()
            .map(|(path, o)| {
                o.ok_or_else(|| BackendError::KernelLaunch {
                    stream: path / size,
                    reason: format!("no result read back for path {path}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sampled_paths = traces.into_iter().flatten().collect();

        Ok(plan.results(BackendKind::Gpu, retirement_balance, outcomes, sampled_paths))
    }
}

type JoinResult<T> = std::thread::Result<Result<T, BackendError>>;

/// Collect per-stream results, surfacing cancellation ahead of other errors
fn join_streams<T>(joined: Vec<JoinResult<T>>) -> Result<Vec<T>, BackendError> {
    let mut results = Vec::with_capacity(joined.len());
    let mut first_error = None;
    for (stream, outcome) in joined.into_iter().enumerate() {
        let err = match outcome {
            Ok(Ok(value)) => {
                results.push(value);
                continue;
            }
            Ok(Err(err)) => err,
            Err(_) => BackendError::KernelLaunch {
                stream,
                reason: "stream worker panicked".to_string(),
            },
        };
        if err == BackendError::Cancelled {
            return Err(err);
        }
        first_error.get_or_insert(err);
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

impl SimulationBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn run(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<PathResults, BackendError> {
        let mut tracker = RunTracker::new(BackendKind::Gpu);
        let _lease = self
            .run_lease
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cancel.reset_progress();
        let result = self.run_phases(plan, cancel, &mut tracker);
        self.reset_pools();
        match result {
            Ok(results) => {
                tracker.advance(RunState::Completed);
                Ok(results)
            }
            Err(err) => Err(tracker.fail(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::market::CapitalMarketAssumptions;
    use crate::model::{AssetClassId, PortfolioAllocation, SimulationParameters};

    fn plan(pairs: &[(AssetClassId, f64)], n_paths: usize, seed: u64) -> RunPlan {
        let cma = CapitalMarketAssumptions::default_assumptions();
        let alloc = PortfolioAllocation::from_pairs(pairs.iter().cloned()).unwrap();
        let params = SimulationParameters {
            n_paths,
            years_accumulation: 5,
            years_retirement: 5,
            initial_value: 20_000.0,
            annual_contribution: 3_000.0,
            seed,
            ..Default::default()
        };
        RunPlan::build(&cma, &alloc, &params, &EngineConfig::default()).unwrap()
    }

    fn wide_plan() -> RunPlan {
        plan(
            &[
                (AssetClassId::US_LARGE_CAP, 0.5),
                (AssetClassId::INTERNATIONAL_DEVELOPED, 0.2),
                (AssetClassId::CORPORATE_BONDS, 0.3),
            ],
            301,
            3,
        )
    }

    fn narrow_plan() -> RunPlan {
        plan(&[(AssetClassId::US_LARGE_CAP, 1.0)], 97, 9)
    }

    #[test]
    fn test_concurrent_runs_share_backend() {
        let backend = GpuBackend::new(Arc::new(HostDevice::new(1 << 26, 4)), 4, 12).unwrap();
        let (wide, narrow) = (wide_plan(), narrow_plan());
        let cancel = CancellationToken::new();
        let expected_wide = backend.run(&wide, &cancel).unwrap();
        let expected_narrow = backend.run(&narrow, &cancel).unwrap();

        for _ in 0..10 {
            let (a, b) = std::thread::scope(|scope| {
                let a = scope.spawn(|| backend.run(&wide, &CancellationToken::new()));
                let b = scope.spawn(|| backend.run(&narrow, &CancellationToken::new()));
                (a.join().unwrap(), b.join().unwrap())
            });
            assert_eq!(a.unwrap(), expected_wide);
            assert_eq!(b.unwrap(), expected_narrow);
        }
    }

    #[test]
    fn test_poisoned_pool_is_reused() {
        let backend = GpuBackend::new(Arc::new(HostDevice::new(1 << 26, 2)), 2, 12).unwrap();
        let plan = narrow_plan();
        let expected = backend.run(&plan, &CancellationToken::new()).unwrap();

        let poisoned = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = backend.pools[0].lock().unwrap();
                    panic!("stream worker died");
                })
                .join()
        });
        assert!(poisoned.is_err());
        assert!(backend.pools[0].is_poisoned());

        let rerun = backend.run(&plan, &CancellationToken::new()).unwrap();
        assert_eq!(rerun, expected);
    }

    #[test]
    fn test_compile_rejects_wide_portfolios() {
        let device = HostDevice::new(1 << 20, 2);
        assert!(device.compile(10).is_ok());
        assert!(matches!(
            device.compile(MAX_KERNEL_ASSETS + 1),
            Err(BackendError::KernelCompile(_))
        ));
        assert!(device.compile(0).is_err());
    }

    #[test]
    fn test_partitions_and_batches() {
        let backend = GpuBackend::new(Arc::new(HostDevice::new(1 << 20, 4)), 8, 12).unwrap();
        assert_eq!(backend.streams(), 4);
        assert_eq!(backend.partitions(10), vec![0..3, 3..6, 6..9, 9..10]);
        assert_eq!(backend.partitions(2), vec![0..1, 1..2]);

        let batches: Vec<_> = backend.batches(30).collect();
        assert_eq!(batches, vec![0..12, 12..24, 24..30]);
    }

    #[test]
    fn test_zero_memory_device_unavailable() {
        let err = GpuBackend::new(Arc::new(HostDevice::new(0, 1)), 1, 12).unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[test]
    fn test_join_prefers_cancellation() {
        let joined: Vec<JoinResult<()>> = vec![
            Ok(Err(BackendError::KernelLaunch {
                stream: 0,
                reason: "boom".into(),
            })),
            Ok(Err(BackendError::Cancelled)),
        ];
        assert_eq!(join_streams(joined), Err(BackendError::Cancelled));
    }
}
