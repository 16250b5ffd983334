//! Monte Carlo simulation engine
//!
//! A run resolves the allocation and parameters into a [`RunPlan`], selects a
//! backend and advances every path through accumulation and retirement.
//! Paths are independent; each draws from its own seeded random streams.
//!
//! Two backends implement [`SimulationBackend`]:
//! - [`CpuBackend`]: a rayon worker pool, one contiguous partition per worker
//! - [`GpuBackend`]: compute streams with pooled device buffers, driven
//!   through a [`ComputeDevice`]
//!
//! The kernel backend is always wrapped in a [`FallbackBackend`] so a device
//! failure reruns the plan on the CPU instead of failing the request.

mod cancel;
mod cpu;
mod fallback;
mod kernel;
mod plan;
mod state;
mod stream;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{BackendError, EngineError, NumericalError};
use crate::market::CapitalMarketAssumptions;
use crate::model::{BackendKind, PathResults, PortfolioAllocation, SimulationParameters};

pub use cancel::CancellationToken;
pub use cpu::CpuBackend;
pub use fallback::FallbackBackend;
pub use kernel::{
    ComputeDevice, DeviceBuffers, DeviceInfo, GpuBackend, HostDevice, KernelLaunch, KernelPhase,
    MAX_KERNEL_ASSETS,
};
pub use plan::{BLENDED_RETURN_HAIRCUT, RunPlan, WeightDrift};
pub use state::RunState;

/// Path count from which `Auto` prefers the kernel backend
pub const AUTO_KERNEL_MIN_PATHS: usize = 5_000;

/// An execution backend: advances every path of a plan
pub trait SimulationBackend: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Run all paths of `plan`. A cancelled run returns `Cancelled` and no
    /// partial results.
    fn run(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<PathResults, BackendError>;
}

/// Which backend the engine runs plans on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    Cpu,
    Gpu,
    /// Kernel backend for large runs, CPU otherwise
    #[default]
    Auto,
}

/// Entry point for simulation runs against one assumption snapshot
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    assumptions: Arc<CapitalMarketAssumptions>,
    config: EngineConfig,
    cpu: Arc<dyn SimulationBackend>,
    /// Kernel backend with CPU fallback; `None` when no device could be set up
    accelerated: Option<Arc<dyn SimulationBackend>>,
    unavailable: Option<String>,
}

impl SimulationEngine {
    /// Build the configured backends.
    ///
    /// A kernel backend that cannot be created is logged and recorded; runs
    /// that would have used it go to the CPU backend instead.
    pub fn new(
        assumptions: Arc<CapitalMarketAssumptions>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let cpu: Arc<dyn SimulationBackend> =
            Arc::new(CpuBackend::new(config.worker_count()).map_err(EngineError::Backend)?);

        let mut engine = Self {
            assumptions,
            config,
            cpu,
            accelerated: None,
            unavailable: None,
        };
        if engine.config.backend != BackendPreference::Cpu {
            let device = Arc::new(HostDevice::new(
                engine.config.gpu_memory_bytes,
                engine.config.gpu_streams,
            ));
            engine = engine.with_device(device);
        }
        Ok(engine)
    }

    /// Replace the kernel backend's device
    #[must_use]
    pub fn with_device(mut self, device: Arc<dyn ComputeDevice>) -> Self {
        match GpuBackend::new(device, self.config.gpu_streams, self.config.gpu_batch_months) {
            Ok(gpu) => {
                self.accelerated = Some(Arc::new(FallbackBackend::new(
                    Arc::new(gpu),
                    Arc::clone(&self.cpu),
                )));
                self.unavailable = None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "kernel backend unavailable, using cpu");
                self.accelerated = None;
                self.unavailable = Some(err.to_string());
            }
        }
        self
    }

    /// Replace the accelerated backend; it still falls back to the CPU
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn SimulationBackend>) -> Self {
        self.accelerated = Some(Arc::new(FallbackBackend::new(
            backend,
            Arc::clone(&self.cpu),
        )));
        self.unavailable = None;
        self
    }

    /// Same backends over a different snapshot, e.g. a regime shift
    #[must_use]
    pub fn with_assumptions(&self, assumptions: Arc<CapitalMarketAssumptions>) -> Self {
        Self {
            assumptions,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn assumptions(&self) -> &Arc<CapitalMarketAssumptions> {
        &self.assumptions
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate inputs and resolve them into a run plan
    pub fn plan(
        &self,
        allocation: &PortfolioAllocation,
        params: &SimulationParameters,
    ) -> Result<RunPlan, EngineError> {
        RunPlan::build(&self.assumptions, allocation, params, &self.config)
    }

    fn select(&self, n_paths: usize) -> (&Arc<dyn SimulationBackend>, bool) {
        let wants_kernel = match self.config.backend {
            BackendPreference::Cpu => false,
            BackendPreference::Gpu => true,
            BackendPreference::Auto => n_paths >= AUTO_KERNEL_MIN_PATHS,
        };
        match (&self.accelerated, wants_kernel) {
            (Some(backend), true) => (backend, false),
            (_, wants) => (&self.cpu, wants),
        }
    }

    pub fn run(
        &self,
        allocation: &PortfolioAllocation,
        params: &SimulationParameters,
    ) -> Result<PathResults, EngineError> {
        self.run_with_cancel(allocation, params, &CancellationToken::new())
    }

    /// Run one simulation; `cancel` may be triggered from another thread
    pub fn run_with_cancel(
        &self,
        allocation: &PortfolioAllocation,
        params: &SimulationParameters,
        cancel: &CancellationToken,
    ) -> Result<PathResults, EngineError> {
        let plan = self.plan(allocation, params)?;
        let (backend, bypassed) = self.select(plan.n_paths());

        let span = tracing::info_span!(
            "simulation_run",
            n_paths = plan.n_paths(),
            backend = %backend.kind()
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut results = backend.run(&plan, cancel)?;
        if bypassed {
            results.summary.fallback_reason = self.unavailable.clone();
        }
        if !results.is_consistent()
            || results.n_paths() != plan.n_paths()
            || results
                .retirement_balance
                .iter()
                .chain(&results.final_balance)
                .any(|b| !b.is_finite())
        {
            return Err(NumericalError::NonFinite {
                context: "path balances",
            }
            .into());
        }

        tracing::info!(
            assets = plan.n_assets(),
            regime = %plan.regime(),
            success = results.success_probability(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            ran_on = %results.summary.backend,
            "simulation complete"
        );
        Ok(results)
    }
}
