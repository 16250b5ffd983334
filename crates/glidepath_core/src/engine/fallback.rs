use std::sync::Arc;

use crate::error::BackendError;
use crate::model::{BackendKind, PathResults};

use super::SimulationBackend;
use super::cancel::CancellationToken;
use super::plan::RunPlan;

/// Runs the primary backend and, on a recoverable failure, the fallback.
///
/// A recovered failure is logged and recorded in the run summary; the caller
/// only sees an error when both backends fail or the run is cancelled.
#[derive(Debug)]
pub struct FallbackBackend {
    primary: Arc<dyn SimulationBackend>,
    fallback: Arc<dyn SimulationBackend>,
}

impl FallbackBackend {
    pub fn new(primary: Arc<dyn SimulationBackend>, fallback: Arc<dyn SimulationBackend>) -> Self {
        Self { primary, fallback }
    }
}

impl SimulationBackend for FallbackBackend {
    fn kind(&self) -> BackendKind {
        self.primary.kind()
    }

    fn run(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<PathResults, BackendError> {
        let primary = match self.primary.run(plan, cancel) {
            Ok(results) => return Ok(results),
            Err(err) if !err.is_recoverable() => return Err(err),
            Err(err) => err,
        };

        tracing::warn!(
            primary = %self.primary.kind(),
            fallback = %self.fallback.kind(),
            error = %primary,
            "backend failed, falling back"
        );

        match self.fallback.run(plan, cancel) {
            Ok(mut results) => {
                results.summary.fallback_reason = Some(primary.to_string());
                Ok(results)
            }
            Err(BackendError::Cancelled) => Err(BackendError::Cancelled),
            Err(fallback) => Err(BackendError::Exhausted {
                primary: Box::new(primary),
                fallback: Box::new(fallback),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::CpuBackend;
    use crate::market::CapitalMarketAssumptions;
    use crate::model::{AssetClassId, PortfolioAllocation, SimulationParameters};

    #[derive(Debug)]
    struct Failing(BackendError);

    impl SimulationBackend for Failing {
        fn kind(&self) -> BackendKind {
            BackendKind::Gpu
        }

        fn run(&self, _: &RunPlan, _: &CancellationToken) -> Result<PathResults, BackendError> {
            Err(self.0.clone())
        }
    }

    fn small_plan() -> RunPlan {
        let cma = CapitalMarketAssumptions::default_assumptions();
        let alloc = PortfolioAllocation::from_pairs([
            (AssetClassId::US_LARGE_CAP, 0.6),
            (AssetClassId::US_TREASURY_BONDS, 0.4),
        ])
        .unwrap();
        let params = SimulationParameters {
            n_paths: 50,
            years_accumulation: 2,
            years_retirement: 2,
            initial_value: 10_000.0,
            ..Default::default()
        };
        RunPlan::build(&cma, &alloc, &params, &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_recoverable_failure_runs_fallback() {
        let backend = FallbackBackend::new(
            Arc::new(Failing(BackendError::KernelCompile("no compiler".into()))),
            Arc::new(CpuBackend::new(2).unwrap()),
        );
        let results = backend.run(&small_plan(), &CancellationToken::new()).unwrap();
        assert_eq!(results.summary.backend, BackendKind::Cpu);
        assert!(
            results
                .summary
                .fallback_reason
                .as_deref()
                .is_some_and(|r| r.contains("no compiler"))
        );
        assert_eq!(results.n_paths(), 50);
    }

    #[test]
    fn test_cancellation_is_not_recovered() {
        let backend = FallbackBackend::new(
            Arc::new(Failing(BackendError::Cancelled)),
            Arc::new(CpuBackend::new(1).unwrap()),
        );
        let err = backend
            .run(&small_plan(), &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err, BackendError::Cancelled);
    }

    #[test]
    fn test_both_failing_is_exhausted() {
        let backend = FallbackBackend::new(
            Arc::new(Failing(BackendError::Unavailable("absent".into()))),
            Arc::new(Failing(BackendError::WorkerPool("spawn failed".into()))),
        );
        let err = backend
            .run(&small_plan(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, BackendError::Exhausted { .. }));
        assert!(!err.is_recoverable());
    }
}
