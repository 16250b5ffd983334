//! Tests for engine runs across backends
//!
//! These tests verify that:
//! - Identical inputs reproduce identical path arrays on each backend
//! - Worker and stream counts do not change results
//! - CPU and kernel backends agree statistically
//! - Cancelled runs return no results
//! - Engines sharing one kernel backend can run at the same time

use std::sync::Arc;

use super::{balanced, engine, engine_with, reference_params};
use crate::config::EngineConfig;
use crate::engine::{
    BackendPreference, CancellationToken, HostDevice, RunPlan, SimulationBackend, WeightDrift,
};
use crate::error::{BackendError, EngineError};
use crate::model::{AssetClassId, BackendKind, PathResults, PortfolioAllocation, SimulationParameters};

#[derive(Debug)]
struct Unlaunchable;

impl SimulationBackend for Unlaunchable {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn run(&self, _: &RunPlan, _: &CancellationToken) -> Result<PathResults, BackendError> {
        Err(BackendError::KernelLaunch {
            stream: 0,
            reason: "device lost".to_string(),
        })
    }
}

#[test]
fn test_same_seed_reproduces_cpu_run() {
    let engine = engine(BackendPreference::Cpu);
    let params = reference_params(2_000);
    let a = engine.run(&balanced(), &params).unwrap();
    let b = engine.run(&balanced(), &params).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.summary.backend, BackendKind::Cpu);
}

#[test]
fn test_same_seed_reproduces_kernel_run() {
    let engine = engine(BackendPreference::Gpu);
    let params = reference_params(2_000);
    let a = engine.run(&balanced(), &params).unwrap();
    let b = engine.run(&balanced(), &params).unwrap();
    assert_eq!(a.summary.backend, BackendKind::Gpu);
    assert_eq!(a, b);
}

#[test]
fn test_different_seeds_differ() {
    let engine = engine(BackendPreference::Cpu);
    let a = engine.run(&balanced(), &reference_params(500)).unwrap();
    let params = SimulationParameters {
        seed: 7,
        ..reference_params(500)
    };
    let b = engine.run(&balanced(), &params).unwrap();
    assert_ne!(a.retirement_balance, b.retirement_balance);
}

#[test]
fn test_worker_count_does_not_change_results() {
    let params = reference_params(1_001);
    let runs: Vec<PathResults> = [1, 3, 8]
        .into_iter()
        .map(|workers| {
            engine_with(EngineConfig {
                backend: BackendPreference::Cpu,
                cpu_workers: Some(workers),
                ..Default::default()
            })
            .run(&balanced(), &params)
            .unwrap()
        })
        .collect();
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0], runs[2]);
}

#[test]
fn test_stream_count_does_not_change_results() {
    let params = reference_params(1_001);
    let runs: Vec<PathResults> = [(1, 12), (3, 7), (4, 240)]
        .into_iter()
        .map(|(gpu_streams, gpu_batch_months)| {
            engine_with(EngineConfig {
                backend: BackendPreference::Gpu,
                gpu_streams,
                gpu_batch_months,
                ..Default::default()
            })
            .run(&balanced(), &params)
            .unwrap()
        })
        .collect();
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0], runs[2]);
}

#[test]
fn test_backends_agree_statistically() {
    let params = reference_params(20_000);
    let cpu = engine(BackendPreference::Cpu).run(&balanced(), &params).unwrap();
    let gpu = engine(BackendPreference::Gpu).run(&balanced(), &params).unwrap();
    assert_eq!(gpu.summary.backend, BackendKind::Gpu);

    let gap = (cpu.success_probability() - gpu.success_probability()).abs();
    assert!(gap < 0.02, "success probabilities differ by {gap}");

    let median = |v: &[f64]| {
        let mut v = v.to_vec();
        v.sort_by(f64::total_cmp);
        v[v.len() / 2]
    };
    let (c, g) = (median(&cpu.retirement_balance), median(&gpu.retirement_balance));
    assert!((c - g).abs() / c < 0.03, "medians {c} vs {g}");
}

#[test]
fn test_sampled_paths_cover_both_phases() {
    let engine = engine_with(EngineConfig {
        backend: BackendPreference::Cpu,
        sample_paths: 5,
        ..Default::default()
    });
    let params = reference_params(50);
    let results = engine.run(&balanced(), &params).unwrap();
    assert_eq!(results.sampled_paths.len(), 5);
    for (i, path) in results.sampled_paths.iter().enumerate() {
        assert_eq!(path.path_index, i);
        assert_eq!(path.monthly_balances.len(), params.total_months());
        assert_eq!(
            path.monthly_balances[params.accumulation_months() - 1],
            results.retirement_balance[i]
        );
        assert_eq!(*path.monthly_balances.last().unwrap(), results.final_balance[i]);
    }
}

#[test]
fn test_kernel_traces_match_cpu_layout() {
    let engine = engine_with(EngineConfig {
        backend: BackendPreference::Gpu,
        sample_paths: 3,
        ..Default::default()
    });
    let params = reference_params(40);
    let results = engine.run(&balanced(), &params).unwrap();
    assert_eq!(results.sampled_paths.len(), 3);
    for path in &results.sampled_paths {
        assert_eq!(path.monthly_balances.len(), params.total_months());
        assert_eq!(
            *path.monthly_balances.last().unwrap(),
            results.final_balance[path.path_index]
        );
    }
}

#[test]
fn test_tracked_drift_runs_and_differs_from_static() {
    let params = reference_params(500);
    let tracked = engine_with(EngineConfig {
        backend: BackendPreference::Cpu,
        weight_drift: WeightDrift::Tracked,
        ..Default::default()
    })
    .run(&balanced(), &params)
    .unwrap();
    let fixed = engine(BackendPreference::Cpu).run(&balanced(), &params).unwrap();
    assert!(tracked.retirement_balance.iter().all(|b| b.is_finite() && *b > 0.0));
    assert_ne!(tracked.retirement_balance, fixed.retirement_balance);
}

#[test]
fn test_cancelled_run_returns_nothing() {
    for backend in [BackendPreference::Cpu, BackendPreference::Gpu] {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine(backend).run_with_cancel(&balanced(), &reference_params(6_000), &cancel);
        assert_eq!(result, Err(EngineError::Cancelled), "{backend:?}");
        assert_eq!(cancel.completed_paths(), 0);
    }
}

#[test]
fn test_progress_counts_every_path() {
    let cancel = CancellationToken::new();
    engine(BackendPreference::Cpu)
        .run_with_cancel(&balanced(), &reference_params(777), &cancel)
        .unwrap();
    assert_eq!(cancel.completed_paths(), 777);
}

#[test]
fn test_failing_kernel_falls_back_to_cpu() {
    let engine = engine(BackendPreference::Gpu).with_backend(Arc::new(Unlaunchable));
    let params = reference_params(300);
    let results = engine.run(&balanced(), &params).unwrap();
    assert_eq!(results.summary.backend, BackendKind::Cpu);
    let reason = results.summary.fallback_reason.unwrap();
    assert!(reason.contains("device lost"), "{reason}");

    let direct = super::engine(BackendPreference::Cpu).run(&balanced(), &params).unwrap();
    assert_eq!(results.final_balance, direct.final_balance);
}

#[test]
fn test_undersized_device_falls_back_to_cpu() {
    let engine = engine(BackendPreference::Gpu).with_device(Arc::new(HostDevice::new(1_024, 2)));
    let results = engine.run(&balanced(), &reference_params(5_000)).unwrap();
    assert_eq!(results.summary.backend, BackendKind::Cpu);
    assert!(results.summary.fallback_reason.is_some());
}

#[test]
fn test_cloned_engines_run_concurrently_on_kernel() {
    let engine = engine_with(EngineConfig {
        backend: BackendPreference::Gpu,
        gpu_streams: 4,
        ..Default::default()
    });
    let clone = engine.with_assumptions(engine.assumptions().clone());
    let three = PortfolioAllocation::from_pairs([
        (AssetClassId::US_LARGE_CAP, 0.5),
        (AssetClassId::EMERGING_MARKETS, 0.2),
        (AssetClassId::CORPORATE_BONDS, 0.3),
    ])
    .unwrap();
    let one = PortfolioAllocation::from_pairs([(AssetClassId::US_LARGE_CAP, 1.0)]).unwrap();
    let (p3, p1) = (reference_params(900), SimulationParameters {
        seed: 5,
        ..reference_params(400)
    });
    let expected_three = engine.run(&three, &p3).unwrap();
    let expected_one = clone.run(&one, &p1).unwrap();

    for _ in 0..5 {
        let (a, b) = std::thread::scope(|scope| {
            let a = scope.spawn(|| engine.run(&three, &p3));
            let b = scope.spawn(|| clone.run(&one, &p1));
            (a.join().unwrap(), b.join().unwrap())
        });
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.summary.backend, BackendKind::Gpu);
        assert_eq!(b.summary.backend, BackendKind::Gpu);
        assert!(a.summary.fallback_reason.is_none());
        assert_eq!(a, expected_three);
        assert_eq!(b, expected_one);
    }
}
