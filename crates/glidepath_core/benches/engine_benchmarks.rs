//! Criterion benchmarks for the glidepath_core engine backends
//!
//! Run with: cargo bench -p glidepath_core

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glidepath_core::analysis::analyze;
use glidepath_core::config::{AnalysisConfig, EngineConfig};
use glidepath_core::engine::{BackendPreference, SimulationEngine};
use glidepath_core::market::CapitalMarketAssumptions;
use glidepath_core::model::{AssetClassId, PortfolioAllocation, SimulationParameters};
use glidepath_core::portfolio::{PortfolioMapper, RiskTier};

fn engine(backend: BackendPreference) -> SimulationEngine {
    SimulationEngine::new(
        Arc::new(CapitalMarketAssumptions::default_assumptions()),
        EngineConfig {
            backend,
            ..Default::default()
        },
    )
    .unwrap()
}

fn params(n_paths: usize) -> SimulationParameters {
    SimulationParameters {
        n_paths,
        years_accumulation: 30,
        years_retirement: 30,
        initial_value: 100_000.0,
        annual_contribution: 12_000.0,
        withdrawal_rate: 0.04,
        ..Default::default()
    }
}

fn bench_backends(c: &mut Criterion) {
    let allocation = PortfolioAllocation::from_pairs([
        (AssetClassId::US_LARGE_CAP, 0.6),
        (AssetClassId::INTERNATIONAL_DEVELOPED, 0.1),
        (AssetClassId::CORPORATE_BONDS, 0.3),
    ])
    .unwrap();

    let mut group = c.benchmark_group("engine_backends");
    group.sample_size(10);
    for n_paths in [1_000, 10_000] {
        for (name, backend) in [("cpu", BackendPreference::Cpu), ("gpu", BackendPreference::Gpu)] {
            let engine = engine(backend);
            let p = params(n_paths);
            group.bench_with_input(BenchmarkId::new(name, n_paths), &p, |b, p| {
                b.iter(|| engine.run(black_box(&allocation), black_box(p)).unwrap())
            });
        }
    }
    group.finish();
}

fn bench_asset_count(c: &mut Criterion) {
    let engine = engine(BackendPreference::Cpu);
    let mapper = PortfolioMapper::new(engine.assumptions().clone());
    let mut group = c.benchmark_group("asset_count");
    group.sample_size(10);
    for tier in [RiskTier::Conservative, RiskTier::Aggressive] {
        let allocation = mapper.model_portfolio(tier).unwrap();
        let p = params(5_000);
        group.bench_with_input(
            BenchmarkId::new(tier.to_string(), allocation.len()),
            &p,
            |b, p| b.iter(|| engine.run(black_box(&allocation), black_box(p)).unwrap()),
        );
    }
    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let allocation = PortfolioAllocation::from_pairs([
        (AssetClassId::US_LARGE_CAP, 0.7),
        (AssetClassId::CORPORATE_BONDS, 0.3),
    ])
    .unwrap();
    let results = engine(BackendPreference::Cpu)
        .run(&allocation, &params(10_000))
        .unwrap();
    let config = AnalysisConfig::default();
    c.bench_function("analyze_10k_paths", |b| {
        b.iter(|| analyze(black_box(&results), Some(1_000_000.0), &config).unwrap())
    });
}

criterion_group!(benches, bench_backends, bench_asset_count, bench_analysis);
criterion_main!(benches);
