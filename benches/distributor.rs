//! Benchmarks for chunk allocation and the engine hooks.
//!
//! Run with: cargo bench -- distributor
//!
//! These benchmarks measure:
//! - Chunk-parameter computation per policy
//! - Single-thread drain throughput, atomic vs locked cursor
//! - Contended drain throughput on a thread team
//! - Hook overhead (schedule_parameter + begin + end)

use bosched::{
    BoschedConfig, Distributor, Engine, IterationSpace, Policy, RegionId, Schedule,
    ScheduleParameters, ThreadTeam,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const POLICIES: [Policy; 5] = [
    Policy::Fac2,
    Policy::Fss,
    Policy::Tss,
    Policy::Css,
    Policy::Tape,
];

fn create_engine(dir: &tempfile::TempDir) -> Engine {
    Engine::init(BoschedConfig {
        program: "bench".to_string(),
        state_dir: dir.path().to_path_buf(),
        seed: Some(1),
        ..Default::default()
    })
    .expect("failed to create engine")
}

// =============================================================================
// Chunk Algorithm Benchmarks
// =============================================================================

/// Benchmark computing schedule parameters at region entry
fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute");

    for policy in POLICIES {
        group.bench_with_input(
            BenchmarkId::new("adaptive", policy),
            &policy,
            |b, &policy| {
                b.iter(|| {
                    ScheduleParameters::compute(
                        Schedule::adaptive(policy),
                        black_box(0.5),
                        black_box(1_000_000),
                        8,
                    )
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// Distribution Benchmarks
// =============================================================================

/// Benchmark draining a region from one thread
fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");
    let tasks = 100_000u64;
    group.throughput(Throughput::Elements(tasks));

    for policy in POLICIES {
        group.bench_with_input(BenchmarkId::new("atomic", policy), &policy, |b, &policy| {
            b.iter(|| {
                let dist = Distributor::new(
                    Schedule::adaptive(policy),
                    0.5,
                    IterationSpace::upto(tasks),
                    8,
                );
                let mut count = 0u64;
                while let Some(chunk) = dist.next() {
                    count += chunk.len();
                }
                black_box(count)
            });
        });

        group.bench_with_input(BenchmarkId::new("locked", policy), &policy, |b, &policy| {
            b.iter(|| {
                let dist = Distributor::new(
                    Schedule::adaptive(policy),
                    0.5,
                    IterationSpace::upto(tasks),
                    8,
                )
                .with_locked_cursor();
                let mut count = 0u64;
                while let Some(chunk) = dist.next() {
                    count += chunk.len();
                }
                black_box(count)
            });
        });
    }

    group.finish();
}

/// Benchmark a full region execution on a thread team
fn bench_team(c: &mut Criterion) {
    let mut group = c.benchmark_group("team");
    let dir = tempfile::tempdir().expect("failed to create state dir");
    let engine = create_engine(&dir);
    let team = ThreadTeam::new("bench", 4).expect("failed to create team");
    let tasks = 1u64 << 16;
    group.throughput(Throughput::Elements(tasks));

    for policy in POLICIES {
        group.bench_with_input(BenchmarkId::new("run", policy), &policy, |b, &policy| {
            b.iter(|| {
                team.run(
                    &engine,
                    RegionId(1),
                    Schedule::adaptive(policy),
                    IterationSpace::upto(tasks),
                    |chunk| {
                        black_box(chunk.values().sum::<i64>());
                    },
                );
            });
        });
    }

    group.finish();
}

// =============================================================================
// Hook Benchmarks
// =============================================================================

/// Benchmark the per-execution hook cycle without any loop body
fn bench_hooks(c: &mut Criterion) {
    let mut group = c.benchmark_group("hooks");
    let dir = tempfile::tempdir().expect("failed to create state dir");
    let engine = create_engine(&dir);

    group.bench_function("warmup_cycle", |b| {
        let region = RegionId(7);
        b.iter(|| {
            let param = engine.schedule_parameter(region, true);
            engine.schedule_begin(region, 1000, 8);
            engine.schedule_end(region);
            black_box(param)
        });
    });

    group.bench_function("non_adaptive_cycle", |b| {
        let region = RegionId(8);
        b.iter(|| {
            let param = engine.schedule_parameter(region, false);
            engine.schedule_begin(region, 1000, 8);
            engine.schedule_end(region);
            black_box(param)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_compute, bench_drain, bench_team, bench_hooks);
criterion_main!(benches);
