//! Commit resolver benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use storesync_bench::utils::{chain_graph, layered_graph};
use storesync_core::Actor;
use storesync_engine::{plan, EngineConfig, MutationBatch};
use storesync_testkit::{item_registry, SyncHarness};

/// Benchmark ordering a batch where every create waits on the next.
fn bench_plan_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_chain");
    let registry = item_registry();
    let config = EngineConfig::default();

    for nodes in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*nodes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), nodes, |b, &nodes| {
            let request = chain_graph(nodes).commit_request();
            let batch = MutationBatch::decode(&request, &registry).unwrap();

            b.iter(|| {
                let plan = plan(black_box(&batch.upserts), &config).unwrap();
                black_box(plan);
            });
        });
    }
    group.finish();
}

/// Benchmark ordering layered batches with several references per create.
fn bench_plan_layered(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_layered");
    let registry = item_registry();
    let config = EngineConfig::default();

    for fanout in [2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(fanout), fanout, |b, &fanout| {
            let request = layered_graph(256, fanout).commit_request();
            let batch = MutationBatch::decode(&request, &registry).unwrap();

            b.iter(|| {
                let plan = plan(black_box(&batch.upserts), &config).unwrap();
                black_box(plan);
            });
        });
    }
    group.finish();
}

/// Benchmark a full commit: decode, order, persist and assemble.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.sample_size(20);

    for nodes in [10, 100].iter() {
        group.throughput(Throughput::Elements(*nodes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), nodes, |b, &nodes| {
            let request = layered_graph(nodes, 2).commit_request();

            b.iter(|| {
                let harness = SyncHarness::new(item_registry());
                let response = harness.apply(Actor::anonymous(), black_box(&request));
                assert!(!response.is_error());
                black_box(response);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan_chain, bench_plan_layered, bench_commit);
criterion_main!(benches);
