//! Eager expansion and refresh benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use storesync_bench::utils::seed_category_chain;
use storesync_core::Actor;
use storesync_protocol::SyncRequest;
use storesync_testkit::{library_registry, seed_books, SyncHarness};

/// Benchmark refreshing the root of a category chain, which eagerly pulls
/// in the whole chain.
fn bench_expand_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_chain");

    for depth in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let harness = SyncHarness::new(library_registry());
            let ids = seed_category_chain(&harness.store, depth);
            let request =
                SyncRequest::default().with_refresh("category", "Category", [ids[0].as_u64()]);

            b.iter(|| {
                let response = harness.apply(Actor::anonymous(), black_box(&request));
                black_box(response);
            });
        });
    }
    group.finish();
}

/// Benchmark refreshing many books at once.
fn bench_refresh_books(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_books");

    for count in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let harness = SyncHarness::new(library_registry());
            let ids: Vec<u64> = seed_books(&harness.store, count)
                .into_iter()
                .map(|id| id.as_u64())
                .collect();
            let request = SyncRequest::default().with_refresh("book", "Book", ids);

            b.iter(|| {
                let response = harness.apply(Actor::anonymous(), black_box(&request));
                black_box(response);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_expand_chain, bench_refresh_books);
criterion_main!(benches);
