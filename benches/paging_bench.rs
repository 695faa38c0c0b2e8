//! Benchmarks for the paging provider.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use paging_list::{ItemsProvider, MemorySource, PagingListProvider};

/// A provider with the first 1000 items cached.
fn warm_provider(rt: &tokio::runtime::Runtime) -> PagingListProvider<u64> {
    rt.block_on(async {
        let source = Arc::new(MemorySource::new((0..10_000u64).collect::<Vec<_>>()));
        let provider = PagingListProvider::<u64>::new(source);
        provider.initialize(975).await.unwrap();
        provider
    })
}

fn bench_get_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let provider = warm_provider(&rt);

    c.bench_function("get_item_1k_cached", |b| {
        b.iter(|| {
            for position in 0..1000 {
                black_box(provider.get_item(black_box(position)));
            }
        })
    });

    c.bench_function("size", |b| b.iter(|| black_box(provider.size())));
}

fn bench_load_range_cached(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let provider = warm_provider(&rt);

    c.bench_function("load_range_1k_cached", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(provider.load_range(0, 999).await.unwrap()) })
    });
}

fn bench_cold_walk(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let source = Arc::new(MemorySource::new((0..2_500u64).collect::<Vec<_>>()));

    c.bench_function("initialize_and_walk_2500", |b| {
        b.to_async(&rt).iter(|| async {
            let provider = PagingListProvider::<u64>::new(source.clone());
            provider.initialize(0).await.unwrap();
            black_box(provider.load_range(0, 2_499).await.unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_get_item,
    bench_load_range_cached,
    bench_cold_walk,
);
criterion_main!(benches);
