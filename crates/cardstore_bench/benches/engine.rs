//! Engine facade benchmarks.

use cardstore_bench::flashcards;
use cardstore_core::{EngineConfig, StorageEngine};
use cardstore_storage::{BackendKind, InMemoryBackend};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn engine(config: EngineConfig) -> StorageEngine {
    StorageEngine::new(
        Arc::new(InMemoryBackend::new(BackendKind::Primary)),
        Arc::new(InMemoryBackend::new(BackendKind::Legacy)),
        config,
    )
}

/// Benchmark collection writes, which segment, compress and mirror.
fn bench_put_collection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("put_collection");

    for count in [5usize, 50, 500] {
        let records = flashcards(count, 12);
        let engine = engine(EngineConfig::default());
        rt.block_on(engine.init());

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("critical", count), &records, |b, records| {
            b.to_async(&rt).iter(|| async {
                engine.put_collection("flashcards", records.clone()).await.unwrap();
            });
        });
        group.bench_with_input(BenchmarkId::new("plain", count), &records, |b, records| {
            b.to_async(&rt).iter(|| async {
                engine.put_collection("notes", records.clone()).await.unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark collection reads with and without the cache.
fn bench_get_collection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("get_collection");

    for count in [5usize, 50, 500] {
        let records = flashcards(count, 12);

        let cached = engine(EngineConfig::default());
        rt.block_on(cached.put_collection("flashcards", records.clone())).unwrap();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(BenchmarkId::new("cached", count), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(cached.get_collection("flashcards").await.value.len());
            });
        });

        let uncached = engine(EngineConfig::default().cache_ttl(Duration::ZERO));
        rt.block_on(uncached.put_collection("flashcards", records)).unwrap();
        group.bench_function(BenchmarkId::new("uncached", count), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(uncached.get_collection("flashcards").await.value.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put_collection, bench_get_collection);
criterion_main!(benches);
