//! Storage backend benchmarks.

use cardstore_bench::random_text;
use cardstore_storage::{BackendKind, FileBackend, FlatFileBackend, InMemoryBackend, StorageBackend};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    Runtime::new().unwrap()
}

/// Benchmark InMemoryBackend put operations.
fn bench_inmemory_put(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("inmemory_put");

    for size in [64, 1024, 16 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let backend = InMemoryBackend::new(BackendKind::Primary);
            rt.block_on(backend.open()).unwrap();
            let value = random_text(size);

            b.to_async(&rt).iter(|| async {
                backend.put(black_box("key"), black_box(&value)).await.unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend put and get operations.
fn bench_file(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("file");

    // Use larger sample size for file operations
    group.sample_size(50);

    for size in [256, 4096].iter() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path().join("primary"));
        rt.block_on(backend.open()).unwrap();
        let value = random_text(*size);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("put", size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                backend.put("decks", black_box(&value)).await.unwrap();
            });
        });
        group.bench_with_input(BenchmarkId::new("get", size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(backend.get("decks").await.unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark the flat store, which rewrites its whole file on each put.
fn bench_flat_put(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("flat_put");
    group.sample_size(30);

    for keys in [1usize, 50].iter() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FlatFileBackend::new(temp_dir.path().join("legacy.json"));
        rt.block_on(async {
            backend.open().await.unwrap();
            for i in 0..*keys {
                backend.put(&format!("k{i}"), &random_text(1024)).await.unwrap();
            }
        });
        let value = random_text(1024);

        group.bench_with_input(BenchmarkId::from_parameter(keys), keys, |b, _| {
            b.to_async(&rt).iter(|| async {
                backend.put("backup:user", black_box(&value)).await.unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_inmemory_put, bench_file, bench_flat_put);
criterion_main!(benches);
