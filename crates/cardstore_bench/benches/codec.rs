//! Compression and segmentation benchmarks.

use cardstore_bench::{flashcards, random_text, wordy_text};
use cardstore_codec::{compress, decompress, plan, reassemble, SegmentPlan, SegmentSlot};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::Value;

/// Benchmark compressing text of varying size and redundancy.
fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");

    for size in [256usize, 4 * 1024, 64 * 1024] {
        let wordy = wordy_text(size / 5);
        group.throughput(Throughput::Bytes(wordy.len() as u64));
        group.bench_with_input(BenchmarkId::new("wordy", size), &wordy, |b, text| {
            b.iter(|| black_box(compress(black_box(text))));
        });

        let random = random_text(size);
        group.throughput(Throughput::Bytes(random.len() as u64));
        group.bench_with_input(BenchmarkId::new("random", size), &random, |b, text| {
            b.iter(|| black_box(compress(black_box(text))));
        });
    }

    group.finish();
}

/// Benchmark decompressing previously compressed text.
fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");

    for size in [256usize, 4 * 1024, 64 * 1024] {
        let text = wordy_text(size / 5);
        let payload = compress(&text);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| black_box(decompress(black_box(payload)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark planning and reassembling segmented collections.
fn bench_segments(c: &mut Criterion) {
    let mut group = c.benchmark_group("segments");

    for count in [10usize, 100, 1000] {
        let records = flashcards(count, 8);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("plan", count), &records, |b, records| {
            b.iter(|| black_box(plan(black_box(records), 10, 0).segment_count()));
        });

        let SegmentPlan::Segmented { meta, chunks } = plan(&records, 10, 0) else {
            continue;
        };
        let slots: Vec<SegmentSlot> = chunks
            .iter()
            .map(|chunk| SegmentSlot::Present(Value::Array(chunk.to_vec())))
            .collect();
        group.bench_with_input(BenchmarkId::new("reassemble", count), &slots, |b, slots| {
            b.iter(|| {
                let out = reassemble("flashcards", &meta, slots.clone());
                black_box(out.records.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress, bench_segments);
criterion_main!(benches);
