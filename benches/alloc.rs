//! Benchmarks for the slab allocator hot paths and the segmented sort

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use segmem::{BlockAlloc, CheckedAlloc, LongVec, SlabAlloc};

fn benchmark_allocate_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_free");

    for size in [16usize, 100, 1024, 8192, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut alloc = SlabAlloc::new();
            b.iter(|| {
                let addr = alloc.try_allocate(black_box(size)).unwrap();
                alloc.free(addr).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_checked_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("checked_allocate_free");

    for size in [16usize, 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut alloc = CheckedAlloc::new();
            b.iter(|| {
                let addr = alloc.try_allocate(black_box(size)).unwrap();
                alloc.free(addr).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_burst_reuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst_reuse");

    // Allocate a burst, free it all, repeat; exercises the free-segment pool
    group.bench_function("burst_1000x256", |b| {
        let mut alloc = SlabAlloc::new();
        let mut addrs = Vec::with_capacity(1000);
        b.iter(|| {
            for _ in 0..1000 {
                addrs.push(alloc.try_allocate(256).unwrap());
            }
            for addr in addrs.drain(..) {
                alloc.free(addr).unwrap();
            }
        });
    });

    group.finish();
}

fn benchmark_vector_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_resize");

    for len in [1000usize, 100_000, 1_000_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            b.iter(|| {
                let mut v = LongVec::new();
                v.try_resize(black_box(len)).unwrap();
                black_box(v.len());
            });
        });
    }

    group.finish();
}

fn benchmark_segmented_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmented_sort");
    group.sample_size(10);

    for len in [100_000usize, 1_000_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            b.iter(|| {
                let mut v = LongVec::new();
                v.try_resize(len).unwrap();
                for i in 0..len {
                    v.set(i, (len - i) as i64);
                }
                v.sort();
                black_box(v.get(0));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_allocate_free,
    benchmark_checked_overhead,
    benchmark_burst_reuse,
    benchmark_vector_resize,
    benchmark_segmented_sort
);

criterion_main!(benches);
