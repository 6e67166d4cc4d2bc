//! Criterion benchmarks for end-to-end cache loads on the reference profile.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tilestream_bench::{
    pan_path, rand_gen_cache, reference_profile, warm_cache, VIEWPORT,
};
use tilestream_core::CellCoord;

/// Benchmark: First viewport on a cold cache, ring included.
fn bench_cold_view(c: &mut Criterion) {
    c.bench_function("cache_cold_view", |b| {
        b.iter_batched(
            || rand_gen_cache(reference_profile(), 7),
            |cache| {
                let view = cache
                    .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, VIEWPORT)
                    .unwrap();
                black_box(view.surroundings.wait().unwrap());
                cache
            },
            BatchSize::PerIteration,
        );
    });
}

/// Benchmark: Re-ensure of a viewport whose tiles are all loaded.
fn bench_warm_view(c: &mut Criterion) {
    let cache = warm_cache(reference_profile(), 7);
    c.bench_function("cache_warm_view", |b| {
        b.iter(|| {
            let view = cache
                .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, VIEWPORT)
                .unwrap();
            black_box(view.tiles_updated);
        });
    });
}

/// Benchmark: 32-step viewport pan across a cold cache.
fn bench_pan_32(c: &mut Criterion) {
    let profile = reference_profile();
    let path = pan_path(profile.world_dims, 32, 42);
    c.bench_function("cache_pan_32", |b| {
        b.iter_batched(
            || rand_gen_cache(reference_profile(), 7),
            |cache| {
                for &origin in &path {
                    let view = cache
                        .ensure_view_and_queue_surroundings(origin, VIEWPORT)
                        .unwrap();
                    black_box(view.tiles_updated);
                }
                cache
            },
            BatchSize::PerIteration,
        );
    });
}

criterion_group!(benches, bench_cold_view, bench_warm_view, bench_pan_32);
criterion_main!(benches);
