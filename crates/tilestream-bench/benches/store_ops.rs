//! Criterion micro-benchmarks for grid copies, texture injection and datum updates.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tilestream_core::{CellCoord, DatumId, WorldDims};
use tilestream_store::{DatumGrid, DatumRange, DatumStore, TextureGrid};

const WORLD: WorldDims = WorldDims::new(1024, 1024);
const TILE: WorldDims = WorldDims::new(64, 64);

fn tile_grid(seed: u32) -> DatumGrid {
    let data = (0..TILE.cell_count() as u32)
        .map(|i| i.wrapping_mul(2_654_435_761).wrapping_add(seed) & 0xffff)
        .collect();
    DatumGrid::from_vec(TILE, 1, data).unwrap()
}

/// Benchmark: Copy one 64x64 tile into a 1024x1024 grid.
fn bench_write_tile(c: &mut Criterion) {
    let mut world = DatumGrid::new(WORLD, 1);
    let tile = tile_grid(1);
    let at = CellCoord::new(512, 256);
    c.bench_function("grid_write_tile_64", |b| {
        b.iter(|| {
            world.write_2d(black_box(at), &tile).unwrap();
        });
    });
    black_box(world.value_at(at));
}

/// Benchmark: Normalise one 64x64 tile into a four-channel texture.
fn bench_inject_tile(c: &mut Criterion) {
    let mut world = DatumGrid::new(WORLD, 1);
    let at = CellCoord::new(512, 256);
    world.write_2d(at, &tile_grid(2)).unwrap();
    let mut texture = TextureGrid::new(WORLD, 4);
    c.bench_function("texture_inject_tile_64", |b| {
        b.iter(|| {
            texture
                .inject_2d(2, &world, black_box(at), TILE, DatumRange::RAND_GEN)
                .unwrap();
        });
    });
    black_box(texture.value_at(at));
}

/// Benchmark: Store update of one tile with two slots bound to the datum.
fn bench_update_datum(c: &mut Criterion) {
    let mut store = DatumStore::new(WORLD);
    store.set_observed_datum_ids(&[DatumId::RandGen {}]);
    for slot in 0..2 {
        store.set_visualized_datum(slot, 0).unwrap();
    }
    let tile = tile_grid(3);
    let datum = DatumId::RandGen {};

    let mut col = 0u32;
    c.bench_function("store_update_datum_2_slots", |b| {
        b.iter(|| {
            let at = CellCoord::new(col, 0);
            let change = store.update_datum(&datum, at, &tile).unwrap();
            black_box(change);
            col = (col + TILE.columns) % WORLD.columns;
        });
    });
}

/// Benchmark: Full re-inject of a 1024x1024 texture after a slot rebind.
fn bench_reinject_texture(c: &mut Criterion) {
    let mut store = DatumStore::new(WORLD);
    store.set_observed_datum_ids(&[DatumId::RandGen {}]);
    store.set_visualized_datum(0, 0).unwrap();
    c.bench_function("store_reinject_1m", |b| {
        b.iter(|| {
            black_box(store.reinject_texture().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_write_tile,
    bench_inject_tile,
    bench_update_datum,
    bench_reinject_texture
);
criterion_main!(benches);
