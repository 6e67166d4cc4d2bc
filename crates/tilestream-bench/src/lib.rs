//! Benchmark profiles and utilities for the tilestream cache.
//!
//! Provides pre-built [`CacheConfig`] profiles and viewport paths:
//!
//! - [`reference_profile`]: 1024x1024 world (256 default tiles)
//! - [`stress_profile`]: 4096x4096 world (4096 default tiles)
//! - [`pan_path`]: deterministic viewport walk via seed
//! - [`warm_cache`]: a cache with a view already loaded

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use tilestream_core::{CellCoord, DatumId, WorldDims};
use tilestream_engine::{CacheConfig, RetryBackoff, TiledCache};
use tilestream_test_utils::RandGenFetcher;

/// Viewport size used by the cache benchmarks.
pub const VIEWPORT: WorldDims = WorldDims::new(160, 96);

/// Reference profile: 1024x1024 world, default tiles, prefetch ring 1.
///
/// Retries are disabled so a benchmark never sleeps on backoff.
pub fn reference_profile() -> CacheConfig {
    CacheConfig::new(WorldDims::new(1024, 1024)).with_retry(RetryBackoff::disabled())
}

/// Stress profile: 4096x4096 world with a prefetch ring of 2.
pub fn stress_profile() -> CacheConfig {
    CacheConfig::new(WorldDims::new(4096, 4096))
        .with_prefetch_ring(2)
        .with_retry(RetryBackoff::disabled())
}

/// A cache over `config` fed by a seeded [`RandGenFetcher`], observing
/// only `RandGen` with slot 0 bound to it.
pub fn rand_gen_cache(config: CacheConfig, seed: u64) -> TiledCache {
    let cache = TiledCache::new(config, RandGenFetcher::new(seed)).unwrap();
    cache.set_observed_datum_ids(&[DatumId::RandGen {}]);
    cache.set_visualized_datum_id(0, 0).unwrap();
    cache
}

/// A cache with the viewport at the origin and its ring fully loaded.
pub fn warm_cache(config: CacheConfig, seed: u64) -> TiledCache {
    let cache = rand_gen_cache(config, seed);
    let view = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, VIEWPORT)
        .unwrap();
    view.surroundings.wait().unwrap();
    cache
}

/// Generate a deterministic walk of `steps` viewport origins.
///
/// Each step pans by up to half a viewport in each axis, clamped so the
/// viewport stays inside `world`. Uses a simple hash of the seed.
pub fn pan_path(world: WorldDims, steps: usize, seed: u64) -> Vec<CellCoord> {
    let max_col = world.columns.saturating_sub(VIEWPORT.columns);
    let max_row = world.rows.saturating_sub(VIEWPORT.rows);
    let mut state = seed;
    let mut next = |bound: u32| -> i64 {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % (u64::from(bound) + 1)) as i64 - i64::from(bound / 2)
    };

    let mut at = CellCoord::ORIGIN;
    let mut path = Vec::with_capacity(steps);
    for _ in 0..steps {
        let dc = next(VIEWPORT.columns);
        let dr = next(VIEWPORT.rows);
        at = CellCoord::new(
            (i64::from(at.col) + dc).clamp(0, i64::from(max_col)) as u32,
            (i64::from(at.row) + dr).clamp(0, i64::from(max_row)) as u32,
        );
        path.push(at);
    }
    path
}
