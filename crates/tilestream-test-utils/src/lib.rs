//! Test utilities and mock fetchers for tilestream development.
//!
//! Provides deterministic [`TileFetcher`](tilestream_engine::TileFetcher)
//! implementations for driving a cache from tests, wrappers that record,
//! gate or fail fetches, and a tracing subscriber for test output.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fetchers;

pub use fetchers::{
    gated, pattern_value, ConstMinimapFetcher, FailingFetcher, FetchGate, GatedFetcher,
    PatternFetcher, RandGenFetcher, RecordingFetcher,
};

use tilestream_core::{DatumId, WorldDims};
use tilestream_engine::{CacheConfig, TileFetcher, TiledCache};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`. Safe to call from every test; only the first
/// call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A cache over a `world`-sized square world with default tiles,
/// observing only `RandGen`.
pub fn rand_gen_cache(world: u32, fetcher: impl TileFetcher) -> TiledCache {
    rand_gen_cache_with(CacheConfig::new(WorldDims::new(world, world)), fetcher)
}

/// A cache built from `config`, observing only `RandGen`.
pub fn rand_gen_cache_with(config: CacheConfig, fetcher: impl TileFetcher) -> TiledCache {
    init_tracing();
    let cache = TiledCache::new(config, fetcher).expect("test cache config is valid");
    cache.set_observed_datum_ids(&[DatumId::RandGen {}]);
    cache
}
