//! Smoke tests for the facade re-exports.

use tilestream::prelude::*;
use tilestream_test_utils::{ConstMinimapFetcher, PatternFetcher};

#[test]
fn prelude_drives_tiled_cache() {
    let config = CacheConfig::new(WorldDims::new(128, 128));
    let cache = TiledCache::new(config, PatternFetcher).unwrap();
    cache.set_observed_datum_ids(&[DatumId::RandGen {}]);

    let (watcher, handle) = TileLoadWatcher::new([TileIndex(3)]);
    cache
        .load_tile(TileIndex(3), TilePriority::High, &watcher)
        .unwrap();
    drop(watcher);
    assert_eq!(handle.wait().unwrap().updated, 1);
    assert_eq!(cache.tile_state(TileIndex(3)), Some(TileStatus::Loaded));
    assert_eq!(cache.metrics().tiles_updated, 1);
}

#[test]
fn module_paths_reach_sub_crates() {
    let layout = tilestream::types::TileLayout::new(
        WorldDims::new(100, 100),
        tilestream::engine::DEFAULT_TILE_DIMS,
    )
    .unwrap();
    assert_eq!(layout.tile_count(), 4);
    assert_eq!(tilestream::store::VISUALIZED_SLOTS, 4);
}

#[test]
fn prelude_drives_minimap() {
    let minimap = MinimapCache::with_dims(WorldDims::new(4, 4), ConstMinimapFetcher(7));
    minimap.set_observed_datum_ids(&[DatumId::RandGen {}]).unwrap();
    let grid = minimap.for_datum(&DatumId::RandGen {}).unwrap();
    assert_eq!(grid.as_slice(), &[7; 16]);
}
