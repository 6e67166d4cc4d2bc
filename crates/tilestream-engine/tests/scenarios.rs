//! End-to-end scenarios for the tiled and minimap caches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tilestream_core::{CellCoord, DatumId, StoreError, TileIndex, TilePriority, WorldDims};
use tilestream_engine::{
    CacheConfig, CacheError, LoadCounts, MinimapCache, RetryBackoff, TileLoadWatcher, TileStatus,
};
use tilestream_store::{DatumRange, SlotBinding};
use tilestream_test_utils::{
    gated, init_tracing, pattern_value, rand_gen_cache, rand_gen_cache_with, ConstMinimapFetcher,
    FailingFetcher, PatternFetcher, RecordingFetcher,
};

fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

// ── Tiled cache ─────────────────────────────────────────────────

#[test]
fn first_view_loads_tile_then_ring() {
    let rec = RecordingFetcher::new(PatternFetcher);
    let cache = rand_gen_cache(200, rec.clone());

    let view = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
        .unwrap();
    assert_eq!(view.tiles_updated, 1);
    assert_eq!(view.tiles_invalidated, 0);
    assert_eq!(view.tiles_failed, 0);

    let first = &rec.requests()[0];
    assert_eq!(first.top_left, CellCoord::ORIGIN);
    assert_eq!(first.dims, WorldDims::new(64, 64));
    assert_eq!(first.datum_ids, vec![DatumId::RandGen {}]);

    let ring = view.surroundings.wait().unwrap();
    assert_eq!(
        ring,
        LoadCounts {
            updated: 3,
            invalidated: 0,
            failed: 0
        }
    );

    let mut ring_origins = rec.origins()[1..].to_vec();
    ring_origins.sort_by_key(|c| (c.row, c.col));
    assert_eq!(
        ring_origins,
        vec![
            CellCoord::new(64, 0),
            CellCoord::new(0, 64),
            CellCoord::new(64, 64)
        ]
    );

    let grid = cache.datum_grid(&DatumId::RandGen {}).unwrap();
    let cell = CellCoord::new(70, 10);
    assert_eq!(grid.value_at(cell), Some(&[pattern_value(cell)][..]));
    for tile in [0, 1, 4, 5] {
        assert_eq!(cache.tile_state(TileIndex(tile)), Some(TileStatus::Loaded));
    }
    assert_eq!(cache.tile_state(TileIndex(2)), Some(TileStatus::NotLoaded));
}

#[test]
fn edge_tiles_are_clamped_to_world() {
    let rec = RecordingFetcher::new(PatternFetcher);
    let cache = rand_gen_cache(100, rec.clone());

    let view = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(100, 100))
        .unwrap();
    assert_eq!(view.tiles_updated, 4);

    let requests = rec.requests();
    let dims_at = |origin: CellCoord| {
        requests
            .iter()
            .find(|r| r.top_left == origin)
            .map(|r| r.dims)
    };
    assert_eq!(dims_at(CellCoord::new(64, 0)), Some(WorldDims::new(36, 64)));
    assert_eq!(dims_at(CellCoord::new(0, 64)), Some(WorldDims::new(64, 36)));
    assert_eq!(dims_at(CellCoord::new(64, 64)), Some(WorldDims::new(36, 36)));

    let grid = cache.datum_grid(&DatumId::RandGen {}).unwrap();
    let corner = CellCoord::new(99, 99);
    assert_eq!(grid.value_at(corner), Some(&[pattern_value(corner)][..]));
}

#[test]
fn view_outside_world_is_empty() {
    let rec = RecordingFetcher::new(PatternFetcher);
    let cache = rand_gen_cache(100, rec.clone());
    let view = cache
        .ensure_view_and_queue_surroundings(CellCoord::new(500, 500), WorldDims::new(10, 10))
        .unwrap();
    assert_eq!(view.tiles_updated, 0);
    assert_eq!(view.surroundings.wait().unwrap().total(), 0);
    assert_eq!(rec.count(), 0);
}

#[test]
fn failed_tile_is_retried_after_backoff() {
    let fetcher = FailingFetcher::new(1, PatternFetcher);
    let calls = fetcher.calls();
    let config = CacheConfig::new(WorldDims::new(64, 64))
        .with_prefetch_ring(0)
        .with_retry(RetryBackoff {
            initial_ms: 200,
            factor: 2.0,
            max_ms: 1000,
        });
    let cache = rand_gen_cache_with(config, fetcher);

    let failed = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
        .unwrap();
    assert_eq!(failed.tiles_failed, 1);
    assert_eq!(failed.tiles_updated, 0);
    assert_eq!(cache.tile_state(TileIndex(0)), Some(TileStatus::NotLoaded));

    let retried = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
        .unwrap();
    assert_eq!(retried.tiles_updated, 1);
    assert_eq!(cache.tile_state(TileIndex(0)), Some(TileStatus::Loaded));

    let metrics = cache.metrics();
    assert_eq!(metrics.tiles_failed, 1);
    assert!(metrics.deferrals >= 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn invalidation_resolves_tiles_waiting_out_backoff() {
    let config = CacheConfig::new(WorldDims::new(64, 64))
        .with_prefetch_ring(0)
        .with_retry(RetryBackoff {
            initial_ms: 3000,
            factor: 2.0,
            max_ms: 5000,
        });
    let cache = rand_gen_cache_with(config, FailingFetcher::new(1, PatternFetcher));
    let failed = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
        .unwrap();
    assert_eq!(failed.tiles_failed, 1);

    let (watcher, mut handle) = TileLoadWatcher::new([TileIndex(0)]);
    cache
        .load_tile(TileIndex(0), TilePriority::High, &watcher)
        .unwrap();
    drop(watcher);
    wait_for("retry to be deferred", || cache.metrics().deferred == 1);

    cache.invalidate();
    let counts = handle.wait_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(
        counts,
        Some(LoadCounts {
            updated: 0,
            invalidated: 1,
            failed: 0
        })
    );
    let metrics = cache.metrics();
    assert_eq!(metrics.deferred, 0);
    assert_eq!(metrics.stale_skipped, 1);
    assert_eq!(cache.tile_state(TileIndex(0)), Some(TileStatus::NotLoaded));
}

#[test]
fn texture_listener_fires_once_per_loaded_tile() {
    let cache = rand_gen_cache_with(
        CacheConfig::new(WorldDims::new(64, 64)).with_prefetch_ring(0),
        PatternFetcher,
    );
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let _sub = cache.add_texture_update_listener(move || {
        h.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(cache.set_visualized_datum_id(0, 0), Ok(SlotBinding::Updated));
    assert_eq!(cache.set_visualized_datum_id(1, 0), Ok(SlotBinding::Updated));
    assert_eq!(cache.set_visualized_datum_id(1, 0), Ok(SlotBinding::Exists));
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let view = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
        .unwrap();
    assert_eq!(view.tiles_updated, 1);
    // Listeners run on the dispatcher after the watcher resolves.
    wait_for("texture update", || hits.load(Ordering::SeqCst) == 3);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let texture = cache.texture_source();
    let cell = CellCoord::new(10, 0);
    let expected = DatumRange::RAND_GEN.normalize(pattern_value(cell));
    let texel = texture.value_at(cell).unwrap();
    assert_eq!(texel[0], expected);
    assert_eq!(texel[1], expected);
    assert_eq!(texel[2], 0.0);
}

#[test]
fn binding_checks_slot_index_and_datum() {
    let cache = rand_gen_cache(64, PatternFetcher);
    cache.set_observed_datum_ids(&[DatumId::RandGen {}, DatumId::selector("word0", "height")]);

    assert!(matches!(
        cache.set_visualized_datum_id(0, 1),
        Err(CacheError::Store(StoreError::UnsupportedDatum(_)))
    ));
    assert!(matches!(
        cache.set_visualized_datum_id(4, 0),
        Err(CacheError::Store(StoreError::SlotOutOfRange { .. }))
    ));
    assert!(matches!(
        cache.set_visualized_datum_id(0, 5),
        Err(CacheError::Store(StoreError::ObservedIndexOutOfRange { .. }))
    ));
    assert_eq!(cache.set_visualized_datum_id(0, 0), Ok(SlotBinding::Updated));
    assert_eq!(cache.set_visualized_datum_id(0, 0), Ok(SlotBinding::Exists));
}

#[test]
fn changing_observed_datums_invalidates() {
    let rec = RecordingFetcher::new(PatternFetcher);
    let cache = rand_gen_cache_with(
        CacheConfig::new(WorldDims::new(64, 64)).with_prefetch_ring(0),
        rec.clone(),
    );
    let fired = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&fired);
    let _sub = cache.add_invalidation_listener(move || {
        f.fetch_add(1, Ordering::SeqCst);
    });

    cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
        .unwrap();
    let before = cache.generation();

    let observed = [DatumId::RandGen {}, DatumId::selector("word1", "moisture")];
    cache.set_observed_datum_ids(&observed);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(cache.generation() > before);
    assert_eq!(cache.observed_datum_ids(), observed.to_vec());
    assert_eq!(cache.tile_state(TileIndex(0)), Some(TileStatus::NotLoaded));

    let view = cache
        .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
        .unwrap();
    assert_eq!(view.tiles_updated, 1);
    assert_eq!(rec.requests()[1].datum_ids, observed.to_vec());
}

#[test]
fn shutdown_releases_blocked_callers() {
    init_tracing();
    let (fetcher, gate) = gated(PatternFetcher);
    let cache = Arc::new(rand_gen_cache(200, fetcher));

    let c = Arc::clone(&cache);
    let waiter = thread::spawn(move || {
        c.ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
            .map(|view| view.tiles_updated)
    });
    gate.expect_started();

    let c = Arc::clone(&cache);
    let stopper = thread::spawn(move || c.shutdown());
    assert_eq!(waiter.join().unwrap(), Err(CacheError::ShutDown));

    // The in-flight fetch must return before the dispatcher can exit.
    drop(gate);
    stopper.join().unwrap();

    assert_eq!(
        cache
            .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(8, 8))
            .map(|view| view.tiles_updated),
        Err(CacheError::ShutDown)
    );
}

// ── Minimap ─────────────────────────────────────────────────────

#[test]
fn minimap_shows_visualized_datum() {
    let minimap = MinimapCache::with_dims(WorldDims::new(10, 10), ConstMinimapFetcher(0x8000));
    minimap
        .set_observed_datum_ids(&[DatumId::RandGen {}])
        .unwrap();
    assert!(minimap.texture_source().as_slice().iter().all(|&v| v == 0.0));

    assert_eq!(minimap.set_visualized_datum_id(0), Ok(SlotBinding::Updated));
    assert!(minimap.texture_source().as_slice().iter().all(|&v| v == 0.5));

    minimap.set_observed_datum_ids(&[]).unwrap();
    assert_eq!(minimap.visualized_datum_id(), None);
    assert!(minimap.texture_source().as_slice().iter().all(|&v| v == 0.0));
}
