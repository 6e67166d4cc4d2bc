//! User-facing [`TiledCache`] API and the dispatcher thread.
//!
//! The cache splits the world into tiles and loads them on demand from
//! a [`TileFetcher`]. Callers ask for a viewport; the tiles it covers
//! are queued at high priority, a ring of neighbours at low priority,
//! and the call blocks until the viewport tiles have resolved.
//!
//! # Architecture
//!
//! ```text
//! Caller thread(s)                         Dispatcher thread
//!     |                                         |
//!     |--ensure_view_and_queue_surroundings()   |
//!     |   lock state                            |
//!     |   demote_all / load_tile (High, Low)    |
//!     |   unlock, wake ------------------------>| lock state
//!     |   block on view LoadHandle              | next_step(): pop, skip stale
//!     |                                         | unlock
//!     |                                         | fetcher.fetch(req)   (no lock)
//!     |                                         | lock state, lock store
//!     |                                         | complete(): check gen, write
//!     |<--LoadCounts via watcher channel--------| unlock
//!     |                                         | texture listeners
//! ```
//!
//! Lock order is scheduler state, then store. Listener callbacks never
//! run under either lock, and no store guard ever leaves the cache:
//! readers get copies or copy-on-write texture snapshots.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;
use tilestream_core::{
    CellCoord, DatumId, FetchError, Generation, StoreError, TileIndex, TileLayout, TilePriority,
    WorldDims,
};
use tilestream_store::{
    DatumGrid, DatumStore, ListenerSet, SlotBinding, Subscription, TextureChange, TextureGrid,
};

use crate::config::{CacheConfig, ConfigError};
use crate::fetch::{FetchRequest, TileFetcher};
use crate::metrics::CacheMetrics;
use crate::scheduler::{NextStep, SchedulerState, TileStatus};
use crate::watcher::{LoadHandle, TileLoadWatcher};

// ── Error types ──────────────────────────────────────────────────

/// Errors from cache operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The datum store rejected the operation.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// The cache has shut down; pending loads will never resolve.
    #[error("cache has shut down")]
    ShutDown,
}

// ── ViewLoad ─────────────────────────────────────────────────────

/// Result of [`TiledCache::ensure_view_and_queue_surroundings`].
#[derive(Debug)]
pub struct ViewLoad {
    /// Viewport tiles loaded.
    pub tiles_updated: usize,
    /// Viewport tiles whose results were discarded by an invalidation.
    pub tiles_invalidated: usize,
    /// Viewport tiles whose fetch failed.
    pub tiles_failed: usize,
    /// Resolves when the prefetch ring has finished loading.
    pub surroundings: LoadHandle,
}

// ── Shared state ─────────────────────────────────────────────────

struct Shared {
    layout: TileLayout,
    prefetch_ring: u32,
    fetcher: Box<dyn TileFetcher>,
    state: Mutex<SchedulerState>,
    wake: Condvar,
    store: RwLock<DatumStore>,
    invalidation_listeners: ListenerSet,
    texture_listeners: ListenerSet,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_store(&self) -> RwLockReadGuard<'_, DatumStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, DatumStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError> {
        if request.datum_ids.is_empty() {
            return Ok(Vec::new());
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch(request))) {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(top_left = %request.top_left, "tile fetcher panicked");
                Err(FetchError::transport("fetcher panicked"))
            }
        }
    }
}

/// Dispatcher main loop. Runs until the scheduler is shut down.
fn run_dispatcher(shared: &Shared) {
    loop {
        let mut state = shared.lock_state();
        let job = loop {
            let now = Instant::now();
            let step = {
                let store = shared.read_store();
                state.next_step(now, &store)
            };
            match step {
                NextStep::Fetch(job) => break job,
                NextStep::Wait(None) => {
                    state = shared.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                NextStep::Wait(Some(due)) => {
                    let timeout = due.saturating_duration_since(now);
                    state = shared
                        .wake
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                NextStep::ShutDown => return,
            }
        };
        drop(state);

        let result = shared.fetch(&job.fetch);

        let mut state = shared.lock_state();
        if state.is_shut_down() {
            return;
        }
        let change = {
            let mut store = shared.write_store();
            state.complete(job, result, &mut store, Instant::now())
        };
        drop(state);
        publish(&shared.texture_listeners, change);
    }
}

fn publish(listeners: &ListenerSet, change: TextureChange) {
    if change.is_injected() {
        listeners.notify();
    }
}

// ── TiledCache ───────────────────────────────────────────────────

/// Tiled, prioritised, generation-checked cache of per-datum world
/// grids.
///
/// One dispatcher thread performs every fetch, one at a time. The cache
/// is `Send + Sync`; share it behind an `Arc` to call it from several
/// threads. Dropping it shuts the dispatcher down.
pub struct TiledCache {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

// Compile-time assertion: TiledCache must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TiledCache>();
};

impl TiledCache {
    /// Validate `config` and start the dispatcher.
    pub fn new(config: CacheConfig, fetcher: impl TileFetcher) -> Result<Self, ConfigError> {
        let layout = config.validate()?;
        let store = DatumStore::new(config.world_dims);
        let texture_listeners = store.texture_listeners().clone();

        let shared = Arc::new(Shared {
            layout,
            prefetch_ring: config.prefetch_ring,
            fetcher: Box::new(fetcher),
            state: Mutex::new(SchedulerState::new(layout, config.retry)),
            wake: Condvar::new(),
            store: RwLock::new(store),
            invalidation_listeners: ListenerSet::new(),
            texture_listeners,
        });

        let worker = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
            .name("tilestream-dispatch".into())
            .spawn(move || run_dispatcher(&worker))
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("dispatcher: {e}"),
            })?;

        tracing::debug!(
            world = %layout.world_dims(),
            tile = %layout.tile_dims(),
            tiles = layout.tile_count(),
            "tiled cache started"
        );
        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Tile geometry.
    pub fn layout(&self) -> &TileLayout {
        &self.shared.layout
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        self.shared.lock_state().generation()
    }

    /// Snapshot of the scheduler counters.
    pub fn metrics(&self) -> CacheMetrics {
        self.shared.lock_state().metrics()
    }

    /// Load state of one tile, or `None` outside the layout.
    pub fn tile_state(&self, tile: TileIndex) -> Option<TileStatus> {
        self.shared.lock_state().status(tile)
    }

    /// Replace the observed datum set.
    ///
    /// Clears all per-datum storage and visualised-slot bindings, then
    /// invalidates. Duplicate ids are dropped with a warning.
    pub fn set_observed_datum_ids(&self, ids: &[DatumId]) {
        {
            let mut state = self.shared.lock_state();
            let mut store = self.shared.write_store();
            store.set_observed_datum_ids(ids);
            state.invalidate();
        }
        self.shared.wake.notify_one();
        self.shared.invalidation_listeners.notify();
    }

    /// The observed datum set, in order.
    pub fn observed_datum_ids(&self) -> Vec<DatumId> {
        self.shared.read_store().observed_datum_ids()
    }

    /// Bind visualised `slot` to the observed datum at `observed_index`.
    ///
    /// On [`SlotBinding::Updated`] the whole texture is re-injected and
    /// the texture listeners fire once.
    pub fn set_visualized_datum_id(
        &self,
        slot: usize,
        observed_index: usize,
    ) -> Result<SlotBinding, CacheError> {
        let (binding, change) = {
            let mut store = self.shared.write_store();
            let binding = store.set_visualized_datum(slot, observed_index)?;
            let change = match binding {
                SlotBinding::Updated => store.reinject_texture()?,
                SlotBinding::Exists => TextureChange::Unchanged,
            };
            (binding, change)
        };
        publish(&self.shared.texture_listeners, change);
        Ok(binding)
    }

    /// Request one tile and attach `watcher` to it.
    ///
    /// A loaded tile reports `Updated` to the watcher at once. A pending
    /// tile gains the watcher, and is promoted if `priority` is higher
    /// than its request's.
    pub fn load_tile(
        &self,
        tile: TileIndex,
        priority: TilePriority,
        watcher: &Arc<TileLoadWatcher>,
    ) -> Result<(), CacheError> {
        let queued = {
            let mut state = self.shared.lock_state();
            if state.is_shut_down() {
                return Err(CacheError::ShutDown);
            }
            state.load_tile(tile, priority, watcher)
        };
        if queued {
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Load the tiles covering `[top_left, top_left + dims)` and queue a
    /// ring of neighbours behind them.
    ///
    /// Any previous high-priority work is demoted first. Blocks until
    /// the viewport tiles resolve; the ring loads in the background and
    /// reports through [`ViewLoad::surroundings`]. The rectangle is
    /// clipped to the world.
    pub fn ensure_view_and_queue_surroundings(
        &self,
        top_left: CellCoord,
        dims: WorldDims,
    ) -> Result<ViewLoad, CacheError> {
        let layout = self.shared.layout;
        let Some(span) = layout.coverage(top_left, dims) else {
            let (_, view) = TileLoadWatcher::new(Vec::new());
            let (_, surroundings) = TileLoadWatcher::new(Vec::new());
            return view_load(view, surroundings);
        };

        let (view, surroundings, queued) = {
            let mut state = self.shared.lock_state();
            if state.is_shut_down() {
                return Err(CacheError::ShutDown);
            }
            state.demote_all();

            let view_tiles: Vec<TileIndex> = layout
                .span_indices(&span)
                .into_iter()
                .filter(|&t| !state.is_loaded(t))
                .collect();
            let ring_tiles: Vec<TileIndex> = layout
                .ring_indices(&span, self.shared.prefetch_ring)
                .into_iter()
                .filter(|&t| !state.is_loaded(t))
                .collect();
            tracing::debug!(
                %top_left,
                %dims,
                view = view_tiles.len(),
                ring = ring_tiles.len(),
                "ensuring view"
            );

            let mut queued = false;
            let (view_watcher, view) = TileLoadWatcher::new(view_tiles.iter().copied());
            for &tile in &view_tiles {
                queued |= state.load_tile(tile, TilePriority::High, &view_watcher);
            }
            let (ring_watcher, surroundings) = TileLoadWatcher::new(ring_tiles.iter().copied());
            for &tile in &ring_tiles {
                queued |= state.load_tile(tile, TilePriority::Low, &ring_watcher);
            }
            (view, surroundings, queued)
        };
        if queued {
            self.shared.wake.notify_one();
        }
        view_load(view, surroundings)
    }

    /// Reset every tile to not-loaded and start a new generation.
    ///
    /// Requests already queued, or waiting out a retry back-off, are
    /// dropped when the dispatcher reaches them; an in-flight result is
    /// discarded. Invalidation listeners fire after the state lock is
    /// released.
    pub fn invalidate(&self) {
        self.shared.lock_state().invalidate();
        // Requests released from back-off must be reported stale now.
        self.shared.wake.notify_one();
        self.shared.invalidation_listeners.notify();
    }

    /// Register a callback fired after every invalidation.
    pub fn add_invalidation_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.invalidation_listeners.add(listener)
    }

    /// Register a callback fired whenever a visualised channel of the
    /// texture changes. Runs on the thread that made the change, which
    /// for tile loads is the dispatcher.
    pub fn add_texture_update_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.texture_listeners.add(listener)
    }

    /// Snapshot of the packed four-channel texture.
    ///
    /// The snapshot is immutable and may be held for as long as the caller
    /// likes. The next tile write copies the texture rather than waiting
    /// on it; take a fresh snapshot after each texture update.
    pub fn texture_source(&self) -> Arc<TextureGrid> {
        self.shared.read_store().texture_snapshot()
    }

    /// Copy of the grid for an observed datum.
    pub fn datum_grid(&self, datum: &DatumId) -> Option<DatumGrid> {
        self.shared.read_store().grid(datum).cloned()
    }

    /// Stop the dispatcher and release every waiter.
    ///
    /// Outstanding loads resolve with [`CacheError::ShutDown`]. Waits
    /// for an in-flight fetch to return. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock_state();
            if !state.is_shut_down() {
                state.shut_down();
                tracing::debug!("tiled cache shutting down");
            }
        }
        self.shared.wake.notify_all();

        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        // A listener running on the dispatcher may trigger the drop.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("dispatcher thread panicked");
        }
    }
}

fn view_load(view: LoadHandle, surroundings: LoadHandle) -> Result<ViewLoad, CacheError> {
    let counts = view.wait()?;
    Ok(ViewLoad {
        tiles_updated: counts.updated,
        tiles_invalidated: counts.invalidated,
        tiles_failed: counts.failed,
        surroundings,
    })
}

impl Drop for TiledCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TiledCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiledCache")
            .field("layout", &self.shared.layout)
            .field("prefetch_ring", &self.shared.prefetch_ring)
            .finish_non_exhaustive()
    }
}
