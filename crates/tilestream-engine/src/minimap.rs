//! Whole-world overview at reduced resolution.
//!
//! [`MinimapCache`] keeps one downsampled grid per observed datum and a
//! single-channel texture for the datum currently shown. It is loaded
//! all at once rather than tile by tile: every invalidation refetches
//! each observed datum from the [`MinimapFetcher`] on the calling
//! thread.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tilestream_core::{CellCoord, DatumId, FetchError, Generation, StoreError, WorldDims};
use tilestream_store::{
    DatumGrid, DatumRange, ListenerSet, SlotBinding, Subscription, TextureGrid,
};

/// Default minimap size in cells.
pub const DEFAULT_MINIMAP_DIMS: WorldDims = WorldDims::new(250, 250);

/// Source of minimap data.
///
/// Returns one single-channel grid of exactly `dims` for `datum`.
/// Implemented for closures of the same shape.
pub trait MinimapFetcher: Send + Sync + 'static {
    /// Fetch the downsampled grid for one datum.
    fn fetch_minimap(&self, dims: WorldDims, datum: &DatumId) -> Result<DatumGrid, FetchError>;
}

impl<F> MinimapFetcher for F
where
    F: Fn(WorldDims, &DatumId) -> Result<DatumGrid, FetchError> + Send + Sync + 'static,
{
    fn fetch_minimap(&self, dims: WorldDims, datum: &DatumId) -> Result<DatumGrid, FetchError> {
        self(dims, datum)
    }
}

struct MinimapState {
    observed: Vec<DatumId>,
    grids: IndexMap<DatumId, DatumGrid>,
    visualized: Option<usize>,
    texture: Arc<TextureGrid>,
    generation: Generation,
}

impl MinimapState {
    /// Rewrite the texture from the visualised datum, or clear it.
    fn resync_texture(&mut self, dims: WorldDims) -> Result<(), StoreError> {
        let shown = self
            .visualized
            .and_then(|i| self.observed.get(i))
            .and_then(|datum| Some((datum, self.grids.get(datum)?)));
        match shown {
            Some((datum, grid)) => {
                let range = DatumRange::for_datum(datum)?;
                Arc::make_mut(&mut self.texture)
                    .inject_2d(0, grid, CellCoord::ORIGIN, dims, range)?;
            }
            None => Arc::make_mut(&mut self.texture).fill(0.0),
        }
        Ok(())
    }
}

/// Downsampled whole-world cache.
pub struct MinimapCache {
    dims: WorldDims,
    fetcher: Box<dyn MinimapFetcher>,
    state: RwLock<MinimapState>,
    refresh_listeners: ListenerSet,
}

impl MinimapCache {
    /// A minimap of [`DEFAULT_MINIMAP_DIMS`].
    pub fn new(fetcher: impl MinimapFetcher) -> Self {
        Self::with_dims(DEFAULT_MINIMAP_DIMS, fetcher)
    }

    /// A minimap of the given size.
    pub fn with_dims(dims: WorldDims, fetcher: impl MinimapFetcher) -> Self {
        Self {
            dims,
            fetcher: Box::new(fetcher),
            state: RwLock::new(MinimapState {
                observed: Vec::new(),
                grids: IndexMap::new(),
                visualized: None,
                texture: Arc::new(TextureGrid::new(dims, 1)),
                generation: Generation::default(),
            }),
            refresh_listeners: ListenerSet::new(),
        }
    }

    /// Minimap size in cells.
    pub fn dims(&self) -> WorldDims {
        self.dims
    }

    fn read(&self) -> RwLockReadGuard<'_, MinimapState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MinimapState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the observed datums and refetch them all.
    pub fn set_observed_datum_ids(&self, ids: &[DatumId]) -> Result<(), FetchError> {
        {
            let mut state = self.write();
            state.observed.clear();
            for id in ids {
                if state.observed.contains(id) {
                    tracing::warn!(datum = %id, "duplicate minimap datum ignored");
                    continue;
                }
                state.observed.push(id.clone());
            }
            state.visualized = None;
        }
        self.invalidate()
    }

    /// The observed datums, in order.
    pub fn observed_datum_ids(&self) -> Vec<DatumId> {
        self.read().observed.clone()
    }

    /// Drop every grid and refetch each observed datum.
    ///
    /// Blocks for the duration of the fetches. The state lock is not
    /// held while fetching; if the observed set changes meanwhile, the
    /// results are discarded. Refresh listeners fire once the new grids
    /// are installed.
    pub fn invalidate(&self) -> Result<(), FetchError> {
        let (generation, observed) = {
            let mut state = self.write();
            state.generation = state.generation.next();
            state.grids.clear();
            (state.generation, state.observed.clone())
        };

        let mut grids = IndexMap::with_capacity(observed.len());
        for datum in observed {
            let grid = self.fetcher.fetch_minimap(self.dims, &datum).inspect_err(|err| {
                tracing::warn!(%datum, error = %err, "minimap fetch failed");
            })?;
            if grid.dims() != self.dims || grid.channels() != 1 {
                return Err(FetchError::malformed(format!(
                    "minimap for {datum} is {} with {} channels, expected {} with 1",
                    grid.dims(),
                    grid.channels(),
                    self.dims
                )));
            }
            grids.insert(datum, grid);
        }

        {
            let mut state = self.write();
            if state.generation != generation {
                tracing::debug!(%generation, current = %state.generation, "stale minimap discarded");
                return Ok(());
            }
            state.grids = grids;
            if let Err(err) = state.resync_texture(self.dims) {
                tracing::error!(error = %err, "minimap texture resync failed");
            }
        }
        self.refresh_listeners.notify();
        Ok(())
    }

    /// Show the observed datum at `observed_index`.
    pub fn set_visualized_datum_id(
        &self,
        observed_index: usize,
    ) -> Result<SlotBinding, StoreError> {
        {
            let mut state = self.write();
            let Some(datum) = state.observed.get(observed_index) else {
                return Err(StoreError::ObservedIndexOutOfRange {
                    index: observed_index,
                    observed: state.observed.len(),
                });
            };
            DatumRange::for_datum(datum)?;
            if state.visualized == Some(observed_index) {
                return Ok(SlotBinding::Exists);
            }
            state.visualized = Some(observed_index);
            state.resync_texture(self.dims)?;
        }
        self.refresh_listeners.notify();
        Ok(SlotBinding::Updated)
    }

    /// The visualised datum, if any.
    pub fn visualized_datum_id(&self) -> Option<DatumId> {
        let state = self.read();
        state.visualized.and_then(|i| state.observed.get(i).cloned())
    }

    /// Copy of the fetched grid for `datum`.
    pub fn for_datum(&self, datum: &DatumId) -> Option<DatumGrid> {
        self.read().grids.get(datum).cloned()
    }

    /// Snapshot of the single-channel texture. Later resyncs copy the
    /// buffer instead of changing what the snapshot shows.
    pub fn texture_source(&self) -> Arc<TextureGrid> {
        Arc::clone(&self.read().texture)
    }

    /// Register a callback fired after the texture or grids change.
    pub fn add_refresh_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.refresh_listeners.add(listener)
    }
}

impl fmt::Debug for MinimapCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("MinimapCache")
            .field("dims", &self.dims)
            .field("observed", &state.observed)
            .field("visualized", &state.visualized)
            .finish_non_exhaustive()
    }
}
