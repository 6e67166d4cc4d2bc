//! Per-datum world grids and the packed visualisation texture.
//!
//! [`DatumStore`] keeps one world-sized [`DatumGrid`] for each observed
//! datum and a single four-channel [`TextureGrid`] that the renderer
//! uploads. Each texture channel ("visualised slot") may be bound to one
//! observed datum; writes to that datum are normalised into the slot's
//! channel as they arrive.
//!
//! The store never fires its texture listeners on its own. Mutating
//! methods return a [`TextureChange`] and the owner publishes it once
//! any locks around the store are released.
//!
//! The texture is copy-on-write. [`DatumStore::texture_snapshot`] hands
//! out a shared buffer; a later injection clones it first if any
//! snapshot is still alive, so readers never need the store itself.

use std::sync::Arc;

use indexmap::IndexMap;
use tilestream_core::{CellCoord, DatumId, StoreError, WorldDims};

use crate::grid::{DatumGrid, TextureGrid};
use crate::listener::{ListenerSet, Subscription};
use crate::range::DatumRange;

/// Number of visualised slots (texture channels).
pub const VISUALIZED_SLOTS: usize = 4;

/// Value a datum grid holds for cells that have not been loaded yet.
pub const UNLOADED_SENTINEL: u32 = 0xffff;

/// Result of binding a visualised slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotBinding {
    /// The slot now points at a different datum.
    Updated,
    /// The slot was already bound to that datum.
    Exists,
}

/// Whether a store mutation touched the texture.
#[must_use = "an injected texture change must be published to listeners"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureChange {
    /// No visualised channel was written.
    Unchanged,
    /// At least one visualised channel was re-injected.
    Injected,
}

impl TextureChange {
    /// Whether listeners need to hear about this change.
    pub fn is_injected(self) -> bool {
        self == Self::Injected
    }

    fn from_count(injected: usize) -> Self {
        if injected > 0 {
            Self::Injected
        } else {
            Self::Unchanged
        }
    }
}

/// Storage for every observed datum plus the packed texture.
#[derive(Debug)]
pub struct DatumStore {
    world: WorldDims,
    grids: IndexMap<DatumId, DatumGrid>,
    slots: [Option<usize>; VISUALIZED_SLOTS],
    texture: Arc<TextureGrid>,
    texture_listeners: ListenerSet,
}

impl DatumStore {
    /// Create an empty store for a world of the given size.
    pub fn new(world: WorldDims) -> Self {
        Self {
            world,
            grids: IndexMap::new(),
            slots: [None; VISUALIZED_SLOTS],
            texture: Arc::new(TextureGrid::new(world, VISUALIZED_SLOTS)),
            texture_listeners: ListenerSet::new(),
        }
    }

    /// World dimensions.
    pub fn world_dims(&self) -> WorldDims {
        self.world
    }

    /// Observed datums, in observation order.
    pub fn observed_datum_ids(&self) -> Vec<DatumId> {
        self.grids.keys().cloned().collect()
    }

    /// Number of observed datums.
    pub fn observed_count(&self) -> usize {
        self.grids.len()
    }

    /// Replace the observed set.
    ///
    /// Drops every datum grid, unbinds every visualised slot, and
    /// allocates a fresh grid (filled with [`UNLOADED_SENTINEL`]) per
    /// datum. Repeated ids keep their first position. Returns the number
    /// of duplicates dropped.
    pub fn set_observed_datum_ids(&mut self, ids: &[DatumId]) -> usize {
        self.grids.clear();
        self.slots = [None; VISUALIZED_SLOTS];
        let mut duplicates = 0;
        for id in ids {
            if self.grids.contains_key(id) {
                tracing::warn!(datum = %id, "duplicate observed datum ignored");
                duplicates += 1;
                continue;
            }
            self.grids.insert(
                id.clone(),
                DatumGrid::filled(self.world, 1, UNLOADED_SENTINEL),
            );
        }
        duplicates
    }

    /// The grid for an observed datum.
    pub fn grid(&self, datum: &DatumId) -> Option<&DatumGrid> {
        self.grids.get(datum)
    }

    /// The packed texture buffer.
    pub fn texture(&self) -> &TextureGrid {
        &self.texture
    }

    /// A shared copy of the texture as it is now.
    pub fn texture_snapshot(&self) -> Arc<TextureGrid> {
        Arc::clone(&self.texture)
    }

    /// The datum bound to a visualised slot, if any.
    pub fn visualized_datum(&self, slot: usize) -> Option<&DatumId> {
        let index = (*self.slots.get(slot)?)?;
        self.grids.get_index(index).map(|(id, _)| id)
    }

    /// Bind a visualised slot to the observed datum at `observed_index`.
    ///
    /// The datum must have a normalisation range. Binding does not
    /// re-inject; call [`reinject_texture`](Self::reinject_texture) when
    /// this returns [`SlotBinding::Updated`].
    pub fn set_visualized_datum(
        &mut self,
        slot: usize,
        observed_index: usize,
    ) -> Result<SlotBinding, StoreError> {
        if slot >= VISUALIZED_SLOTS {
            return Err(StoreError::SlotOutOfRange {
                slot,
                max: VISUALIZED_SLOTS,
            });
        }
        let Some((datum, _)) = self.grids.get_index(observed_index) else {
            return Err(StoreError::ObservedIndexOutOfRange {
                index: observed_index,
                observed: self.grids.len(),
            });
        };
        DatumRange::for_datum(datum)?;

        if self.slots[slot] == Some(observed_index) {
            return Ok(SlotBinding::Exists);
        }
        self.slots[slot] = Some(observed_index);
        Ok(SlotBinding::Updated)
    }

    /// Write a rectangle of fresh data for one datum and re-inject it into
    /// every slot bound to that datum.
    pub fn update_datum(
        &mut self,
        datum: &DatumId,
        top_left: CellCoord,
        src: &DatumGrid,
    ) -> Result<TextureChange, StoreError> {
        let Some(observed_index) = self.grids.get_index_of(datum) else {
            return Err(StoreError::UnknownDatum(datum.clone()));
        };
        self.grids[observed_index].write_2d(top_left, src)?;

        let slots: Vec<usize> = (0..VISUALIZED_SLOTS)
            .filter(|&slot| self.slots[slot] == Some(observed_index))
            .collect();
        for &slot in &slots {
            self.inject_slot(slot, top_left, src.dims())?;
        }
        Ok(TextureChange::from_count(slots.len()))
    }

    /// Re-inject every bound slot over the whole world.
    pub fn reinject_texture(&mut self) -> Result<TextureChange, StoreError> {
        let mut injected = 0;
        for slot in 0..VISUALIZED_SLOTS {
            if self.slots[slot].is_some() {
                self.inject_slot(slot, CellCoord::ORIGIN, self.world)?;
                injected += 1;
            }
        }
        Ok(TextureChange::from_count(injected))
    }

    /// Handle to the texture listener set.
    pub fn texture_listeners(&self) -> &ListenerSet {
        &self.texture_listeners
    }

    /// Register a callback fired after each published texture change.
    pub fn add_texture_update_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.texture_listeners.add(listener)
    }

    /// Fire the texture listeners if `change` touched the texture.
    pub fn publish(&self, change: TextureChange) {
        if change.is_injected() {
            self.texture_listeners.notify();
        }
    }

    fn inject_slot(
        &mut self,
        slot: usize,
        top_left: CellCoord,
        dims: WorldDims,
    ) -> Result<(), StoreError> {
        let Some(observed_index) = self.slots[slot] else {
            return Ok(());
        };
        let Some((datum, grid)) = self.grids.get_index(observed_index) else {
            tracing::error!(slot, observed_index, "visualised slot points past observed set");
            return Ok(());
        };
        let range = DatumRange::for_datum(datum)?;
        Arc::make_mut(&mut self.texture).inject_2d(slot, grid, top_left, dims, range)?;
        Ok(())
    }
}
