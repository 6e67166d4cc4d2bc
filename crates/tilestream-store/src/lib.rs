//! Grid storage for the tilestream cache.
//!
//! Holds the world-sized per-datum grids, the packed four-channel
//! visualisation texture fed to the renderer, and the listener registry
//! used to announce texture changes. Nothing here is thread-aware; the
//! engine wraps a [`DatumStore`] in a lock and decides when listeners
//! fire.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod datum_store;
pub mod grid;
pub mod listener;
pub mod range;

pub use datum_store::{
    DatumStore, SlotBinding, TextureChange, UNLOADED_SENTINEL, VISUALIZED_SLOTS,
};
pub use grid::{DatumGrid, Grid, TextureGrid};
pub use listener::{ListenerSet, Subscription};
pub use range::DatumRange;
