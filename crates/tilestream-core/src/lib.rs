//! Core types for the tilestream cache.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: cell coordinates
//! and world dimensions, datum identifiers, tile indices and generation
//! counters, the [`TileLayout`] geometry that maps cell rectangles onto
//! the tile grid, and the error enums for each subsystem.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod geom;
pub mod id;
pub mod layout;

pub use error::{FetchError, GridError, StoreError};
pub use geom::{CellCoord, WorldDims};
pub use id::{CellComponentSelector, DatumId, Generation, TileIndex, TilePriority};
pub use layout::{TileLayout, TileSpan};
