//! Tilestream: a tiled spatial-data streaming cache.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! tilestream sub-crates. For most users, adding `tilestream` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use tilestream::prelude::*;
//!
//! // A fetcher that fills every datum with a constant.
//! let fetcher = |req: &FetchRequest| -> Result<Vec<DatumGrid>, FetchError> {
//!     Ok(req
//!         .datum_ids
//!         .iter()
//!         .map(|_| DatumGrid::filled(req.dims, 1, 0x8000))
//!         .collect())
//! };
//!
//! // A 200x200 world in 64x64 tiles.
//! let cache = TiledCache::new(CacheConfig::new(WorldDims::new(200, 200)), fetcher).unwrap();
//! cache.set_observed_datum_ids(&[DatumId::RandGen {}]);
//! cache.set_visualized_datum_id(0, 0).unwrap();
//!
//! let view = cache
//!     .ensure_view_and_queue_surroundings(CellCoord::ORIGIN, WorldDims::new(64, 64))
//!     .unwrap();
//! assert_eq!(view.tiles_updated, 1);
//! assert_eq!(view.surroundings.wait().unwrap().updated, 3);
//!
//! let texel = cache.texture_source().value_at(CellCoord::new(10, 10)).unwrap()[0];
//! assert_eq!(texel, 0.5);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tilestream-core` | Coordinates, IDs, tile layout, error types |
//! | [`store`] | `tilestream-store` | Grids, the datum store, listener sets |
//! | [`engine`] | `tilestream-engine` | Tiled cache, scheduler types, minimap |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and IDs (`tilestream-core`).
///
/// Contains cell coordinates, world and tile dimensions, datum and tile
/// identifiers, and the shared error types.
pub use tilestream_core as types;

/// Grid storage and the datum store (`tilestream-store`).
///
/// [`store::DatumStore`] owns one [`store::DatumGrid`] per observed datum
/// and the packed four-channel texture.
pub use tilestream_store as store;

/// Tile scheduling and cache front-ends (`tilestream-engine`).
///
/// [`engine::TiledCache`] for on-demand tile loading,
/// [`engine::MinimapCache`] for a downsampled whole-world view.
pub use tilestream_engine as engine;

/// Common imports for typical tilestream usage.
///
/// ```rust
/// use tilestream::prelude::*;
/// ```
///
/// This imports the cache front-ends, their configuration, the fetcher
/// traits, and the coordinate and identifier types they take.
pub mod prelude {
    // Core types
    pub use tilestream_core::{CellCoord, DatumId, TileIndex, TilePriority, WorldDims};

    // Errors
    pub use tilestream_core::{FetchError, StoreError};

    // Store
    pub use tilestream_store::{DatumGrid, SlotBinding, Subscription, TextureGrid};

    // Engine
    pub use tilestream_engine::{
        CacheConfig, CacheError, CacheMetrics, FetchRequest, LoadCounts, MinimapCache,
        MinimapFetcher, TileFetcher, TileLoadWatcher, TileStatus, TiledCache, ViewLoad,
    };
}
