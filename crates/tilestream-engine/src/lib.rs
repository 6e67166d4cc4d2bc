//! Tile scheduler and cache front-end for tilestream.
//!
//! Provides [`TiledCache`], which turns viewport requests into
//! prioritised tile fetches served by a single dispatcher thread, and
//! [`MinimapCache`], a whole-world overview loaded in one pass. Fetch
//! results are generation-checked against invalidations before they
//! reach the datum store.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod fetch;
pub mod metrics;
pub mod minimap;
pub mod queue;
pub mod request;
pub(crate) mod scheduler;
pub mod watcher;

pub use cache::{CacheError, TiledCache, ViewLoad};
pub use config::{CacheConfig, ConfigError, RetryBackoff, DEFAULT_TILE_DIMS};
pub use fetch::{FetchRequest, TileFetcher};
pub use metrics::CacheMetrics;
pub use minimap::{MinimapCache, MinimapFetcher, DEFAULT_MINIMAP_DIMS};
pub use request::{RequestId, TileLoadRequest};
pub use scheduler::TileStatus;
pub use watcher::{LoadCounts, LoadHandle, TileLoadOutcome, TileLoadWatcher};
