//! Cache configuration, validation, and error types.
//!
//! [`CacheConfig`] is the input for constructing a
//! [`TiledCache`](crate::cache::TiledCache).
//! [`validate()`](CacheConfig::validate) checks the structural
//! invariants and returns the resolved [`TileLayout`].

use std::time::Duration;

use thiserror::Error;
use tilestream_core::{TileLayout, WorldDims};

/// Default tile size in cells.
pub const DEFAULT_TILE_DIMS: WorldDims = WorldDims::new(64, 64);

// ── RetryBackoff ───────────────────────────────────────────────────

/// Exponential back-off applied to tiles whose fetches keep failing.
///
/// After the `n`th consecutive failure of a tile, its next fetch is
/// deferred by `initial_ms * factor^(n-1)`, capped at `max_ms`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryBackoff {
    /// Delay after the first failure, in milliseconds. Default: 50.
    pub initial_ms: u64,
    /// Multiplier applied per additional failure. Default: 2.0.
    pub factor: f64,
    /// Upper bound on the delay, in milliseconds. Default: 5000.
    pub max_ms: u64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial_ms: 50,
            factor: 2.0,
            max_ms: 5000,
        }
    }
}

impl RetryBackoff {
    /// Back-off that never delays a retry.
    pub fn disabled() -> Self {
        Self {
            initial_ms: 0,
            factor: 1.0,
            max_ms: 0,
        }
    }

    /// Delay before the next attempt after `failures` consecutive
    /// failures. Zero failures means no delay.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let ms = (self.initial_ms as f64 * self.factor.powi(exponent)).min(self.max_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while building a cache.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// World has zero columns or rows.
    #[error("world dimensions {0} cover no cells")]
    EmptyWorld(WorldDims),
    /// Tile has zero columns or rows.
    #[error("tile dimensions {0} cover no cells")]
    EmptyTile(WorldDims),
    /// The tile grid has more tiles than a `TileIndex` can address.
    #[error("tile count {value} exceeds u32::MAX")]
    TileCountOverflow {
        /// The tile count that overflowed.
        value: u64,
    },
    /// [`RetryBackoff`] invariant violated.
    #[error("invalid retry backoff: {reason}")]
    InvalidBackoff {
        /// Which invariant was violated.
        reason: String,
    },
    /// The dispatcher thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// The OS error.
        reason: String,
    },
}

// ── CacheConfig ────────────────────────────────────────────────────

/// Complete configuration for a tiled cache.
///
/// Tile size trades over-fetch against round trips: 64×64 is the
/// default and 256×256 suits high-latency links.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    /// World size in cells. Fixed for the cache's lifetime.
    pub world_dims: WorldDims,
    /// Tile size in cells. Default: 64×64.
    pub tile_dims: WorldDims,
    /// Width, in tiles, of the low-priority ring queued around each
    /// view. Default: 1. Zero disables prefetch.
    pub prefetch_ring: u32,
    /// Retry back-off for failing tiles.
    pub retry: RetryBackoff,
}

impl CacheConfig {
    /// Defaults for a world of the given size.
    pub fn new(world_dims: WorldDims) -> Self {
        Self {
            world_dims,
            tile_dims: DEFAULT_TILE_DIMS,
            prefetch_ring: 1,
            retry: RetryBackoff::default(),
        }
    }

    /// Replace the tile size.
    pub fn with_tile_dims(mut self, tile_dims: WorldDims) -> Self {
        self.tile_dims = tile_dims;
        self
    }

    /// Replace the prefetch ring width.
    pub fn with_prefetch_ring(mut self, prefetch_ring: u32) -> Self {
        self.prefetch_ring = prefetch_ring;
        self
    }

    /// Replace the retry back-off.
    pub fn with_retry(mut self, retry: RetryBackoff) -> Self {
        self.retry = retry;
        self
    }

    /// Validate all structural invariants and resolve the tile layout.
    pub fn validate(&self) -> Result<TileLayout, ConfigError> {
        // 1. World and tile must cover at least one cell.
        if self.world_dims.is_empty() {
            return Err(ConfigError::EmptyWorld(self.world_dims));
        }
        if self.tile_dims.is_empty() {
            return Err(ConfigError::EmptyTile(self.tile_dims));
        }
        // 2. Every tile must be addressable by a u32 index.
        let columns = u64::from(self.world_dims.columns.div_ceil(self.tile_dims.columns));
        let rows = u64::from(self.world_dims.rows.div_ceil(self.tile_dims.rows));
        let tiles = columns * rows;
        if tiles > u64::from(u32::MAX) {
            return Err(ConfigError::TileCountOverflow { value: tiles });
        }
        // 3. Back-off invariants.
        let r = &self.retry;
        if !r.factor.is_finite() || r.factor < 1.0 {
            return Err(ConfigError::InvalidBackoff {
                reason: format!("factor must be finite and >= 1.0, got {}", r.factor),
            });
        }
        if r.max_ms < r.initial_ms {
            return Err(ConfigError::InvalidBackoff {
                reason: format!(
                    "initial_ms ({}) exceeds max_ms ({})",
                    r.initial_ms, r.max_ms,
                ),
            });
        }

        TileLayout::new(self.world_dims, self.tile_dims)
            .ok_or(ConfigError::EmptyWorld(self.world_dims))
    }
}
