//! Error types for the tilestream cache.
//!
//! Organised by subsystem: grid copies, the datum store, and the
//! fetch transport. Configuration and cache-lifecycle errors live next
//! to the engine types that raise them.

use thiserror::Error;

use crate::geom::{CellCoord, WorldDims};
use crate::id::DatumId;

/// Errors from rectangular grid copies.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GridError {
    /// Source and destination store a different number of channels per
    /// cell, so their elements have different widths.
    #[error("channel mismatch: destination has {dst} channels, source has {src}")]
    ChannelMismatch {
        /// Channels per cell in the destination.
        dst: usize,
        /// Channels per cell in the source.
        src: usize,
    },
    /// The rectangle does not fit inside the grid.
    #[error("rectangle {dims} at {top_left} exceeds grid bounds {bounds}")]
    OutOfBounds {
        /// Top-left of the offending rectangle.
        top_left: CellCoord,
        /// Size of the offending rectangle.
        dims: WorldDims,
        /// Dimensions of the grid.
        bounds: WorldDims,
    },
    /// A backing buffer does not have `cells * channels` elements.
    #[error("buffer length {actual} does not match expected {expected}")]
    LengthMismatch {
        /// Required element count.
        expected: usize,
        /// Supplied element count.
        actual: usize,
    },
}

/// Errors from the per-datum store and its visualisation slots.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The datum is not part of the observed set.
    #[error("datum {0} is not observed")]
    UnknownDatum(DatumId),
    /// The datum kind has no normalisation range and cannot be
    /// visualised.
    #[error("datum {0} has no normalisation range")]
    UnsupportedDatum(DatumId),
    /// Visualised slot index is outside `0..4`.
    #[error("visualised slot {slot} out of range (max {max})")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Number of available slots.
        max: usize,
    },
    /// Observed-datum index is outside the observed set.
    #[error("observed index {index} out of range ({observed} datums observed)")]
    ObservedIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Size of the observed set.
        observed: usize,
    },
    /// A grid copy failed.
    #[error("grid: {0}")]
    Grid(#[from] GridError),
}

/// Errors from fetching tile or minimap data.
///
/// These are recoverable: the dispatcher reports them to watchers as a
/// failed tile and keeps draining its queues.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The transport could not complete the request.
    #[error("transport failure: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },
    /// The response did not match the request (wrong datum count or
    /// grid size).
    #[error("malformed response: {reason}")]
    Malformed {
        /// Description of the mismatch.
        reason: String,
    },
}

impl FetchError {
    /// Shorthand for a transport failure.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Shorthand for a malformed response.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
