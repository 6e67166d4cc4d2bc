//! Per-datum normalisation ranges.

use tilestream_core::{DatumId, StoreError};

const LARGEST_BELOW_ONE: f32 = 1.0 - f32::EPSILON / 2.0;

/// Half-open value range `[min, max)` used to map raw datum values
/// into `[0, 1)` for the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatumRange {
    min: u32,
    max: u32,
}

impl DatumRange {
    /// Full range of the pseudo-random fill channel (16-bit values).
    pub const RAND_GEN: Self = Self {
        min: 0,
        max: 0x1_0000,
    };

    /// Create a range. `max` must be greater than `min`.
    pub fn new(min: u32, max: u32) -> Self {
        assert!(max > min, "DatumRange requires max > min, got [{min}, {max})");
        Self { min, max }
    }

    /// Normalisation range for a datum kind.
    ///
    /// Selector datums carry no fixed range and cannot be visualised.
    pub fn for_datum(datum: &DatumId) -> Result<Self, StoreError> {
        match datum {
            DatumId::RandGen {} => Ok(Self::RAND_GEN),
            DatumId::Selector(_) => Err(StoreError::UnsupportedDatum(datum.clone())),
        }
    }

    /// Lower bound (inclusive).
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Upper bound (exclusive).
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Clamp `value` into the range and map it to `[0, 1)`.
    pub fn normalize(&self, value: u32) -> f32 {
        let clamped = value.clamp(self.min, self.max - 1);
        let v = ((clamped - self.min) as f64 / (self.max - self.min) as f64) as f32;
        // Wide ranges can round up to 1.0 in f32.
        v.min(LARGEST_BELOW_ONE)
    }
}
