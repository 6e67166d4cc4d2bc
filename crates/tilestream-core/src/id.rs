//! Strongly-typed identifiers: datums, tiles, generations.

use std::fmt;

/// Selects one component of a cell's generated state.
///
/// `word` names the packed storage word and `component` the bit-field
/// inside it (e.g. `word0` / `elevation`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellComponentSelector {
    /// Storage word holding the component.
    pub word: String,
    /// Component name within the word.
    pub component: String,
}

impl CellComponentSelector {
    /// Build a selector from a word and component name.
    pub fn new(word: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            component: component.into(),
        }
    }
}

/// Identifies one independently tracked data channel over the world grid.
///
/// With the `serde` feature enabled this uses external tagging, so
/// `RandGen {}` is encoded as `{"RandGen":{}}` and a selector as
/// `{"Selector":{"word":"..","component":".."}}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DatumId {
    /// The pseudo-random fill channel produced at world creation.
    RandGen {},
    /// A component of the generated cell state.
    Selector(CellComponentSelector),
}

impl DatumId {
    /// Shorthand for a selector datum.
    pub fn selector(word: impl Into<String>, component: impl Into<String>) -> Self {
        Self::Selector(CellComponentSelector::new(word, component))
    }
}

impl fmt::Display for DatumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RandGen {} => write!(f, "RandGen"),
            Self::Selector(sel) => write!(f, "Selector({}.{})", sel.word, sel.component),
        }
    }
}

/// Flat index of a tile: `row * tile_columns + column`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileIndex(pub u32);

impl TileIndex {
    /// The index as a `usize`, for table lookups.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TileIndex {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Epoch of the observed data set.
///
/// Incremented on every invalidation. A tile request captures the
/// generation it was created under; its result is only written back if
/// the cache is still on that generation when the fetch completes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Generation {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Scheduling class of a tile request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TilePriority {
    /// Tiles in the current viewport. Always drained first.
    High,
    /// Prefetch ring and demoted viewport tiles.
    Low,
}

impl fmt::Display for TilePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
        }
    }
}
