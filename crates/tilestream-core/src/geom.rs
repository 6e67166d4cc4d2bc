//! Cell coordinates and rectangle dimensions.

use std::fmt;

/// A cell position in the world grid.
///
/// `col` grows to the right, `row` grows downward. Both are zero-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellCoord {
    /// Column (x) of the cell.
    pub col: u32,
    /// Row (y) of the cell.
    pub row: u32,
}

impl CellCoord {
    /// The top-left cell of every grid.
    pub const ORIGIN: Self = Self { col: 0, row: 0 };

    /// Create a coordinate from a column and a row.
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// The size of a rectangle of cells.
///
/// Used both for the whole world and for any sub-rectangle of it
/// (tiles, viewports, fetch responses).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldDims {
    /// Width in cells.
    pub columns: u32,
    /// Height in cells.
    pub rows: u32,
}

impl WorldDims {
    /// Create dimensions from a column and a row count.
    pub const fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Total number of cells covered.
    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Whether the rectangle covers no cells.
    pub fn is_empty(&self) -> bool {
        self.columns == 0 || self.rows == 0
    }

    /// Whether the rectangle `[top_left, top_left + dims)` lies entirely
    /// inside a grid of these dimensions.
    pub fn contains_rect(&self, top_left: CellCoord, dims: WorldDims) -> bool {
        let right = top_left.col as u64 + dims.columns as u64;
        let bottom = top_left.row as u64 + dims.rows as u64;
        right <= self.columns as u64 && bottom <= self.rows as u64
    }
}

impl fmt::Display for WorldDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}
