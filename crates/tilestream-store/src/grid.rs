//! Dense, row-major 2-D arrays with rectangular copy and injection.

use tilestream_core::{CellCoord, GridError, WorldDims};

use crate::range::DatumRange;

/// A dense row-major grid of `channels` values per cell.
///
/// Element `(col, row, channel)` lives at
/// `(row * dims.columns + col) * channels + channel`.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    dims: WorldDims,
    channels: usize,
    data: Vec<T>,
}

/// Raw per-datum storage: one `u32` per cell.
pub type DatumGrid = Grid<u32>;

/// Packed renderer input: one `f32` per visualised slot per cell.
pub type TextureGrid = Grid<f32>;

impl<T: Copy + Default> Grid<T> {
    /// A grid with every element set to `T::default()`.
    pub fn new(dims: WorldDims, channels: usize) -> Self {
        Self::filled(dims, channels, T::default())
    }
}

impl<T: Copy> Grid<T> {
    /// A grid with every element set to `value`.
    pub fn filled(dims: WorldDims, channels: usize, value: T) -> Self {
        Self {
            dims,
            channels,
            data: vec![value; dims.cell_count() * channels],
        }
    }

    /// Wrap an existing buffer. Its length must be `cells * channels`.
    pub fn from_vec(dims: WorldDims, channels: usize, data: Vec<T>) -> Result<Self, GridError> {
        let expected = dims.cell_count() * channels;
        if data.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            dims,
            channels,
            data,
        })
    }

    /// Grid dimensions in cells.
    pub fn dims(&self) -> WorldDims {
        self.dims
    }

    /// Values per cell.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The backing buffer.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consume the grid and return its backing buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// All channels of one cell, or `None` outside the grid.
    pub fn value_at(&self, cell: CellCoord) -> Option<&[T]> {
        if cell.col >= self.dims.columns || cell.row >= self.dims.rows {
            return None;
        }
        let start = self.offset(cell.col, cell.row);
        Some(&self.data[start..start + self.channels])
    }

    /// Fill every element with `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy all of `src` into this grid with its top-left at `top_left`.
    ///
    /// Both grids must have the same number of channels.
    pub fn write_2d(&mut self, top_left: CellCoord, src: &Grid<T>) -> Result<(), GridError> {
        if src.channels != self.channels {
            return Err(GridError::ChannelMismatch {
                dst: self.channels,
                src: src.channels,
            });
        }
        self.check_rect(top_left, src.dims)?;

        let row_len = src.dims.columns as usize * self.channels;
        for j in 0..src.dims.rows {
            let dst = self.offset(top_left.col, top_left.row + j);
            let from = j as usize * row_len;
            self.data[dst..dst + row_len].copy_from_slice(&src.data[from..from + row_len]);
        }
        Ok(())
    }

    /// Copy the rectangle `[top_left, top_left + dims)` out into a new grid.
    pub fn read_2d(&self, top_left: CellCoord, dims: WorldDims) -> Result<Grid<T>, GridError> {
        self.check_rect(top_left, dims)?;

        let row_len = dims.columns as usize * self.channels;
        let mut data = Vec::with_capacity(dims.rows as usize * row_len);
        for j in 0..dims.rows {
            let from = self.offset(top_left.col, top_left.row + j);
            data.extend_from_slice(&self.data[from..from + row_len]);
        }
        Ok(Grid {
            dims,
            channels: self.channels,
            data,
        })
    }

    fn offset(&self, col: u32, row: u32) -> usize {
        (row as usize * self.dims.columns as usize + col as usize) * self.channels
    }

    fn check_rect(&self, top_left: CellCoord, dims: WorldDims) -> Result<(), GridError> {
        if !self.dims.contains_rect(top_left, dims) {
            return Err(GridError::OutOfBounds {
                top_left,
                dims,
                bounds: self.dims,
            });
        }
        Ok(())
    }
}

impl Grid<f32> {
    /// Normalise a rectangle of a single-channel datum grid into one
    /// channel of this grid.
    ///
    /// Source and destination share coordinates: the cell at
    /// `top_left + (i, j)` in `src` lands at the same cell here. Values
    /// are mapped through `range` into `[0, 1)`.
    pub fn inject_2d(
        &mut self,
        channel: usize,
        src: &Grid<u32>,
        top_left: CellCoord,
        dims: WorldDims,
        range: DatumRange,
    ) -> Result<(), GridError> {
        if src.channels != 1 {
            return Err(GridError::ChannelMismatch {
                dst: 1,
                src: src.channels,
            });
        }
        if channel >= self.channels {
            return Err(GridError::ChannelMismatch {
                dst: self.channels,
                src: channel + 1,
            });
        }
        self.check_rect(top_left, dims)?;
        src.check_rect(top_left, dims)?;

        for j in 0..dims.rows {
            let row = top_left.row + j;
            for i in 0..dims.columns {
                let col = top_left.col + i;
                let value = src.data[src.offset(col, row)];
                let dst = self.offset(col, row) + channel;
                self.data[dst] = range.normalize(value);
            }
        }
        Ok(())
    }
}
