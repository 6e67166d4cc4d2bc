//! Tile grid geometry.
//!
//! [`TileLayout`] splits a world of [`WorldDims`] cells into fixed-size
//! tiles. The tile grid is `ceil(world / tile)` in each axis, so the last
//! column and row of tiles may be partial. Tiles are addressed by a flat
//! [`TileIndex`] in row-major order.

use crate::geom::{CellCoord, WorldDims};
use crate::id::TileIndex;

/// Mapping between cell rectangles and the tile grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileLayout {
    world: WorldDims,
    tile: WorldDims,
    tile_columns: u32,
    tile_rows: u32,
}

/// An inclusive rectangle of tiles, in tile coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileSpan {
    /// Leftmost tile column.
    pub first_column: u32,
    /// Topmost tile row.
    pub first_row: u32,
    /// Rightmost tile column (inclusive).
    pub last_column: u32,
    /// Bottom tile row (inclusive).
    pub last_row: u32,
}

impl TileSpan {
    /// Whether the tile at `(column, row)` lies inside the span.
    pub fn contains(&self, column: u32, row: u32) -> bool {
        (self.first_column..=self.last_column).contains(&column)
            && (self.first_row..=self.last_row).contains(&row)
    }

    /// Number of tiles in the span.
    pub fn len(&self) -> usize {
        (self.last_column - self.first_column + 1) as usize
            * (self.last_row - self.first_row + 1) as usize
    }

    /// A span always holds at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TileLayout {
    /// Create a layout, or `None` if either the world or the tile covers
    /// no cells.
    pub fn new(world: WorldDims, tile: WorldDims) -> Option<Self> {
        if world.is_empty() || tile.is_empty() {
            return None;
        }
        Some(Self {
            world,
            tile,
            tile_columns: world.columns.div_ceil(tile.columns),
            tile_rows: world.rows.div_ceil(tile.rows),
        })
    }

    /// World dimensions in cells.
    pub fn world_dims(&self) -> WorldDims {
        self.world
    }

    /// Nominal tile dimensions in cells.
    pub fn tile_dims(&self) -> WorldDims {
        self.tile
    }

    /// Number of tile columns.
    pub fn tile_columns(&self) -> u32 {
        self.tile_columns
    }

    /// Number of tile rows.
    pub fn tile_rows(&self) -> u32 {
        self.tile_rows
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.tile_columns as usize * self.tile_rows as usize
    }

    /// Flat index of the tile at `(column, row)`.
    pub fn index(&self, column: u32, row: u32) -> TileIndex {
        debug_assert!(column < self.tile_columns && row < self.tile_rows);
        TileIndex(row * self.tile_columns + column)
    }

    /// `(column, row)` of a flat tile index.
    pub fn column_row(&self, index: TileIndex) -> (u32, u32) {
        (index.0 % self.tile_columns, index.0 / self.tile_columns)
    }

    /// World rectangle covered by a tile.
    ///
    /// Tiles in the last column or row are clamped to the world edge, so
    /// their dims may be smaller than [`tile_dims`](Self::tile_dims).
    pub fn tile_rect(&self, index: TileIndex) -> (CellCoord, WorldDims) {
        let (column, row) = self.column_row(index);
        let top_left = CellCoord::new(column * self.tile.columns, row * self.tile.rows);
        let dims = WorldDims::new(
            (self.world.columns - top_left.col).min(self.tile.columns),
            (self.world.rows - top_left.row).min(self.tile.rows),
        );
        (top_left, dims)
    }

    /// Tiles covering the half-open cell rectangle `[top_left, top_left + dims)`.
    ///
    /// The rectangle is clipped to the world first. Returns `None` when
    /// nothing of it lies inside the world.
    pub fn coverage(&self, top_left: CellCoord, dims: WorldDims) -> Option<TileSpan> {
        if dims.is_empty()
            || top_left.col >= self.world.columns
            || top_left.row >= self.world.rows
        {
            return None;
        }
        let right = top_left
            .col
            .saturating_add(dims.columns)
            .min(self.world.columns);
        let bottom = top_left.row.saturating_add(dims.rows).min(self.world.rows);
        Some(TileSpan {
            first_column: top_left.col / self.tile.columns,
            first_row: top_left.row / self.tile.rows,
            last_column: (right - 1) / self.tile.columns,
            last_row: (bottom - 1) / self.tile.rows,
        })
    }

    /// Flat indices of every tile in a span.
    ///
    /// Column-major: all rows of the first column, then the next column.
    pub fn span_indices(&self, span: &TileSpan) -> Vec<TileIndex> {
        let mut out = Vec::with_capacity(span.len());
        for column in span.first_column..=span.last_column {
            for row in span.first_row..=span.last_row {
                out.push(self.index(column, row));
            }
        }
        out
    }

    /// Tiles within `radius` tiles of a span, excluding the span itself,
    /// clipped to the tile grid. Same ordering as
    /// [`span_indices`](Self::span_indices).
    pub fn ring_indices(&self, span: &TileSpan, radius: u32) -> Vec<TileIndex> {
        let first_column = span.first_column.saturating_sub(radius);
        let first_row = span.first_row.saturating_sub(radius);
        let last_column = span
            .last_column
            .saturating_add(radius)
            .min(self.tile_columns - 1);
        let last_row = span.last_row.saturating_add(radius).min(self.tile_rows - 1);

        let mut out = Vec::new();
        for column in first_column..=last_column {
            for row in first_row..=last_row {
                if span.contains(column, row) {
                    continue;
                }
                out.push(self.index(column, row));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layout(world: (u32, u32), tile: (u32, u32)) -> TileLayout {
        TileLayout::new(WorldDims::new(world.0, world.1), WorldDims::new(tile.0, tile.1)).unwrap()
    }

    #[test]
    fn zero_dims_rejected() {
        assert!(TileLayout::new(WorldDims::new(0, 10), WorldDims::new(8, 8)).is_none());
        assert!(TileLayout::new(WorldDims::new(10, 10), WorldDims::new(8, 0)).is_none());
    }

    #[test]
    fn tile_grid_uses_ceiling_division() {
        let l = layout((200, 200), (64, 64));
        assert_eq!(l.tile_columns(), 4);
        assert_eq!(l.tile_rows(), 4);
        assert_eq!(l.tile_count(), 16);

        let exact = layout((128, 64), (64, 64));
        assert_eq!(exact.tile_columns(), 2);
        assert_eq!(exact.tile_rows(), 1);
    }

    #[test]
    fn far_edge_tile_is_clamped() {
        let l = layout((100, 100), (64, 64));
        let (top_left, dims) = l.tile_rect(l.index(1, 0));
        assert_eq!(top_left, CellCoord::new(64, 0));
        assert_eq!(dims, WorldDims::new(36, 64));

        let (_, corner) = l.tile_rect(l.index(1, 1));
        assert_eq!(corner, WorldDims::new(36, 36));
    }

    #[test]
    fn aligned_view_covers_single_tile() {
        let l = layout((200, 200), (64, 64));
        let span = l
            .coverage(CellCoord::ORIGIN, WorldDims::new(64, 64))
            .unwrap();
        assert_eq!(span.len(), 1);
        assert_eq!(l.span_indices(&span), vec![TileIndex(0)]);
    }

    #[test]
    fn straddling_view_covers_four_tiles() {
        let l = layout((200, 200), (64, 64));
        let span = l
            .coverage(CellCoord::new(60, 60), WorldDims::new(10, 10))
            .unwrap();
        assert_eq!(span.len(), 4);
        assert_eq!(
            l.span_indices(&span),
            vec![TileIndex(0), TileIndex(4), TileIndex(1), TileIndex(5)]
        );
    }

    #[test]
    fn coverage_clips_to_world() {
        let l = layout((200, 200), (64, 64));
        let span = l
            .coverage(CellCoord::new(150, 150), WorldDims::new(500, 500))
            .unwrap();
        assert_eq!(span.last_column, 3);
        assert_eq!(span.last_row, 3);
        assert!(l
            .coverage(CellCoord::new(200, 0), WorldDims::new(10, 10))
            .is_none());
        assert!(l.coverage(CellCoord::ORIGIN, WorldDims::new(0, 10)).is_none());
    }

    #[test]
    fn ring_at_corner_is_clipped() {
        let l = layout((200, 200), (64, 64));
        let span = l
            .coverage(CellCoord::ORIGIN, WorldDims::new(64, 64))
            .unwrap();
        let ring = l.ring_indices(&span, 1);
        assert_eq!(ring, vec![l.index(0, 1), l.index(1, 0), l.index(1, 1)]);
    }

    #[test]
    fn ring_in_interior_has_eight_tiles() {
        let l = layout((320, 320), (64, 64));
        let span = l
            .coverage(CellCoord::new(128, 128), WorldDims::new(64, 64))
            .unwrap();
        let ring = l.ring_indices(&span, 1);
        assert_eq!(ring.len(), 8);
        assert!(!ring.contains(&l.index(2, 2)));
        assert_eq!(l.ring_indices(&span, 2).len(), 24);
    }

    proptest! {
        #[test]
        fn index_round_trips(
            cols in 1u32..500, rows in 1u32..500,
            tc in 1u32..80, tr in 1u32..80,
            pick in 0usize..10_000,
        ) {
            let l = layout((cols, rows), (tc, tr));
            let index = TileIndex((pick % l.tile_count()) as u32);
            let (c, r) = l.column_row(index);
            prop_assert_eq!(l.index(c, r), index);
        }

        #[test]
        fn tiles_partition_the_world(
            cols in 1u32..300, rows in 1u32..300,
            tc in 1u32..70, tr in 1u32..70,
        ) {
            let l = layout((cols, rows), (tc, tr));
            let mut covered = 0usize;
            for i in 0..l.tile_count() as u32 {
                let (top_left, dims) = l.tile_rect(TileIndex(i));
                prop_assert!(!dims.is_empty());
                prop_assert!(l.world_dims().contains_rect(top_left, dims));
                covered += dims.cell_count();
            }
            prop_assert_eq!(covered, l.world_dims().cell_count());
        }

        #[test]
        fn coverage_contains_every_cell(
            cols in 1u32..300, rows in 1u32..300,
            tc in 1u32..70, tr in 1u32..70,
            x in 0u32..300, y in 0u32..300,
            w in 1u32..100, h in 1u32..100,
        ) {
            let l = layout((cols, rows), (tc, tr));
            let x = x % cols;
            let y = y % rows;
            let span = l.coverage(CellCoord::new(x, y), WorldDims::new(w, h)).unwrap();
            let right = (x + w).min(cols);
            let bottom = (y + h).min(rows);
            for cx in [x, right - 1] {
                for cy in [y, bottom - 1] {
                    prop_assert!(span.contains(cx / tc, cy / tr));
                }
            }
            prop_assert_eq!(span.first_column, x / tc);
            prop_assert_eq!(span.last_column, (right - 1) / tc);
        }
    }
}
