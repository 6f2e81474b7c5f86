//! Grid geometry.
//!
//! The board carries no game state. Tiles are addressed by a single row-major
//! index `row * width + col`, and every spatial rule in the game is expressed
//! through square (Chebyshev) boxes or orthogonal adjacency.

use serde::{Deserialize, Serialize};

/// Row-major index of a tile.
pub type TileIndex = usize;

/// Fixed-size rectangular grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    width: usize,
    height: usize,
}

impl Board {
    /// Creates a board.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "board dimensions must be positive");
        Self { width, height }
    }

    /// Board width in tiles.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Board height in tiles.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Total tile count.
    #[must_use]
    pub const fn tile_count(&self) -> usize {
        self.width * self.height
    }

    /// Whether `tile` addresses a tile on this board.
    #[must_use]
    pub const fn contains(&self, tile: TileIndex) -> bool {
        tile < self.tile_count()
    }

    /// Row of a tile.
    #[must_use]
    pub const fn row(&self, tile: TileIndex) -> usize {
        tile / self.width
    }

    /// Column of a tile.
    #[must_use]
    pub const fn col(&self, tile: TileIndex) -> usize {
        tile % self.width
    }

    /// Index of the tile at `(row, col)`.
    #[must_use]
    pub const fn index(&self, row: usize, col: usize) -> TileIndex {
        row * self.width + col
    }

    /// All tiles within Chebyshev distance `radius` of `tile`, clipped to the
    /// board, in row-major order. Includes `tile` itself.
    pub fn tiles_around(&self, tile: TileIndex, radius: usize) -> impl Iterator<Item = TileIndex> {
        let width = self.width;
        let (row, col) = (self.row(tile), self.col(tile));
        let rows = row.saturating_sub(radius)..=(row + radius).min(self.height - 1);
        let cols = col.saturating_sub(radius)..=(col + radius).min(self.width - 1);
        rows.flat_map(move |r| cols.clone().map(move |c| r * width + c))
    }

    /// Up to four orthogonal neighbours of `tile`.
    pub fn orthogonal_neighbors(&self, tile: TileIndex) -> impl Iterator<Item = TileIndex> {
        let (row, col) = (self.row(tile), self.col(tile));
        let up = (row > 0).then(|| tile - self.width);
        let down = (row + 1 < self.height).then(|| tile + self.width);
        let left = (col > 0).then(|| tile - 1);
        let right = (col + 1 < self.width).then(|| tile + 1);
        [up, down, left, right].into_iter().flatten()
    }

    /// Whether two tiles share an edge. Row wrap-around does not count.
    #[must_use]
    pub const fn is_orthogonally_adjacent(&self, a: TileIndex, b: TileIndex) -> bool {
        let (ra, ca) = (self.row(a), self.col(a));
        let (rb, cb) = (self.row(b), self.col(b));
        (ra == rb && ca.abs_diff(cb) == 1) || (ca == cb && ra.abs_diff(rb) == 1)
    }

    /// Chebyshev (king-move) distance between two tiles.
    #[must_use]
    pub fn chebyshev_distance(&self, a: TileIndex, b: TileIndex) -> usize {
        let dr = self.row(a).abs_diff(self.row(b));
        let dc = self.col(a).abs_diff(self.col(b));
        dr.max(dc)
    }
}
