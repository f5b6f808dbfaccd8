//! Voxel-grid coordinates and cell identity.
//!
//! World space is partitioned into cubes of side [`CELL_SIZE`] indexed by an
//! integer triple (row, column, aisle) along (x, y, z). A cell covers the
//! half-open world interval `[g * CELL_SIZE, (g + 1) * CELL_SIZE)` on each
//! axis. In 2D mode the aisle index is fixed at 0.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Edge length of a grid cell, in meters.
pub const CELL_SIZE: f32 = 20.0;

/// Hysteresis halo (in cells) added outside the sensor-range window to avoid
/// boundary churn.
pub const BUFFER_SIZE: i32 = 1;

/// World coordinate to grid coordinate.
#[inline]
pub fn to_grid(world: f32) -> i32 {
    (world / CELL_SIZE).floor() as i32
}

/// Lowest grid coordinate whose cell intersects `[world - range, ...]`.
#[inline]
pub fn inferior_cell(world: f32, range: f32) -> i32 {
    (((world - range) / CELL_SIZE) - 1.0).ceil() as i32
}

/// Highest grid coordinate whose cell intersects `[..., world + range]`.
#[inline]
pub fn superior_cell(world: f32, range: f32) -> i32 {
    ((world + range) / CELL_SIZE).floor() as i32
}

/// World coordinate of the inferior edge of a cell.
#[inline]
pub fn inferior_world(grid: i32) -> f32 {
    grid as f32 * CELL_SIZE
}

/// World coordinate of the superior edge of a cell.
#[inline]
pub fn superior_world(grid: i32) -> f32 {
    (grid as f32 + 1.0) * CELL_SIZE
}

/// Smallest valid grid coordinate; sentinel for full-domain regions.
#[inline]
pub fn min_grid_coordinate() -> i32 {
    i32::MIN
}

/// Largest valid grid coordinate; sentinel for full-domain regions.
#[inline]
pub fn max_grid_coordinate() -> i32 {
    i32::MAX - 1
}

/// Identity of a grid cell.
///
/// Equality and hashing cover the (row, column, aisle) triple only; `depth`
/// is metadata. Depth is the Chebyshev hop count to the nearest cell that
/// was ever populated from sensor data, 0 meaning originally observed.
#[derive(Clone, Copy, Debug, Eq, Serialize, Deserialize)]
pub struct CellInfo {
    pub row: i32,
    pub column: i32,
    pub aisle: i32,
    pub depth: i32,
}

impl CellInfo {
    /// Create a cell identity.
    #[inline]
    pub fn new(row: i32, column: i32, aisle: i32, depth: i32) -> Self {
        Self {
            row,
            column,
            aisle,
            depth,
        }
    }

    /// Coordinate triple, the key the cell is stored and hashed under.
    #[inline]
    pub fn coordinates(&self) -> (i32, i32, i32) {
        (self.row, self.column, self.aisle)
    }

    /// Chebyshev distance to another grid coordinate.
    #[inline]
    pub fn chebyshev_distance(&self, row: i32, column: i32, aisle: i32) -> i32 {
        let dr = (self.row - row).abs();
        let dc = (self.column - column).abs();
        let da = (self.aisle - aisle).abs();
        dr.max(dc).max(da)
    }
}

impl PartialEq for CellInfo {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.coordinates() == other.coordinates()
    }
}

impl Hash for CellInfo {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coordinates().hash(state);
    }
}
