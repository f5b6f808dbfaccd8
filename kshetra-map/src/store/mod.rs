//! Cell persistence back-ends.
//!
//! A [`CellStore`] persists cell fragments of the global map that fall
//! outside the active window. Two back-ends exist: RAM-resident
//! ([`MemoryCellStore`]) and disk-resident ([`DiskCellStore`]).
//!
//! Stores are not internally synchronized; the map facade serializes access
//! behind its own lock.

mod disk;
mod memory;

pub use disk::DiskCellStore;
pub use memory::MemoryCellStore;

use rustc_hash::FxHashSet;

use crate::core::PointCloud;
use crate::error::Result;
use crate::grid::CellInfo;

/// Depth value returned for absent cells.
pub const INVALID_CELL_DEPTH: i32 = -1;

/// Capability set shared by the cell back-ends.
pub trait CellStore {
    /// Persist a cell, replacing any previous record under the same
    /// (row, column, aisle) key.
    fn save_cell(&mut self, info: CellInfo, cloud: &PointCloud) -> Result<()>;

    /// Retrieve the cell at (row, column, aisle).
    ///
    /// When absent, the returned info carries [`INVALID_CELL_DEPTH`] and the
    /// cloud is empty; the caller is expected to substitute `queried_depth`.
    fn retrieve_cell(
        &self,
        row: i32,
        column: i32,
        aisle: i32,
        queried_depth: i32,
    ) -> Result<(CellInfo, PointCloud)>;

    /// Identities of every stored cell.
    fn all_cell_infos(&self) -> Result<FxHashSet<CellInfo>>;

    /// Drop every stored cell.
    fn clear_all(&mut self) -> Result<()>;
}
