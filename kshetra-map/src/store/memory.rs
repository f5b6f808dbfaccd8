//! RAM-resident cell store.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{CellStore, INVALID_CELL_DEPTH};
use crate::core::PointCloud;
use crate::error::Result;
use crate::grid::CellInfo;

/// Cell store keeping every fragment in a hash map keyed by the coordinate
/// triple.
#[derive(Debug, Default)]
pub struct MemoryCellStore {
    cells: FxHashMap<(i32, i32, i32), (i32, PointCloud)>,
}

impl MemoryCellStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CellStore for MemoryCellStore {
    fn save_cell(&mut self, info: CellInfo, cloud: &PointCloud) -> Result<()> {
        self.cells
            .insert(info.coordinates(), (info.depth, cloud.clone()));
        Ok(())
    }

    fn retrieve_cell(
        &self,
        row: i32,
        column: i32,
        aisle: i32,
        _queried_depth: i32,
    ) -> Result<(CellInfo, PointCloud)> {
        match self.cells.get(&(row, column, aisle)) {
            Some((depth, cloud)) => Ok((CellInfo::new(row, column, aisle, *depth), cloud.clone())),
            None => Ok((
                CellInfo::new(row, column, aisle, INVALID_CELL_DEPTH),
                PointCloud::new(),
            )),
        }
    }

    fn all_cell_infos(&self) -> Result<FxHashSet<CellInfo>> {
        Ok(self
            .cells
            .iter()
            .map(|(&(row, column, aisle), &(depth, _))| CellInfo::new(row, column, aisle, depth))
            .collect())
    }

    fn clear_all(&mut self) -> Result<()> {
        self.cells.clear();
        Ok(())
    }
}
