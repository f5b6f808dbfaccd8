//! Active working-set state.
//!
//! Everything the `local` lock guards lives here: the concatenated cloud of
//! every loaded cell plus fresh sensor points, the set of loaded cell
//! identities, and the flag telling the ICP consumer a new cloud is ready.

use rustc_hash::FxHashSet;

use crate::core::PointCloud;
use crate::grid::CellInfo;

/// Cloud, cell membership and publication flag of the active window.
#[derive(Debug, Default)]
pub struct LocalCloud {
    /// Concatenated points of every loaded cell plus fresh scan points.
    pub cloud: PointCloud,
    /// Identities of the currently loaded cells, unique by (row, column,
    /// aisle).
    pub loaded_cell_infos: FxHashSet<CellInfo>,
    /// Raised on every mutation, cleared by the consumer's non-blocking
    /// take.
    pub new_cloud_available: bool,
}

impl LocalCloud {
    /// Create an empty working set.
    pub fn new() -> Self {
        Self::default()
    }
}
