//! Window streaming: deciding which cell regions to load or unload as the
//! sensor moves.
//!
//! The tracker keeps six grid-coordinate boundaries (inferior/superior per
//! axis) describing the window that was last acted upon. A boundary only
//! moves once the sensor-range window has drifted at least two cells past
//! it, which keeps the streamer from thrashing when the sensor hovers near
//! a cell edge. Each boundary move emits one slab-shaped region spanning
//! the full buffered extent of the other two axes.

use nalgebra::Vector3;

use crate::grid::{inferior_cell, superior_cell, BUFFER_SIZE};
use crate::queue::RegionUpdate;

/// Hysteresis: minimum boundary drift (in cells) before a slab is emitted.
const HYSTERESIS_STEP: i32 = 2;

/// Grid-coordinate boundaries of the currently loaded window.
///
/// Axis order is row (x), column (y), aisle (z); the aisle entries stay 0
/// for 2D maps.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct WindowTracker {
    inferior: [i32; 3],
    superior: [i32; 3],
}

impl WindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snap every boundary to the sensor-range window around `position`.
    /// Used on the first pose update, where there is no previous window to
    /// shift from.
    pub fn snap(&mut self, position: &Vector3<f32>, range: f32, is_3d: bool) {
        let axes = if is_3d { 3 } else { 2 };
        for axis in 0..axes {
            self.inferior[axis] = inferior_cell(position[axis], range);
            self.superior[axis] = superior_cell(position[axis], range);
        }
    }

    /// The tracked window expanded by [`BUFFER_SIZE`] on every side, as an
    /// all-load region.
    pub fn buffered_window(&self) -> RegionUpdate {
        RegionUpdate {
            start_row: self.inferior[0] - BUFFER_SIZE,
            end_row: self.superior[0] + BUFFER_SIZE,
            start_column: self.inferior[1] - BUFFER_SIZE,
            end_column: self.superior[1] + BUFFER_SIZE,
            start_aisle: self.inferior[2] - BUFFER_SIZE,
            end_aisle: self.superior[2] + BUFFER_SIZE,
            load: true,
        }
    }

    /// Shift the window toward `position`, emitting one load or unload slab
    /// per boundary that drifted by at least the hysteresis step.
    ///
    /// Axes are walked in row, column, aisle order; a slab spans the other
    /// two axes at their current buffered extents, so boundaries already
    /// shifted this call contribute their new values.
    pub fn shift(&mut self, position: &Vector3<f32>, range: f32, is_3d: bool) -> Vec<RegionUpdate> {
        let mut updates = Vec::new();
        let axes = if is_3d { 3 } else { 2 };

        for axis in 0..axes {
            let new_inferior = inferior_cell(position[axis], range);
            let old_inferior = self.inferior[axis];
            if (new_inferior - old_inferior).abs() >= HYSTERESIS_STEP {
                if new_inferior < old_inferior {
                    // window grew outward: load the newly uncovered slab
                    updates.push(self.slab(
                        axis,
                        new_inferior - BUFFER_SIZE,
                        old_inferior - BUFFER_SIZE - 1,
                        true,
                    ));
                } else {
                    // window moved inward: unload what fell behind
                    updates.push(self.slab(
                        axis,
                        old_inferior - BUFFER_SIZE,
                        new_inferior - BUFFER_SIZE - 1,
                        false,
                    ));
                }
                self.inferior[axis] = new_inferior;
            }

            let new_superior = superior_cell(position[axis], range);
            let old_superior = self.superior[axis];
            if (new_superior - old_superior).abs() >= HYSTERESIS_STEP {
                if new_superior > old_superior {
                    updates.push(self.slab(
                        axis,
                        old_superior + BUFFER_SIZE + 1,
                        new_superior + BUFFER_SIZE,
                        true,
                    ));
                } else {
                    updates.push(self.slab(
                        axis,
                        new_superior + BUFFER_SIZE + 1,
                        old_superior + BUFFER_SIZE,
                        false,
                    ));
                }
                self.superior[axis] = new_superior;
            }
        }
        updates
    }

    /// Slab covering `[start, end]` along `axis` and the full buffered
    /// window on the other two axes.
    fn slab(&self, axis: usize, start: i32, end: i32, load: bool) -> RegionUpdate {
        let mut starts = [
            self.inferior[0] - BUFFER_SIZE,
            self.inferior[1] - BUFFER_SIZE,
            self.inferior[2] - BUFFER_SIZE,
        ];
        let mut ends = [
            self.superior[0] + BUFFER_SIZE,
            self.superior[1] + BUFFER_SIZE,
            self.superior[2] + BUFFER_SIZE,
        ];
        starts[axis] = start;
        ends[axis] = end;
        RegionUpdate {
            start_row: starts[0],
            end_row: ends[0],
            start_column: starts[1],
            end_column: ends[1],
            start_aisle: starts[2],
            end_aisle: ends[2],
            load,
        }
    }
}

/// Enumerate `[low, high]` starting from the value nearest `current` and
/// working outward, so the cells closest to the sensor are visited first.
///
/// When `current` lies inside the interval, indexes run downward from
/// `current` to `low`, then upward from `current + 1` to `high`.
pub(crate) fn ordered_indexes(low: i32, high: i32, current: i32) -> Vec<i32> {
    let mut indexes = Vec::with_capacity((high - low + 1).max(0) as usize);
    if high <= current {
        indexes.extend((low..=high).rev());
    } else if low >= current {
        indexes.extend(low..=high);
    } else {
        indexes.extend((low..=current).rev());
        indexes.extend(current + 1..=high);
    }
    indexes
}
