//! FIFO of pending load/unload regions.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A rectangular region of cells to load or unload.
///
/// Bounds are inclusive on both ends. In 2D mode the aisle bounds are forced
/// to 0 when the region is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionUpdate {
    pub start_row: i32,
    pub end_row: i32,
    pub start_column: i32,
    pub end_column: i32,
    pub start_aisle: i32,
    pub end_aisle: i32,
    /// True to load the region from the cell store, false to unload it.
    pub load: bool,
}

/// Mutex-protected FIFO drained by the background worker in online mode.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    updates: Mutex<VecDeque<RegionUpdate>>,
}

impl UpdateQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a region at the tail.
    pub fn push(&self, update: RegionUpdate) {
        self.updates.lock().push_back(update);
    }

    /// Dequeue the head region, if any.
    pub fn pop(&self) -> Option<RegionUpdate> {
        self.updates.lock().pop_front()
    }

    /// Number of pending regions.
    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    /// True when no region is pending.
    pub fn is_empty(&self) -> bool {
        self.updates.lock().is_empty()
    }
}
