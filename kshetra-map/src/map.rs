//! Sliding-window map facade.
//!
//! [`SlidingWindowMap`] keeps a local working set of points around the
//! current sensor pose, small enough for real-time ICP matching, and pages
//! the rest of the world through a [`CellStore`]. An external localizer
//! pushes pose updates and filtered scans in; the ICP consumer receives
//! every new working set through an [`IcpSink`] published under the
//! consumer's own map lock.
//!
//! # Threads
//!
//! Three roles share the map: the caller (pose and scan updates), the
//! background worker draining queued region updates in online mode, and the
//! ICP consumer taking snapshots. Four internal locks (local cloud, cell
//! store, queue, pose) plus the external ICP lock coordinate them; the ICP
//! lock is only ever acquired while the local-cloud lock is held, so a
//! published map always corresponds to the mutation that produced it.

use nalgebra::Vector3;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kiddo::{KdTree, SquaredEuclidean};

use crate::config::MapConfig;
use crate::core::{PointCloud, Pose};
use crate::dynamics::DynamicsUpdater;
use crate::error::{MapError, Result};
use crate::grid::{
    inferior_world, max_grid_coordinate, min_grid_coordinate, superior_world, to_grid, CellInfo,
};
use crate::local_cloud::LocalCloud;
use crate::queue::{RegionUpdate, UpdateQueue};
use crate::store::{CellStore, DiskCellStore, MemoryCellStore, INVALID_CELL_DEPTH};
use crate::stream::{ordered_indexes, WindowTracker};

/// Receiver of working-set publications, typically the ICP engine's map
/// slot. `set_map` is called with the publication lock held and must return
/// quickly.
pub trait IcpSink: Send {
    /// Replace the consumer's map with the current working set.
    fn set_map(&mut self, cloud: &PointCloud);
}

/// Externally owned ICP engine handle plus its map lock.
pub type IcpHandle = Arc<Mutex<Box<dyn IcpSink>>>;

/// Wrap a sink into an [`IcpHandle`].
pub fn icp_handle<S: IcpSink + 'static>(sink: S) -> IcpHandle {
    Arc::new(Mutex::new(Box::new(sink)))
}

/// Post-filter applied to the working set in the sensor frame after each
/// scan insertion.
pub trait PointCloudFilter {
    /// Mutate the cloud in place.
    fn apply(&self, cloud: &mut PointCloud);
}

/// Worker poll period while the queue is empty.
const WORKER_IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Sliding-window point-cloud map.
///
/// Mutating operations take `&mut self`: a single caller drives the pose
/// and scan stream (callers requiring interleaving from several threads
/// must serialize, matching the ordering guarantees the map provides).
/// Snapshot operations take `&self`.
pub struct SlidingWindowMap {
    shared: Arc<Shared>,
    window: WindowTracker,
    first_pose_update: bool,
    dynamics: DynamicsUpdater,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// State reachable from both the caller and the background worker.
struct Shared {
    config: MapConfig,
    local: Mutex<LocalCloud>,
    store: Mutex<Box<dyn CellStore + Send>>,
    queue: UpdateQueue,
    pose: Mutex<Pose>,
    icp: IcpHandle,
    local_cloud_empty: AtomicBool,
    applying: AtomicBool,
}

impl SlidingWindowMap {
    /// Create a map. Spawns the background worker when
    /// [`MapConfig::is_online`] is set.
    pub fn new(config: MapConfig, icp: IcpHandle) -> Result<Self> {
        config.validate()?;

        let store: Box<dyn CellStore + Send> = if config.save_cells_on_hard_drive {
            Box::new(DiskCellStore::new(&config.cell_directory)?)
        } else {
            Box::new(MemoryCellStore::new())
        };

        let dynamics = DynamicsUpdater::new(&config);
        let dim = config.dim();
        let is_online = config.is_online;
        let shared = Arc::new(Shared {
            config,
            local: Mutex::new(LocalCloud::new()),
            store: Mutex::new(store),
            queue: UpdateQueue::new(),
            pose: Mutex::new(Pose::identity(dim)),
            icp,
            local_cloud_empty: AtomicBool::new(true),
            applying: AtomicBool::new(false),
        });

        let running = Arc::new(AtomicBool::new(true));
        let worker = if is_online {
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            Some(
                thread::Builder::new()
                    .name("kshetra-map-update".into())
                    .spawn(move || worker_loop(shared, running))?,
            )
        } else {
            None
        };

        Ok(Self {
            shared,
            window: WindowTracker::new(),
            first_pose_update: true,
            dynamics,
            running,
            worker,
        })
    }

    /// Move the window toward a new sensor pose.
    ///
    /// The first update (and the first after
    /// [`set_global_point_cloud`](Self::set_global_point_cloud)) reseeds the
    /// window synchronously: the cell store is cleared, the whole grid
    /// domain is unloaded so any injected map is bucketed into cells, and
    /// the buffered window around the pose is loaded. Later updates emit
    /// hysteresis-gated slab updates, queued in online mode and applied
    /// inline otherwise.
    pub fn update_pose(&mut self, new_pose: &Pose) -> Result<()> {
        self.check_dimension(new_pose)?;
        *self.shared.pose.lock() = *new_pose;

        let position = new_pose.translation();
        let range = self.shared.config.sensor_max_range;
        let is_3d = self.shared.config.is_3d;

        if self.first_pose_update {
            log::info!(
                "seeding map window around ({:.2}, {:.2}, {:.2})",
                position.x,
                position.y,
                position.z
            );
            self.window.snap(&position, range, is_3d);

            self.shared.store.lock().clear_all()?;
            self.shared.local.lock().loaded_cell_infos.clear();

            let full_domain = RegionUpdate {
                start_row: min_grid_coordinate(),
                end_row: max_grid_coordinate(),
                start_column: min_grid_coordinate(),
                end_column: max_grid_coordinate(),
                start_aisle: min_grid_coordinate(),
                end_aisle: max_grid_coordinate(),
                load: false,
            };
            self.shared.unload_cells(&full_domain)?;
            self.shared.load_cells(&self.window.buffered_window())?;

            self.first_pose_update = false;
        } else {
            for update in self.window.shift(&position, range, is_3d) {
                self.schedule_update(update)?;
            }
        }
        Ok(())
    }

    /// Merge a new scan, given in the world frame, into the working set.
    ///
    /// When dynamic-probability maintenance is enabled the scan first
    /// updates the probabilities of existing in-range map points, and every
    /// inserted point starts at the configured prior. Only scan points
    /// farther than `min_dist_new_point` from the map are inserted. The
    /// whole working set then makes a round trip through the sensor frame
    /// for the supplied post-filters before being published.
    pub fn update_local_point_cloud(
        &mut self,
        mut input: PointCloud,
        pose: &Pose,
        post_filters: &[Box<dyn PointCloudFilter>],
    ) -> Result<()> {
        self.check_dimension(pose)?;
        let config = &self.shared.config;
        if config.compute_prob_dynamic {
            input.fill_probability_dynamic(config.prior_dynamic);
        }

        let mut local = self.shared.local.lock();
        if local.cloud.is_empty() {
            local.cloud = input;
        } else {
            if config.compute_prob_dynamic {
                self.dynamics
                    .update_probabilities(&input, &mut local.cloud, pose)?;
            }
            let new_points =
                points_beyond_min_distance(&input, &local.cloud, config.min_dist_new_point);
            local.cloud.concatenate(&new_points);
        }

        local.cloud.transform(&pose.inverse());
        for filter in post_filters {
            filter.apply(&mut local.cloud);
        }
        local.cloud.transform(pose);

        self.shared.publish(&local);
        self.shared
            .local_cloud_empty
            .store(local.cloud.is_empty(), Ordering::SeqCst);
        local.new_cloud_available = true;
        Ok(())
    }

    /// Snapshot copy of the working set.
    pub fn local_point_cloud(&self) -> PointCloud {
        self.shared.local.lock().cloud.clone()
    }

    /// Non-blocking take: the working set if it changed since the last
    /// take, clearing the change flag.
    pub fn take_new_local_point_cloud(&self) -> Option<PointCloud> {
        let mut local = self.shared.local.lock();
        if local.new_cloud_available {
            local.new_cloud_available = false;
            Some(local.cloud.clone())
        } else {
            None
        }
    }

    /// Reconstruct the whole map: the working set plus every stored,
    /// non-loaded cell, with a per-point `depths` descriptor attached.
    pub fn global_point_cloud(&self) -> Result<PointCloud> {
        let (mut global, loaded) = {
            let local = self.shared.local.lock();
            (local.cloud.clone(), local.loaded_cell_infos.clone())
        };

        let is_3d = self.shared.config.is_3d;
        let mut depths = Vec::with_capacity(global.len());
        for position in global.positions() {
            let row = to_grid(position.x);
            let column = to_grid(position.y);
            let aisle = if is_3d { to_grid(position.z) } else { 0 };
            depths.push(
                loaded
                    .get(&CellInfo::new(row, column, aisle, 0))
                    .map_or(0, |info| info.depth),
            );
        }
        global.set_depths(depths);

        let stored = self.shared.store.lock().all_cell_infos()?;
        for info in stored {
            if loaded.contains(&info) {
                continue;
            }
            let (info, mut cell_cloud) =
                self.shared
                    .store
                    .lock()
                    .retrieve_cell(info.row, info.column, info.aisle, info.depth)?;
            cell_cloud.set_depths(vec![info.depth; cell_cloud.len()]);
            global.concatenate(&cell_cloud);
        }
        Ok(global)
    }

    /// Replace the map wholesale, typically with a previously saved global
    /// cloud.
    ///
    /// The next pose update reseeds the window; when the injected cloud
    /// carries a `depths` descriptor, the reseed recovers per-cell depths
    /// from it. Fails when dynamic-probability maintenance is enabled but
    /// the cloud has no normals.
    pub fn set_global_point_cloud(&mut self, cloud: PointCloud) -> Result<()> {
        if self.shared.config.compute_prob_dynamic && cloud.normals().is_none() {
            return Err(MapError::MissingDescriptor("normals"));
        }

        let mut local = self.shared.local.lock();
        local.cloud = cloud;
        self.shared.publish(&local);
        self.shared
            .local_cloud_empty
            .store(local.cloud.is_empty(), Ordering::SeqCst);
        drop(local);

        self.first_pose_update = true;
        Ok(())
    }

    /// True when the working set holds no points. Lock-free.
    pub fn is_local_point_cloud_empty(&self) -> bool {
        self.shared.local_cloud_empty.load(Ordering::SeqCst)
    }

    /// Snapshot of the loaded cell identities.
    pub fn loaded_cell_infos(&self) -> Vec<CellInfo> {
        self.shared
            .local
            .lock()
            .loaded_cell_infos
            .iter()
            .copied()
            .collect()
    }

    /// Number of region updates waiting for the background worker.
    pub fn pending_updates(&self) -> usize {
        self.shared.queue.len()
    }

    /// True when the queue is drained and no region update is being
    /// applied. Always true in offline mode outside a call.
    pub fn is_idle(&self) -> bool {
        self.shared.queue.is_empty() && !self.shared.applying.load(Ordering::SeqCst)
    }

    fn check_dimension(&self, pose: &Pose) -> Result<()> {
        let map_dim = self.shared.config.dim();
        if pose.dim() != map_dim {
            return Err(MapError::DimensionMismatch {
                pose_dim: pose.dim(),
                map_dim,
            });
        }
        Ok(())
    }

    fn schedule_update(&self, update: RegionUpdate) -> Result<()> {
        if self.shared.config.is_online {
            self.shared.queue.push(update);
            Ok(())
        } else {
            self.shared.apply_update(&update)
        }
    }
}

impl Drop for SlidingWindowMap {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, running: Arc<AtomicBool>) {
    log::info!("map update worker started");
    while running.load(Ordering::Relaxed) {
        shared.applying.store(true, Ordering::SeqCst);
        match shared.queue.pop() {
            Some(update) => {
                let result = shared.apply_update(&update);
                shared.applying.store(false, Ordering::SeqCst);
                if let Err(error) = result {
                    log::error!("map update worker terminating: {}", error);
                    return;
                }
            }
            None => {
                shared.applying.store(false, Ordering::SeqCst);
                thread::sleep(WORKER_IDLE_SLEEP);
            }
        }
    }
    log::info!("map update worker stopped");
}

impl Shared {
    /// Publish the working set to the ICP consumer. The caller holds the
    /// local-cloud lock, so the consumer always observes the cloud this
    /// mutation produced.
    fn publish(&self, local: &LocalCloud) {
        self.icp.lock().set_map(&local.cloud);
    }

    fn apply_update(&self, update: &RegionUpdate) -> Result<()> {
        if update.load {
            self.load_cells(update)
        } else {
            self.unload_cells(update)
        }
    }

    /// Load a rectangle of cells from the store into the working set.
    ///
    /// Cells are visited starting at the pose's grid coordinate and working
    /// outward on every axis, so the ICP map gains nearby coverage first
    /// even when the worker lags. Absent cells are recorded at the depth
    /// computed from the loaded cells around them; cells with points join
    /// the working set and widen the depth search for the rest of the
    /// rectangle.
    fn load_cells(&self, region: &RegionUpdate) -> Result<()> {
        log::debug!(
            "loading cells rows {}..={} columns {}..={} aisles {}..={}",
            region.start_row,
            region.end_row,
            region.start_column,
            region.end_column,
            region.start_aisle,
            region.end_aisle
        );

        let mut known_cells = self.local.lock().loaded_cell_infos.clone();
        let position = self.pose.lock().translation();

        let mut new_cell_infos: FxHashSet<CellInfo> = FxHashSet::default();
        let mut new_points = PointCloud::new();

        let row_indexes = ordered_indexes(region.start_row, region.end_row, to_grid(position.x));
        for row in row_indexes {
            let column_indexes =
                ordered_indexes(region.start_column, region.end_column, to_grid(position.y));
            for column in column_indexes {
                let aisle_indexes = if self.config.is_3d {
                    ordered_indexes(region.start_aisle, region.end_aisle, to_grid(position.z))
                } else {
                    vec![0]
                };
                for aisle in aisle_indexes {
                    let depth = compute_cell_depth(&known_cells, row, column, aisle);
                    let (mut info, points) =
                        self.store.lock().retrieve_cell(row, column, aisle, depth)?;
                    if info.depth == INVALID_CELL_DEPTH {
                        info.depth = depth;
                    } else {
                        new_points.concatenate(&points);
                        known_cells.insert(info);
                    }
                    new_cell_infos.insert(info);
                }
            }
        }

        let mut local = self.local.lock();
        if !new_points.is_empty() {
            local.cloud.concatenate(&new_points);
            self.publish(&local);
            self.local_cloud_empty.store(false, Ordering::SeqCst);
            local.new_cloud_available = true;
        }
        local.loaded_cell_infos.extend(new_cell_infos);
        Ok(())
    }

    /// Unload a rectangle: move its points out of the working set and save
    /// them to the store, grouped by cell.
    ///
    /// Depths come from the loaded-cell set, except for a freshly injected
    /// map (empty loaded set, `depths` descriptor present) where they come
    /// from the descriptor. Scan points not yet bucketed fall back to
    /// depth 0.
    fn unload_cells(&self, region: &RegionUpdate) -> Result<()> {
        let (start_aisle, end_aisle) = if self.config.is_3d {
            (region.start_aisle, region.end_aisle)
        } else {
            (0, 0)
        };
        log::debug!(
            "unloading cells rows {}..={} columns {}..={} aisles {}..={}",
            region.start_row,
            region.end_row,
            region.start_column,
            region.end_column,
            start_aisle,
            end_aisle
        );

        let min = Vector3::new(
            inferior_world(region.start_row),
            inferior_world(region.start_column),
            inferior_world(start_aisle),
        );
        let max = Vector3::new(
            superior_world(region.end_row),
            superior_world(region.end_column),
            superior_world(end_aisle),
        );

        let mut local = self.local.lock();
        let mut old_cells = local.cloud.split_off_box(min, max);
        self.publish(&local);

        let mut old_cell_depths: FxHashMap<(i32, i32, i32), i32> = FxHashMap::default();
        let descriptor_depths = if local.loaded_cell_infos.is_empty() {
            old_cells.depths().map(<[i32]>::to_vec)
        } else {
            None
        };
        if let Some(depths) = descriptor_depths {
            // Externally restored map: recover depths from the descriptor.
            for (i, position) in old_cells.positions().iter().enumerate() {
                let row = to_grid(position.x);
                let column = to_grid(position.y);
                let aisle = if self.config.is_3d {
                    to_grid(position.z)
                } else {
                    0
                };
                old_cell_depths.insert((row, column, aisle), depths[i]);
            }
            local.cloud.remove_depths();
            old_cells.remove_depths();
        } else {
            let in_region = |info: &CellInfo| {
                info.row >= region.start_row
                    && info.row <= region.end_row
                    && info.column >= region.start_column
                    && info.column <= region.end_column
                    && info.aisle >= start_aisle
                    && info.aisle <= end_aisle
            };
            local.loaded_cell_infos.retain(|info| {
                if in_region(info) {
                    old_cell_depths.insert(info.coordinates(), info.depth);
                    false
                } else {
                    true
                }
            });
        }

        self.local_cloud_empty
            .store(local.cloud.is_empty(), Ordering::SeqCst);
        local.new_cloud_available = true;
        drop(local);

        let mut cells: FxHashMap<CellInfo, PointCloud> = FxHashMap::default();
        for i in 0..old_cells.len() {
            let position = old_cells.positions()[i];
            let row = to_grid(position.x);
            let column = to_grid(position.y);
            let aisle = to_grid(position.z);
            let depth = old_cell_depths
                .get(&(row, column, aisle))
                .copied()
                .unwrap_or(0);
            cells
                .entry(CellInfo::new(row, column, aisle, depth))
                .or_insert_with(|| old_cells.create_similar_empty())
                .push_from(&old_cells, i);
        }
        for (info, cell_cloud) in &cells {
            self.store.lock().save_cell(*info, cell_cloud)?;
        }
        Ok(())
    }
}

/// Depth a fresh cell would get: minimum over the known cells of their depth
/// plus the Chebyshev distance, or 0 when nothing is known yet.
fn compute_cell_depth(known_cells: &FxHashSet<CellInfo>, row: i32, column: i32, aisle: i32) -> i32 {
    known_cells
        .iter()
        .map(|info| info.depth + info.chebyshev_distance(row, column, aisle))
        .min()
        .unwrap_or(0)
}

/// Scan points whose nearest map point is at least `min_dist` away; only
/// those are novel enough to insert.
fn points_beyond_min_distance(
    input: &PointCloud,
    local: &PointCloud,
    min_dist: f32,
) -> PointCloud {
    let mut tree: KdTree<f32, 3> = KdTree::new();
    for (i, position) in local.positions().iter().enumerate() {
        tree.add(&[position.x, position.y, position.z], i as u64);
    }

    let min_dist_squared = min_dist * min_dist;
    let mut kept = input.create_similar_empty();
    for i in 0..input.len() {
        let position = input.positions()[i];
        let nearest = tree.nearest_one::<SquaredEuclidean>(&[position.x, position.y, position.z]);
        if nearest.distance >= min_dist_squared {
            kept.push_from(input, i);
        }
    }
    kept
}
