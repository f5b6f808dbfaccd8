//! # Kshetra-Map: Sliding-Window Point-Cloud Map for LiDAR ICP
//!
//! A 3D (or 2D) point-cloud map for ICP-based localization and mapping that
//! keeps a *local* working set of points around the current sensor pose,
//! small enough for real-time matching, while paging the rest of the world
//! to secondary storage (RAM- or disk-resident cells).
//!
//! ## What it does
//!
//! - **Cell streaming**: world space is cut into cubic cells of
//!   [`grid::CELL_SIZE`] meters. As the sensor moves, slabs of cells are
//!   loaded and unloaded around the pose with hysteresis, off the ICP hot
//!   path when running online.
//! - **Dynamic-point classification**: each scan updates a per-point
//!   probability that a map point belongs to a moving object, by matching
//!   map and scan in the sensor's spherical (beam) frame.
//! - **Concurrent coordination**: a sensor-driven writer, a background cell
//!   streamer and an ICP consumer share the map through fine-grained locks;
//!   every mutation is published to the consumer under its own map lock.
//!
//! The ICP solver itself, point-cloud file I/O, filter pipelines and sensor
//! drivers are external collaborators, reached through the [`IcpSink`] and
//! [`PointCloudFilter`] traits.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kshetra_map::{icp_handle, IcpSink, MapConfig, PointCloud, Pose, SlidingWindowMap};
//!
//! struct MyIcp;
//! impl IcpSink for MyIcp {
//!     fn set_map(&mut self, cloud: &PointCloud) {
//!         // hand the new working set to the ICP engine
//!     }
//! }
//!
//! let config = MapConfig {
//!     sensor_max_range: 40.0,
//!     is_3d: true,
//!     ..MapConfig::default()
//! };
//! let mut map = SlidingWindowMap::new(config, icp_handle(MyIcp)).unwrap();
//!
//! let pose = Pose::identity(3);
//! map.update_pose(&pose).unwrap();
//! // feed scans with map.update_local_point_cloud(...)
//! ```
//!
//! ## Data flow
//!
//! ```text
//!  localizer ──updatePose──▶ SlidingWindowMap ──slabs──▶ UpdateQueue
//!      │                        │    ▲                        │
//!      └──scans──▶ dynamics ────┘    │                 background worker
//!                                    │                        │
//!  ICP consumer ◀──set_map── LocalCloud ◀──load/unload── CellStore
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod grid;
pub mod map;
pub mod queue;
pub mod store;

mod dynamics;
mod local_cloud;
mod stream;

// Re-export the main surface at the crate root
pub use config::MapConfig;
pub use core::{PointCloud, Pose};
pub use error::{MapError, Result};
pub use grid::CellInfo;
pub use map::{icp_handle, IcpHandle, IcpSink, PointCloudFilter, SlidingWindowMap};
pub use queue::RegionUpdate;
pub use store::{CellStore, DiskCellStore, MemoryCellStore, INVALID_CELL_DEPTH};
