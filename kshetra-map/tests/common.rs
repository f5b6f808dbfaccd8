//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use kshetra_map::{icp_handle, IcpHandle, IcpSink, PointCloud, SlidingWindowMap};
use nalgebra::Vector3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// ICP sink counting publications and remembering the latest cloud size.
pub struct CountingSink {
    publications: Arc<AtomicUsize>,
    last_size: Arc<AtomicUsize>,
}

impl IcpSink for CountingSink {
    fn set_map(&mut self, cloud: &PointCloud) {
        self.publications.fetch_add(1, Ordering::SeqCst);
        self.last_size.store(cloud.len(), Ordering::SeqCst);
    }
}

/// Build a counting ICP handle, returning the shared counters alongside.
pub fn counting_icp() -> (IcpHandle, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let publications = Arc::new(AtomicUsize::new(0));
    let last_size = Arc::new(AtomicUsize::new(0));
    let sink = CountingSink {
        publications: Arc::clone(&publications),
        last_size: Arc::clone(&last_size),
    };
    (icp_handle(sink), publications, last_size)
}

/// ICP handle for tests that do not inspect publications.
pub fn null_icp() -> IcpHandle {
    counting_icp().0
}

/// Wait until the map's update queue is drained and nothing is in flight.
pub fn drain(map: &SlidingWindowMap) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !map.is_idle() {
        assert!(
            Instant::now() < deadline,
            "background worker did not drain in time"
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Planar cloud from (x, y) pairs.
pub fn cloud_2d(points: &[(f32, f32)]) -> PointCloud {
    PointCloud::from_positions(
        points
            .iter()
            .map(|&(x, y)| Vector3::new(x, y, 0.0))
            .collect(),
    )
}

/// Positions sorted for multiset comparison.
pub fn sorted_positions(cloud: &PointCloud) -> Vec<(i64, i64, i64)> {
    let mut positions: Vec<(i64, i64, i64)> = cloud
        .positions()
        .iter()
        .map(|p| {
            (
                (p.x * 1000.0).round() as i64,
                (p.y * 1000.0).round() as i64,
                (p.z * 1000.0).round() as i64,
            )
        })
        .collect();
    positions.sort_unstable();
    positions
}
