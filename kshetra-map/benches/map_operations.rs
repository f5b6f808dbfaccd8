//! Map operation benchmarks:
//! - Scan insertion (novelty filter + publication)
//! - Dynamic-probability update over a synthetic room
//! - Window streaming across a straight trajectory
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use nalgebra::Vector3;
use std::f32::consts::TAU;

use kshetra_map::{icp_handle, IcpSink, MapConfig, PointCloud, Pose, SlidingWindowMap};

struct NullSink;

impl IcpSink for NullSink {
    fn set_map(&mut self, _cloud: &PointCloud) {}
}

fn benchmark_config(compute_prob_dynamic: bool) -> MapConfig {
    MapConfig {
        min_dist_new_point: 0.05,
        sensor_max_range: 20.0,
        is_3d: false,
        is_online: false,
        compute_prob_dynamic,
        ..MapConfig::default()
    }
}

/// A ring of wall returns around the sensor, normals facing inward.
fn ring_scan(n_points: usize, radius: f32) -> PointCloud {
    let mut positions = Vec::with_capacity(n_points);
    let mut normals = Vec::with_capacity(n_points);
    for i in 0..n_points {
        let angle = i as f32 / n_points as f32 * TAU;
        positions.push(Vector3::new(radius * angle.cos(), radius * angle.sin(), 0.0));
        normals.push(Vector3::new(-angle.cos(), -angle.sin(), 0.0));
    }
    let mut cloud = PointCloud::from_positions(positions);
    cloud.set_normals(normals);
    cloud
}

fn bench_scan_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_insertion");
    for n_points in [360usize, 1440] {
        group.throughput(Throughput::Elements(n_points as u64));
        group.bench_function(format!("{}_points", n_points), |b| {
            b.iter_batched(
                || {
                    let mut map =
                        SlidingWindowMap::new(benchmark_config(false), icp_handle(NullSink))
                            .unwrap();
                    map.update_pose(&Pose::identity(2)).unwrap();
                    (map, ring_scan(n_points, 5.0))
                },
                |(mut map, scan)| {
                    map.update_local_point_cloud(black_box(scan), &Pose::identity(2), &[])
                        .unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_dynamic_update(c: &mut Criterion) {
    c.bench_function("dynamic_update_360_points", |b| {
        let mut map =
            SlidingWindowMap::new(benchmark_config(true), icp_handle(NullSink)).unwrap();
        map.update_pose(&Pose::identity(2)).unwrap();
        map.update_local_point_cloud(ring_scan(360, 5.0), &Pose::identity(2), &[])
            .unwrap();
        let rescan = ring_scan(360, 5.0);
        b.iter(|| {
            map.update_local_point_cloud(black_box(rescan.clone()), &Pose::identity(2), &[])
                .unwrap();
        });
    });
}

fn bench_window_streaming(c: &mut Criterion) {
    c.bench_function("window_streaming_straight_line", |b| {
        b.iter_batched(
            || {
                let mut map =
                    SlidingWindowMap::new(benchmark_config(false), icp_handle(NullSink)).unwrap();
                map.update_pose(&Pose::identity(2)).unwrap();
                map.update_local_point_cloud(ring_scan(360, 15.0), &Pose::identity(2), &[])
                    .unwrap();
                map
            },
            |mut map| {
                for step in 1..=8 {
                    map.update_pose(&Pose::from_xy_theta(step as f32 * 40.0, 0.0, 0.0))
                        .unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_scan_insertion,
    bench_dynamic_update,
    bench_window_streaming
);
criterion_main!(benches);
