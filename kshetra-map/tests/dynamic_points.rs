//! Dynamic-probability maintenance through the facade.

mod common;

use common::null_icp;
use kshetra_map::{MapConfig, PointCloud, Pose, SlidingWindowMap};
use nalgebra::Vector3;

fn dynamic_config() -> MapConfig {
    MapConfig {
        min_dist_new_point: 0.1,
        sensor_max_range: 20.0,
        prior_dynamic: 0.5,
        threshold_dynamic: 0.9,
        beam_half_angle: 0.01,
        epsilon_a: 0.05,
        epsilon_d: 0.02,
        alpha: 0.8,
        beta: 0.2,
        is_3d: false,
        is_online: false,
        compute_prob_dynamic: true,
        ..MapConfig::default()
    }
}

/// A single wall return one meter ahead, with a slightly grazing normal.
fn wall_scan() -> PointCloud {
    let mut scan = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);
    scan.set_normals(vec![Vector3::new(-0.5, 0.866_025, 0.0)]);
    scan
}

#[test]
fn test_inserted_points_start_at_the_prior() {
    let mut map = SlidingWindowMap::new(dynamic_config(), null_icp()).unwrap();
    map.update_local_point_cloud(wall_scan(), &Pose::identity(2), &[])
        .unwrap();

    let cloud = map.local_point_cloud();
    assert_eq!(cloud.probability_dynamic().unwrap(), &[0.5]);
}

#[test]
fn test_static_point_probability_decreases_under_reobservation() {
    let mut map = SlidingWindowMap::new(dynamic_config(), null_icp()).unwrap();
    map.update_local_point_cloud(wall_scan(), &Pose::identity(2), &[])
        .unwrap();

    let mut last = 0.5;
    for iteration in 0..10 {
        map.update_local_point_cloud(wall_scan(), &Pose::identity(2), &[])
            .unwrap();
        let cloud = map.local_point_cloud();
        assert_eq!(cloud.len(), 1, "identical scan must not add points");
        let probability = cloud.probability_dynamic().unwrap()[0];
        assert!(
            probability < last,
            "iteration {}: probability {} did not decrease below {}",
            iteration,
            probability,
            last
        );
        assert!(probability > 0.0);
        assert!(probability < 0.9);
        last = probability;
    }
}

#[test]
fn test_vanished_point_keeps_its_probability() {
    let mut map = SlidingWindowMap::new(dynamic_config(), null_icp()).unwrap();
    map.update_local_point_cloud(wall_scan(), &Pose::identity(2), &[])
        .unwrap();

    // the object left: the new scan has no return anywhere near its beam
    let mut off_beam = PointCloud::from_positions(vec![Vector3::new(0.0, 1.0, 0.0)]);
    off_beam.set_normals(vec![Vector3::new(0.0, -1.0, 0.0)]);
    map.update_local_point_cloud(off_beam, &Pose::identity(2), &[])
        .unwrap();

    let cloud = map.local_point_cloud();
    assert_eq!(cloud.len(), 2, "the off-beam return is a novel point");
    // point 0 is the original wall return: untouched
    assert_eq!(cloud.probability_dynamic().unwrap()[0], 0.5);
    // point 1 was just inserted at the prior
    assert_eq!(cloud.probability_dynamic().unwrap()[1], 0.5);
}

#[test]
fn test_probabilities_stay_inside_open_unit_interval() {
    let mut map = SlidingWindowMap::new(dynamic_config(), null_icp()).unwrap();
    map.update_local_point_cloud(wall_scan(), &Pose::identity(2), &[])
        .unwrap();

    // pierce the map point repeatedly: a return well behind it drives the
    // probability up towards the dynamic latch
    let mut piercing = PointCloud::from_positions(vec![Vector3::new(3.0, 0.0, 0.0)]);
    piercing.set_normals(vec![Vector3::new(-1.0, 0.0, 0.0)]);

    let mut reached_latch = false;
    for _ in 0..10 {
        map.update_local_point_cloud(piercing.clone(), &Pose::identity(2), &[])
            .unwrap();
        let cloud = map.local_point_cloud();
        let probability = cloud.probability_dynamic().unwrap()[0];
        assert!(probability > 0.0 && probability < 1.0);
        if probability >= 0.9 {
            reached_latch = true;
        }
    }
    assert!(reached_latch, "piercing returns must confirm the point dynamic");

    // once confirmed dynamic, the value latches just below 1
    map.update_local_point_cloud(piercing, &Pose::identity(2), &[])
        .unwrap();
    let probability = map.local_point_cloud().probability_dynamic().unwrap()[0];
    assert!((probability - (1.0 - 1e-4)).abs() < 1e-6);
}
