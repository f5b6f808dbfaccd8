//! Per-point dynamic-probability update.
//!
//! Classifies map points as static or dynamic by comparing a fresh scan to
//! the current map in the sensor's spherical (beam) frame. A map point seen
//! in front of a scan return along (nearly) the same beam was shot through,
//! which raises its dynamic probability; a map point matching the return
//! stays static. Map points with no return inside the angular window are
//! left untouched, so objects that left the scene keep their last state
//! until re-observed.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector3;

use crate::config::MapConfig;
use crate::core::{PointCloud, Pose};
use crate::error::{MapError, Result};

/// Weight floor keeping every factor strictly inside (0, 1).
const EPS: f32 = 1e-4;

/// Spherical-frame matcher updating the `probabilityDynamic` descriptor.
#[derive(Clone, Debug)]
pub(crate) struct DynamicsUpdater {
    sensor_max_range: f32,
    beam_half_angle: f32,
    epsilon_a: f32,
    epsilon_d: f32,
    alpha: f32,
    beta: f32,
    threshold_dynamic: f32,
    is_3d: bool,
}

/// A map point inside sensor range, expressed in the sensor frame.
struct InRangePoint {
    /// Index into the full local cloud.
    index: usize,
    position: Vector3<f32>,
    normal: Vector3<f32>,
    angles: [f32; 2],
}

impl DynamicsUpdater {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            sensor_max_range: config.sensor_max_range,
            beam_half_angle: config.beam_half_angle,
            epsilon_a: config.epsilon_a,
            epsilon_d: config.epsilon_d,
            alpha: config.alpha,
            beta: config.beta,
            threshold_dynamic: config.threshold_dynamic,
            is_3d: config.is_3d,
        }
    }

    /// Update the dynamic probability of every `local` point within sensor
    /// range, given a scan in the world frame.
    ///
    /// `local` must carry `normals` and `probabilityDynamic` descriptors.
    pub fn update_probabilities(
        &self,
        input: &PointCloud,
        local: &mut PointCloud,
        pose: &Pose,
    ) -> Result<()> {
        if input.is_empty() || local.is_empty() {
            return Ok(());
        }
        let normals = local
            .normals()
            .ok_or(MapError::MissingDescriptor("normals"))?;

        let to_sensor = pose.inverse();

        // Scan in the sensor frame, with its beam angles indexed for lookup.
        let input_positions: Vec<Vector3<f32>> = input
            .positions()
            .iter()
            .map(|p| to_sensor.transform_point(p))
            .collect();
        let mut beam_tree: KdTree<f32, 2> = KdTree::new();
        for (i, position) in input_positions.iter().enumerate() {
            beam_tree.add(&self.spherical_angles(position), i as u64);
        }

        // Map points within sensor range, also in the sensor frame.
        let in_range: Vec<InRangePoint> = local
            .positions()
            .iter()
            .zip(normals)
            .enumerate()
            .filter_map(|(index, (position, normal))| {
                let position = to_sensor.transform_point(position);
                if position.norm() >= self.sensor_max_range {
                    return None;
                }
                Some(InRangePoint {
                    index,
                    angles: self.spherical_angles(&position),
                    position,
                    normal: to_sensor.rotate(normal),
                })
            })
            .collect();

        let max_angular_distance = 2.0 * self.beam_half_angle;
        let probabilities = local
            .probability_dynamic_mut()
            .ok_or(MapError::MissingDescriptor("probabilityDynamic"))?;

        for point in &in_range {
            let nearest = beam_tree.nearest_one::<SquaredEuclidean>(&point.angles);
            let angular_distance = nearest.distance.sqrt();
            if angular_distance > max_angular_distance {
                continue;
            }

            let input_point = input_positions[nearest.item as usize];
            let input_norm = input_point.norm();
            let map_norm = point.position.norm();
            let delta = (input_point - point.position).norm();
            let d_max = self.epsilon_a * input_norm;

            // Gate: the return must not be far behind the map point.
            if input_norm + self.epsilon_d + d_max < map_norm {
                continue;
            }

            // Viewpoint weight: grazing observations are weak evidence.
            let w_v =
                EPS + (1.0 - EPS) * (point.normal.dot(&(point.position / map_norm))).abs();
            // Angular proximity weight.
            let w_d1 = EPS + (1.0 - EPS) * (1.0 - angular_distance / max_angular_distance);

            let offset = delta - self.epsilon_d;
            let w_d2 = if delta < self.epsilon_d || map_norm > input_norm {
                EPS
            } else if offset < d_max {
                EPS + (1.0 - EPS) * offset / d_max
            } else {
                1.0
            };
            let w_p2 = if delta < self.epsilon_d {
                1.0
            } else if map_norm > input_norm {
                EPS
            } else if offset < d_max {
                EPS + (1.0 - EPS) * (1.0 - offset / d_max)
            } else {
                EPS
            };

            let last_dyn = probabilities[point.index];
            let c1 = 1.0 - w_v * w_d1;
            let c2 = w_v * w_d1;

            let (prob_dynamic, prob_static) = if last_dyn < self.threshold_dynamic {
                (
                    c1 * last_dyn
                        + c2 * w_d2 * ((1.0 - self.alpha) * (1.0 - last_dyn) + self.beta * last_dyn),
                    c1 * (1.0 - last_dyn)
                        + c2 * w_p2
                            * (self.alpha * (1.0 - last_dyn) + (1.0 - self.beta) * last_dyn),
                )
            } else {
                // confirmed dynamic: latch near 1
                (1.0 - EPS, EPS)
            };

            probabilities[point.index] = prob_dynamic / (prob_dynamic + prob_static);
        }
        Ok(())
    }

    /// (elevation, azimuth) of a sensor-frame point; elevation is 0 in 2D.
    fn spherical_angles(&self, position: &Vector3<f32>) -> [f32; 2] {
        let mut elevation = 0.0;
        if self.is_3d {
            elevation = (position.z / position.norm()).asin();
        }
        [elevation, position.y.atan2(position.x)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MapConfig {
        MapConfig {
            sensor_max_range: 20.0,
            prior_dynamic: 0.5,
            threshold_dynamic: 0.9,
            beam_half_angle: 0.01,
            epsilon_a: 0.05,
            epsilon_d: 0.02,
            alpha: 0.8,
            beta: 0.2,
            is_3d: false,
            ..MapConfig::default()
        }
    }

    fn single_point_map(probability: f32) -> PointCloud {
        let mut cloud = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);
        // normal facing the sensor at the origin
        cloud.set_normals(vec![Vector3::new(-1.0, 0.0, 0.0)]);
        cloud.set_probability_dynamic(vec![probability]);
        cloud
    }

    #[test]
    fn test_matching_return_decreases_probability() {
        let updater = DynamicsUpdater::new(&test_config());
        let mut map = single_point_map(0.5);
        // grazing-ish normal so the update keeps a memory term and the
        // probability decays geometrically instead of jumping to its fixed
        // point
        map.set_normals(vec![Vector3::new(-0.5, 0.866_025, 0.0)]);
        let scan = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);

        let mut last = 0.5;
        for _ in 0..10 {
            updater
                .update_probabilities(&scan, &mut map, &Pose::identity(2))
                .unwrap();
            let current = map.probability_dynamic().unwrap()[0];
            assert!(current < last, "probability must strictly decrease");
            assert!(current > 0.0);
            last = current;
        }
        assert!(last < 0.9);
    }

    #[test]
    fn test_no_return_in_angular_window_leaves_probability_unchanged() {
        let updater = DynamicsUpdater::new(&test_config());
        let mut map = single_point_map(0.7);
        // return far off the map point's beam
        let scan = PointCloud::from_positions(vec![Vector3::new(0.0, 1.0, 0.0)]);

        updater
            .update_probabilities(&scan, &mut map, &Pose::identity(2))
            .unwrap();
        assert_eq!(map.probability_dynamic().unwrap()[0], 0.7);
    }

    #[test]
    fn test_confirmed_dynamic_point_latches_near_one() {
        let updater = DynamicsUpdater::new(&test_config());
        let mut map = single_point_map(0.95);
        let scan = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);

        updater
            .update_probabilities(&scan, &mut map, &Pose::identity(2))
            .unwrap();
        let probability = map.probability_dynamic().unwrap()[0];
        assert!((probability - (1.0 - EPS)).abs() < 1e-6);
        assert!(probability < 1.0);
    }

    #[test]
    fn test_return_through_map_point_raises_probability() {
        let updater = DynamicsUpdater::new(&test_config());
        let mut map = single_point_map(0.5);
        // the beam pierced the map point and hit something well behind it
        let scan = PointCloud::from_positions(vec![Vector3::new(3.0, 0.0, 0.0)]);

        updater
            .update_probabilities(&scan, &mut map, &Pose::identity(2))
            .unwrap();
        assert!(map.probability_dynamic().unwrap()[0] > 0.5);
    }

    #[test]
    fn test_return_short_of_map_point_floors_both_weights() {
        // return slightly nearer the sensor than the map point, within the
        // range-noise band: neither dynamic nor static evidence, so the
        // update reduces to the transition ratio alone
        let updater = DynamicsUpdater::new(&test_config());
        let mut map = single_point_map(0.5);
        // delta = 0.03 >= epsilon_d, offset = 0.01 < d_max = 0.0485
        let scan = PointCloud::from_positions(vec![Vector3::new(0.97, 0.0, 0.0)]);

        updater
            .update_probabilities(&scan, &mut map, &Pose::identity(2))
            .unwrap();
        let probability = map.probability_dynamic().unwrap()[0];
        // with both weights at the floor only the transition rates remain:
        // 0.2 for alpha = 0.8, beta = 0.2 at the 0.5 prior
        assert!((probability - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_map_points_beyond_sensor_range_are_skipped() {
        let updater = DynamicsUpdater::new(&test_config());
        let mut map = PointCloud::from_positions(vec![Vector3::new(25.0, 0.0, 0.0)]);
        map.set_normals(vec![Vector3::new(-1.0, 0.0, 0.0)]);
        map.set_probability_dynamic(vec![0.5]);
        let scan = PointCloud::from_positions(vec![Vector3::new(25.0, 0.0, 0.0)]);

        updater
            .update_probabilities(&scan, &mut map, &Pose::identity(2))
            .unwrap();
        assert_eq!(map.probability_dynamic().unwrap()[0], 0.5);
    }

    #[test]
    fn test_missing_normals_is_an_error() {
        let updater = DynamicsUpdater::new(&test_config());
        let mut map = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);
        map.set_probability_dynamic(vec![0.5]);
        let scan = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);

        let result = updater.update_probabilities(&scan, &mut map, &Pose::identity(2));
        assert!(matches!(result, Err(MapError::MissingDescriptor("normals"))));
    }
}
