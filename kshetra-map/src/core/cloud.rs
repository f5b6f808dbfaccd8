//! Point cloud storage.
//!
//! Struct-of-Arrays layout: positions in one contiguous array, each optional
//! descriptor in its own parallel array. Descriptors are whole column
//! families; they are attached or removed for the entire cloud at once,
//! never per point.
//!
//! 2D data is embedded with z = 0, so every consumer works on `Vector3`.

use nalgebra::Vector3;

use super::pose::Pose;

/// Ordered point collection with optional per-point descriptors.
///
/// Invariant: every attached descriptor array has exactly `positions.len()`
/// entries.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    positions: Vec<Vector3<f32>>,
    normals: Option<Vec<Vector3<f32>>>,
    probability_dynamic: Option<Vec<f32>>,
    depths: Option<Vec<i32>>,
}

impl PointCloud {
    /// Create an empty cloud with no descriptors.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cloud from bare positions.
    pub fn from_positions(positions: Vec<Vector3<f32>>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when the cloud holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Point positions.
    #[inline]
    pub fn positions(&self) -> &[Vector3<f32>] {
        &self.positions
    }

    /// Normals descriptor, if attached.
    #[inline]
    pub fn normals(&self) -> Option<&[Vector3<f32>]> {
        self.normals.as_deref()
    }

    /// Dynamic-probability descriptor, if attached.
    #[inline]
    pub fn probability_dynamic(&self) -> Option<&[f32]> {
        self.probability_dynamic.as_deref()
    }

    /// Mutable dynamic-probability descriptor, if attached.
    #[inline]
    pub fn probability_dynamic_mut(&mut self) -> Option<&mut [f32]> {
        self.probability_dynamic.as_deref_mut()
    }

    /// Cell-depth descriptor, if attached.
    #[inline]
    pub fn depths(&self) -> Option<&[i32]> {
        self.depths.as_deref()
    }

    /// Attach a normals column. The column must cover every point.
    pub fn set_normals(&mut self, normals: Vec<Vector3<f32>>) {
        assert_eq!(normals.len(), self.positions.len());
        self.normals = Some(normals);
    }

    /// Attach a dynamic-probability column. The column must cover every point.
    pub fn set_probability_dynamic(&mut self, probabilities: Vec<f32>) {
        assert_eq!(probabilities.len(), self.positions.len());
        self.probability_dynamic = Some(probabilities);
    }

    /// Attach a constant dynamic-probability column, replacing any existing one.
    pub fn fill_probability_dynamic(&mut self, value: f32) {
        self.probability_dynamic = Some(vec![value; self.positions.len()]);
    }

    /// Attach a cell-depth column. The column must cover every point.
    pub fn set_depths(&mut self, depths: Vec<i32>) {
        assert_eq!(depths.len(), self.positions.len());
        self.depths = Some(depths);
    }

    /// Remove the cell-depth column if present.
    #[inline]
    pub fn remove_depths(&mut self) {
        self.depths = None;
    }

    /// Append a bare point. Attached descriptors receive a neutral entry so
    /// the length invariant holds.
    pub fn push(&mut self, position: Vector3<f32>) {
        self.positions.push(position);
        if let Some(normals) = &mut self.normals {
            normals.push(Vector3::zeros());
        }
        if let Some(probabilities) = &mut self.probability_dynamic {
            probabilities.push(0.0);
        }
        if let Some(depths) = &mut self.depths {
            depths.push(0);
        }
    }

    /// Copy point `index` of `other` into this cloud, including every
    /// descriptor this cloud carries.
    ///
    /// Descriptors attached here but absent on `other` receive a neutral
    /// entry.
    pub fn push_from(&mut self, other: &PointCloud, index: usize) {
        self.positions.push(other.positions[index]);
        if let Some(normals) = &mut self.normals {
            normals.push(
                other
                    .normals
                    .as_ref()
                    .map_or_else(Vector3::zeros, |n| n[index]),
            );
        }
        if let Some(probabilities) = &mut self.probability_dynamic {
            probabilities.push(
                other
                    .probability_dynamic
                    .as_ref()
                    .map_or(0.0, |p| p[index]),
            );
        }
        if let Some(depths) = &mut self.depths {
            depths.push(other.depths.as_ref().map_or(0, |d| d[index]));
        }
    }

    /// Empty cloud with the same descriptor families attached.
    pub fn create_similar_empty(&self) -> PointCloud {
        PointCloud {
            positions: Vec::new(),
            normals: self.normals.as_ref().map(|_| Vec::new()),
            probability_dynamic: self.probability_dynamic.as_ref().map(|_| Vec::new()),
            depths: self.depths.as_ref().map(|_| Vec::new()),
        }
    }

    /// Append `other` to this cloud.
    ///
    /// A truly empty, descriptor-less cloud adopts `other` wholesale.
    /// Otherwise a descriptor family survives only when both operands carry
    /// it; families present on a single side are dropped.
    pub fn concatenate(&mut self, other: &PointCloud) {
        if other.is_empty() {
            return;
        }
        if self.is_empty()
            && self.normals.is_none()
            && self.probability_dynamic.is_none()
            && self.depths.is_none()
        {
            *self = other.clone();
            return;
        }

        self.positions.extend_from_slice(&other.positions);
        match (&mut self.normals, &other.normals) {
            (Some(ours), Some(theirs)) => ours.extend_from_slice(theirs),
            _ => self.normals = None,
        }
        match (&mut self.probability_dynamic, &other.probability_dynamic) {
            (Some(ours), Some(theirs)) => ours.extend_from_slice(theirs),
            _ => self.probability_dynamic = None,
        }
        match (&mut self.depths, &other.depths) {
            (Some(ours), Some(theirs)) => ours.extend_from_slice(theirs),
            _ => self.depths = None,
        }
    }

    /// Apply a rigid transformation in place. Positions are fully
    /// transformed; normals are rotated only.
    pub fn transform(&mut self, pose: &Pose) {
        for position in &mut self.positions {
            *position = pose.transform_point(position);
        }
        if let Some(normals) = &mut self.normals {
            for normal in normals.iter_mut() {
                *normal = pose.rotate(normal);
            }
        }
    }

    /// Remove every point inside the half-open box `[min, max)` and return
    /// them as a new cloud carrying the same descriptor families.
    ///
    /// Remaining points are compacted in place, preserving order.
    pub fn split_off_box(&mut self, min: Vector3<f32>, max: Vector3<f32>) -> PointCloud {
        let mut removed = self.create_similar_empty();
        let mut kept = 0;
        for i in 0..self.positions.len() {
            let p = self.positions[i];
            let inside = p.x >= min.x
                && p.x < max.x
                && p.y >= min.y
                && p.y < max.y
                && p.z >= min.z
                && p.z < max.z;
            if inside {
                removed.push_from(self, i);
            } else {
                self.copy_within(i, kept);
                kept += 1;
            }
        }
        self.truncate(kept);
        removed
    }

    fn copy_within(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        self.positions[to] = self.positions[from];
        if let Some(normals) = &mut self.normals {
            normals[to] = normals[from];
        }
        if let Some(probabilities) = &mut self.probability_dynamic {
            probabilities[to] = probabilities[from];
        }
        if let Some(depths) = &mut self.depths {
            depths[to] = depths[from];
        }
    }

    fn truncate(&mut self, len: usize) {
        self.positions.truncate(len);
        if let Some(normals) = &mut self.normals {
            normals.truncate(len);
        }
        if let Some(probabilities) = &mut self.probability_dynamic {
            probabilities.truncate(len);
        }
        if let Some(depths) = &mut self.depths {
            depths.truncate(len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_with_probs(points: &[(f32, f32, f32)]) -> PointCloud {
        let mut cloud =
            PointCloud::from_positions(points.iter().map(|&(x, y, z)| Vector3::new(x, y, z)).collect());
        cloud.fill_probability_dynamic(0.5);
        cloud
    }

    #[test]
    fn test_empty_cloud_adopts_other_on_concatenate() {
        let mut cloud = PointCloud::new();
        let other = cloud_with_probs(&[(1.0, 2.0, 3.0)]);
        cloud.concatenate(&other);
        assert_eq!(cloud.len(), 1);
        assert!(cloud.probability_dynamic().is_some());
    }

    #[test]
    fn test_concatenate_drops_one_sided_descriptors() {
        let mut cloud = cloud_with_probs(&[(0.0, 0.0, 0.0)]);
        let other = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);
        cloud.concatenate(&other);
        assert_eq!(cloud.len(), 2);
        assert!(cloud.probability_dynamic().is_none());
    }

    #[test]
    fn test_concatenate_keeps_shared_descriptors() {
        let mut cloud = cloud_with_probs(&[(0.0, 0.0, 0.0)]);
        let other = cloud_with_probs(&[(1.0, 0.0, 0.0), (2.0, 0.0, 0.0)]);
        cloud.concatenate(&other);
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.probability_dynamic().unwrap().len(), 3);
    }

    #[test]
    fn test_split_off_box_partitions_points() {
        let mut cloud = cloud_with_probs(&[(1.0, 1.0, 0.0), (25.0, 1.0, 0.0), (5.0, 5.0, 0.0)]);
        let removed = cloud.split_off_box(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(20.0, 20.0, 20.0),
        );
        assert_eq!(removed.len(), 2);
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.positions()[0].x, 25.0);
        assert_eq!(removed.probability_dynamic().unwrap().len(), 2);
    }

    #[test]
    fn test_split_off_box_is_half_open() {
        let mut cloud = cloud_with_probs(&[(0.0, 0.0, 0.0), (20.0, 0.0, 0.0)]);
        let removed = cloud.split_off_box(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(20.0, 20.0, 20.0),
        );
        assert_eq!(removed.len(), 1);
        assert_eq!(cloud.positions()[0].x, 20.0);
    }

    #[test]
    fn test_transform_rotates_normals_without_translating() {
        let mut cloud = PointCloud::from_positions(vec![Vector3::new(1.0, 0.0, 0.0)]);
        cloud.set_normals(vec![Vector3::new(1.0, 0.0, 0.0)]);
        let pose = Pose::from_xy_theta(5.0, 0.0, std::f32::consts::FRAC_PI_2);
        cloud.transform(&pose);
        let normal = cloud.normals().unwrap()[0];
        assert!((cloud.positions()[0] - Vector3::new(5.0, 1.0, 0.0)).norm() < 1e-5);
        assert!((normal - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-5);
    }
}
