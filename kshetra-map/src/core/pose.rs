//! Rigid sensor pose representation.
//!
//! A pose is a rigid transformation from the sensor frame to the world
//! frame. 2D poses are embedded in 3D with an identity z block and zero z
//! translation, so the rest of the crate can operate on `Vector3` points
//! regardless of the map dimension.

use nalgebra::{Matrix3, Vector3};

/// Rigid transformation (rotation + translation) with an explicit dimension.
///
/// The dimension is carried so the map facade can reject poses that do not
/// match its configured dimensionality.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    rotation: Matrix3<f32>,
    translation: Vector3<f32>,
    dim: usize,
}

impl Pose {
    /// Identity pose of the given dimension (2 or 3).
    #[inline]
    pub fn identity(dim: usize) -> Self {
        debug_assert!(dim == 2 || dim == 3);
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
            dim,
        }
    }

    /// 2D pose from a planar position and heading.
    pub fn from_xy_theta(x: f32, y: f32, theta: f32) -> Self {
        let (sin_t, cos_t) = theta.sin_cos();
        let mut rotation = Matrix3::identity();
        rotation[(0, 0)] = cos_t;
        rotation[(0, 1)] = -sin_t;
        rotation[(1, 0)] = sin_t;
        rotation[(1, 1)] = cos_t;
        Self {
            rotation,
            translation: Vector3::new(x, y, 0.0),
            dim: 2,
        }
    }

    /// 3D pose from a rotation matrix and a translation vector.
    ///
    /// The rotation is assumed orthonormal; no re-orthogonalization is
    /// performed.
    #[inline]
    pub fn from_parts(rotation: Matrix3<f32>, translation: Vector3<f32>) -> Self {
        Self {
            rotation,
            translation,
            dim: 3,
        }
    }

    /// 3D pose from a translation only.
    #[inline]
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self::from_parts(Matrix3::identity(), translation)
    }

    /// Dimension of the pose (2 or 3).
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Translation component: the sensor position in the world frame.
    #[inline]
    pub fn translation(&self) -> Vector3<f32> {
        self.translation
    }

    /// Rotation component.
    #[inline]
    pub fn rotation(&self) -> &Matrix3<f32> {
        &self.rotation
    }

    /// Transform a point from the sensor frame to the world frame.
    #[inline]
    pub fn transform_point(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * point + self.translation
    }

    /// Rotate a direction vector (no translation). Used for normals.
    #[inline]
    pub fn rotate(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * vector
    }

    /// Inverse transformation (world frame to sensor frame).
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.transpose();
        Pose {
            rotation,
            translation: -(rotation * self.translation),
            dim: self.dim,
        }
    }
}
