//! Rigid-body transform in SE(3): rotation + translation.
//!
//! Poses follow the `T_target_source` naming convention: a pose stored as
//! camera-from-world (`T_cw`) maps world points into the camera frame via
//! `transform_point`, and its inverse recovers the camera position in the
//! world frame.

use nalgebra::{UnitQuaternion, Vector3};

/// A rigid-body transform (rotation followed by translation).
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    /// Rotation component.
    pub rotation: UnitQuaternion<f64>,

    /// Translation component.
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create from a rotation and a translation.
    pub fn from_rt(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Inverse transform: if `self` maps a → b, the result maps b → a.
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Apply the transform to a point: `R * p + t`.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Compose two transforms: `self` after `other`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Rotation angle (radians) between `self` and `other`.
    pub fn rotation_delta(&self, other: &SE3) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    /// Euclidean distance between the two translations.
    pub fn translation_delta(&self, other: &SE3) -> f64 {
        (self.translation - other.translation).norm()
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
