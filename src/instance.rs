use std::fmt;
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec3};

use crate::model::StaticModel;

/// Stable handle to an instance registered with a [`Renderer`](crate::Renderer).
///
/// Handles are issued in increasing order and never reused by the renderer
/// that created them, so a handle to a removed instance stays invalid.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Placement of a shared mesh in the world.
///
/// Rotation holds Euler angles in radians, applied X then Y then Z.
#[derive(Debug, Clone)]
pub struct RenderableInstance {
    pub mesh: Arc<StaticModel>,
    pub location: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl RenderableInstance {
    pub fn new(mesh: Arc<StaticModel>) -> Self {
        Self {
            mesh,
            location: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    pub fn with_location(mut self, location: Vec3) -> Self {
        self.location = location;
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// `T(location) * Rx * Ry * Rz * S(scale)`.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.location)
            * Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_scale(self.scale)
    }

    /// Local +X axis after rotation; meshes are authored facing +X.
    pub fn facing(&self) -> Vec3 {
        facing(self.rotation)
    }
}

pub(crate) fn facing(rotation: Vec3) -> Vec3 {
    Mat3::from_rotation_x(rotation.x)
        * Mat3::from_rotation_y(rotation.y)
        * Mat3::from_rotation_z(rotation.z)
        * Vec3::X
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn unit() -> RenderableInstance {
        RenderableInstance::new(Arc::new(StaticModel::cuboid("cube", Vec3::splat(0.5))))
    }

    #[test]
    fn identity_placement_gives_identity_matrix() {
        assert!(unit().model_matrix().abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn scale_applies_before_translation() {
        let instance = unit()
            .with_location(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::splat(2.0));
        let moved = instance.model_matrix().transform_point3(Vec3::X);
        assert!(moved.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn yaw_turns_facing_towards_negative_z() {
        let instance = unit().with_rotation(Vec3::new(0.0, FRAC_PI_2, 0.0));
        assert!(instance.facing().abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn facing_matches_model_matrix() {
        let instance = unit().with_rotation(Vec3::new(0.3, -1.1, 0.2));
        let from_matrix = instance.model_matrix().transform_vector3(Vec3::X);
        assert!(instance.facing().abs_diff_eq(from_matrix, 1e-5));
    }
}
