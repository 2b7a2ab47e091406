use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Perspective camera looking from `location` at the absolute point `look_target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub location: Vec3,
    pub look_target: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect_ratio: f32,
}

impl Camera {
    pub const NEAR: f32 = 0.1;
    pub const FAR: f32 = 100.0;

    pub fn new(location: Vec3, look_target: Vec3, fov: f32, aspect_ratio: f32) -> Self {
        Self {
            location,
            look_target,
            fov,
            aspect_ratio,
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.location, self.look_target, Vec3::Y)
    }

    /// Projection with a 0..1 depth range, as wgpu expects.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect_ratio.max(0.01), Self::NEAR, Self::FAR)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            location: Vec3::new(0.0, 0.0, 1.0),
            look_target: Vec3::ZERO,
            fov: std::f32::consts::FRAC_PI_3,
            aspect_ratio: 1.0,
        }
    }
}
