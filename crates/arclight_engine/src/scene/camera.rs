//! Camera with world pose and perspective projection
//!
//! A camera is a world pose (position + orientation) plus projection
//! parameters. View space is right-handed Y-up with the camera looking
//! down -Z; the six-plane frustum used by PVS computation derives from
//! the combined view-projection matrix.

use nalgebra::Perspective3;

use crate::foundation::math::{utils, Mat4, Quat, Vec3};
use crate::scene::bounds::Frustum;

/// Perspective camera for PVS computation and pass constants
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Camera orientation in world space
    pub orientation: Quat,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to the near clipping plane
    pub near: f32,

    /// Distance to the far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera at `position` looking down -Z
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            orientation: Quat::identity(),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Orient the camera to face `target`
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let dir = target - self.position;
        if dir.norm_squared() > f32::EPSILON {
            // Local -Z must point at the target
            self.orientation = Quat::face_towards(&-dir, &up);
        }
    }

    /// Forward direction (-Z of the camera's local frame)
    pub fn forward(&self) -> Vec3 {
        self.orientation * -Vec3::z()
    }

    /// View matrix (inverse of the camera world pose)
    pub fn view_matrix(&self) -> Mat4 {
        self.orientation.inverse().to_homogeneous() * Mat4::new_translation(&-self.position)
    }

    /// Projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Perspective3::new(self.aspect, self.fov, self.near, self.far).to_homogeneous()
    }

    /// Combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Derive the six-plane culling frustum for this camera
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_orientation_faces_negative_z() {
        let camera = Camera::perspective(Vec3::zeros(), 60.0, 16.0 / 9.0, 0.1, 100.0);
        assert_relative_eq!(camera.forward(), -Vec3::z(), epsilon = 1e-6);
    }

    #[test]
    fn test_look_at_turns_toward_target() {
        let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 1.0, 0.1, 100.0);
        camera.look_at(Vec3::new(10.0, 0.0, 5.0), Vec3::y());
        assert_relative_eq!(camera.forward(), Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn test_view_matrix_moves_world_to_camera_space() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 1.0, 0.1, 100.0);
        let p = camera.view_matrix().transform_point(&nalgebra::Point3::new(0.0, 0.0, 0.0));
        // Origin is 5 units in front of the camera (camera looks down -Z)
        assert_relative_eq!(p.z, -5.0, epsilon = 1e-5);
    }
}
