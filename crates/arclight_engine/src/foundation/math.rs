//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics, built on nalgebra.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Create a transform with a uniform scale factor
    pub fn from_uniform_scale(scale: f32) -> Self {
        Self {
            scale: Vec3::new(scale, scale, scale),
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (TRS order)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * self.scale.component_mul(&point)
    }

    /// Apply this transform to a direction vector (ignores translation)
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * self.scale.component_mul(&vector)
    }

    /// Combine this transform with a child transform
    ///
    /// `parent.combine(&local)` yields the world-space transform of a node
    /// whose local transform is `local` under a parent with this transform.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * self.scale.component_mul(&other.position),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }

    /// Get the inverse transform
    pub fn inverse(&self) -> Transform {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let inv_rotation = self.rotation.inverse();
        let inv_position = inv_rotation * (-self.position).component_mul(&inv_scale);

        Transform {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Largest absolute scale factor, used to bound spheres under
    /// non-uniform scaling
    pub fn max_scale(&self) -> f32 {
        self.scale
            .x
            .abs()
            .max(self.scale.y.abs())
            .max(self.scale.z.abs())
    }
}

/// Common math utilities
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * std::f32::consts::PI / 180.0
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * 180.0 / std::f32::consts::PI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_identity_matrix() {
        let t = Transform::identity();
        assert_relative_eq!(t.to_matrix(), Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_transform_combine_matches_matrix_product() {
        let parent = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_euler_angles(0.3, 0.5, 0.1),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        let child = Transform {
            position: Vec3::new(-1.0, 0.5, 4.0),
            rotation: Quat::from_euler_angles(0.0, 1.2, 0.0),
            scale: Vec3::new(1.0, 1.0, 1.0),
        };

        let combined = parent.combine(&child);
        let expected = parent.to_matrix() * child.to_matrix();
        assert_relative_eq!(combined.to_matrix(), expected, epsilon = 1e-4);
    }

    #[test]
    fn test_transform_inverse_roundtrip() {
        let t = Transform {
            position: Vec3::new(4.0, -2.0, 7.0),
            rotation: Quat::from_euler_angles(0.1, 0.2, 0.3),
            scale: Vec3::new(3.0, 3.0, 3.0),
        };
        let p = Vec3::new(1.0, 2.0, 3.0);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert_relative_eq!(back, p, epsilon = 1e-4);
    }
}
