//! Bounding volumes and frustum intersection

use crate::foundation::math::{Mat4, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check if this AABB intersects a sphere
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = Vec3::new(
            center.x.clamp(self.min.x, self.max.x),
            center.y.clamp(self.min.y, self.max.y),
            center.z.clamp(self.min.z, self.max.z),
        );
        (closest - center).norm_squared() <= radius * radius
    }
}

/// World-space bounding sphere
#[derive(Debug, Clone, Copy)]
pub struct BoundingSphere {
    /// Sphere center in world space
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

/// Plane defined by normal and signed distance from origin
///
/// Points with `normal.dot(p) + distance >= 0` lie on the positive side.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Signed distance from origin
    pub distance: f32,
}

impl Plane {
    /// Signed distance from the plane to a point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
///
/// Six inward-facing planes (left, right, bottom, top, near, far).
#[derive(Debug, Clone)]
pub struct Frustum {
    /// The six planes bounding the frustum
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction: each plane is a sum or difference of
    /// the fourth row with another row of the combined matrix.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let row = |i: usize| {
            Vec3::new(vp[(i, 0)], vp[(i, 1)], vp[(i, 2)])
        };
        let row_w = |i: usize| vp[(i, 3)];

        let mut planes = [
            // left, right
            Plane { normal: row(3) + row(0), distance: row_w(3) + row_w(0) },
            Plane { normal: row(3) - row(0), distance: row_w(3) - row_w(0) },
            // bottom, top
            Plane { normal: row(3) + row(1), distance: row_w(3) + row_w(1) },
            Plane { normal: row(3) - row(1), distance: row_w(3) - row_w(1) },
            // near, far
            Plane { normal: row(3) + row(2), distance: row_w(3) + row_w(2) },
            Plane { normal: row(3) - row(2), distance: row_w(3) - row_w(2) },
        ];

        for plane in &mut planes {
            let len = plane.normal.norm();
            if len > f32::EPSILON {
                plane.normal /= len;
                plane.distance /= len;
            }
        }

        Self { planes }
    }

    /// Test a bounding sphere against all six planes
    ///
    /// A sphere exactly tangent to a plane counts as inside, so results
    /// are consistent between invocations for the same input.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        for plane in &self.planes {
            // Point on the AABB furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 {
                p.x = aabb.max.x;
            }
            if plane.normal.y >= 0.0 {
                p.y = aabb.max.y;
            }
            if plane.normal.z >= 0.0 {
                p.z = aabb.max.z;
            }
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
