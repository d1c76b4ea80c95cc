// Transform utilities for instance placement.
//
// An instance stores its object-to-world matrix together with the inverse
// (for moving rays into object space) and the inverse transpose (for normals).

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::{Aabb, Ray};

/// A single step of a composite transform, as written in scene files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransformOp {
    Translate { x: f32, y: f32, z: f32 },
    RotateX { degrees: f32 },
    RotateY { degrees: f32 },
    RotateZ { degrees: f32 },
    Scale { x: f32, y: f32, z: f32 },
    ScaleUniform { scale: f32 },
}

impl TransformOp {
    pub fn to_matrix(&self) -> Mat4 {
        match *self {
            TransformOp::Translate { x, y, z } => Mat4::from_translation(Vec3::new(x, y, z)),
            TransformOp::RotateX { degrees } => Mat4::from_rotation_x(degrees.to_radians()),
            TransformOp::RotateY { degrees } => Mat4::from_rotation_y(degrees.to_radians()),
            TransformOp::RotateZ { degrees } => Mat4::from_rotation_z(degrees.to_radians()),
            TransformOp::Scale { x, y, z } => Mat4::from_scale(Vec3::new(x, y, z)),
            TransformOp::ScaleUniform { scale } => Mat4::from_scale(Vec3::splat(scale)),
        }
    }
}

/// Object-to-world affine transform with its cached inverses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub matrix: Mat4,
    pub inverse: Mat4,
    pub inverse_transpose: Mat4,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        matrix: Mat4::IDENTITY,
        inverse: Mat4::IDENTITY,
        inverse_transpose: Mat4::IDENTITY,
    };

    pub fn from_matrix(matrix: Mat4) -> Self {
        let inverse = matrix.inverse();
        Self {
            matrix,
            inverse,
            inverse_transpose: inverse.transpose(),
        }
    }

    /// Compose an ordered list of operations. The first operation in the list
    /// is applied to the object last, matching how scene files read
    /// ("translate, then rotate" places the rotated object at the offset).
    pub fn from_ops(ops: &[TransformOp]) -> Self {
        let matrix = ops
            .iter()
            .fold(Mat4::IDENTITY, |acc, op| acc * op.to_matrix());
        Self::from_matrix(matrix)
    }

    /// Move a world-space ray into object space. The direction is left
    /// unnormalized so hit distances are comparable across instances.
    pub fn ray_to_object(&self, ray: &Ray) -> Ray {
        Ray::new(
            self.inverse.transform_point3(ray.origin),
            self.inverse.transform_vector3(ray.direction),
        )
    }

    pub fn point_to_world(&self, p: Vec3) -> Vec3 {
        self.matrix.transform_point3(p)
    }

    /// Normals go through the inverse transpose and come back normalized.
    pub fn normal_to_world(&self, n: Vec3) -> Vec3 {
        self.inverse_transpose.transform_vector3(n).normalize_or_zero()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return *aabb;
        }
        let (lo, hi) = (aabb.min, aabb.max);
        let corners = [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ];

        Aabb::from_point_set(corners.iter().map(|&c| self.transform_point3(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ops_order() {
        let t = Transform::from_ops(&[
            TransformOp::Translate { x: 10.0, y: 0.0, z: 0.0 },
            TransformOp::ScaleUniform { scale: 2.0 },
        ]);
        // Scale first, then translate.
        let p = t.point_to_world(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(12.0, 0.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_rotate_degrees() {
        let t = Transform::from_ops(&[TransformOp::RotateZ { degrees: 90.0 }]);
        let p = t.point_to_world(Vec3::X);
        assert!((p - Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_ray_to_object_keeps_parameter() {
        let t = Transform::from_ops(&[TransformOp::ScaleUniform { scale: 2.0 }]);
        let world = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let local = t.ray_to_object(&world);

        // The same t lands on corresponding points in both spaces.
        let t_param = 3.0;
        let back = t.point_to_world(local.at(t_param));
        assert!((back - world.at(t_param)).length() < 0.001);
    }

    #[test]
    fn test_normal_under_nonuniform_scale() {
        let t = Transform::from_ops(&[TransformOp::Scale { x: 4.0, y: 1.0, z: 1.0 }]);
        // Normal of the plane x + y = 0 in object space.
        let n = t.normal_to_world(Vec3::new(1.0, 1.0, 0.0).normalize());
        // Tangent (1,-1,0) maps to (4,-1,0); the normal must stay perpendicular.
        let tangent = t.matrix.transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        assert!(n.dot(tangent).abs() < 0.001);
        assert!((n.length() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_transform_aabb_translation() {
        let mat = Mat4::from_translation(Vec3::new(5.0, 5.0, 5.0));
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.min - Vec3::splat(5.0)).length() < 0.001);
        assert!((transformed.max - Vec3::splat(6.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_op_json() {
        let op: TransformOp = serde_json::from_str(r#"{"type":"rotateY","degrees":45.0}"#).unwrap();
        assert_eq!(op, TransformOp::RotateY { degrees: 45.0 });
    }
}
