//! Hit record shared by every intersection routine.

use cray_math::{Ray, Vec2, Vec3};

/// Record of a ray-object intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Parameter t where the intersection occurs
    pub t: f32,
    /// World-space point of intersection
    pub point: Vec3,
    /// Unit surface normal, flipped to face the incoming ray. Zero when the
    /// geometry produced a degenerate normal.
    pub normal: Vec3,
    /// Barycentric coordinates for polygons, spherical UV for spheres.
    pub uv: Vec2,
    /// Whether the ray hit the front face (outside) of the surface
    pub front_face: bool,
    pub instance_index: usize,
    /// Index into the instance's material set.
    pub material_index: u32,
}

impl HitRecord {
    pub fn new(t: f32, point: Vec3) -> Self {
        Self {
            t,
            point,
            normal: Vec3::ZERO,
            uv: Vec2::ZERO,
            front_face: true,
            instance_index: 0,
            material_index: 0,
        }
    }

    /// Set the face normal based on ray direction and outward normal.
    ///
    /// The normal is always stored pointing against the ray direction,
    /// so we need to track whether we hit the front or back face.
    pub fn set_face_normal(&mut self, ray: &Ray, outward_normal: Vec3) {
        self.front_face = ray.direction.dot(outward_normal) < 0.0;
        self.normal = if self.front_face {
            outward_normal
        } else {
            -outward_normal
        };
    }

    pub fn has_degenerate_normal(&self) -> bool {
        self.normal.length_squared() == 0.0 || !self.normal.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_normal_flips_towards_ray() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let mut rec = HitRecord::new(4.0, Vec3::new(0.0, 0.0, 1.0));

        rec.set_face_normal(&ray, Vec3::Z);
        assert!(rec.front_face);
        assert_eq!(rec.normal, Vec3::Z);

        rec.set_face_normal(&ray, -Vec3::Z);
        assert!(!rec.front_face);
        assert_eq!(rec.normal, Vec3::Z);
    }

    #[test]
    fn test_degenerate_normal() {
        let mut rec = HitRecord::new(1.0, Vec3::ZERO);
        assert!(rec.has_degenerate_normal());
        rec.normal = Vec3::Y;
        assert!(!rec.has_degenerate_normal());
    }
}
