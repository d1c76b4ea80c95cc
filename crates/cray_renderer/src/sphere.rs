//! Closed-form ray/sphere intersection.

use cray_core::Sphere;
use cray_math::{Interval, Ray, Vec2, Vec3};
use std::f32::consts::PI;

/// Roots closer than this are treated as the surface the ray just left.
pub const SPHERE_EPSILON: f32 = 0.001;

/// Solve `A t^2 + B t + C = 0` and return the nearest root inside
/// `(SPHERE_EPSILON, closest)`.
pub fn intersect_sphere(sphere: &Sphere, ray: &Ray, closest: f32) -> Option<f32> {
    let oc = ray.origin - sphere.center;
    let a = ray.direction.dot(ray.direction);
    let b = 2.0 * ray.direction.dot(oc);
    let c = oc.dot(oc) - sphere.radius * sphere.radius;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 || a == 0.0 {
        return None;
    }

    let sqrtd = discriminant.sqrt();
    let range = Interval::new(SPHERE_EPSILON, closest);

    let near = (-b - sqrtd) / (2.0 * a);
    if range.surrounds(near) {
        return Some(near);
    }
    let far = (-b + sqrtd) / (2.0 * a);
    if range.surrounds(far) {
        return Some(far);
    }
    None
}

/// Outward unit normal at a point on the sphere.
pub fn sphere_normal(sphere: &Sphere, point: Vec3) -> Vec3 {
    (point - sphere.center) / sphere.radius
}

/// Spherical UV for a point on the unit sphere centered at the origin.
pub fn sphere_uv(p: Vec3) -> Vec2 {
    // theta: angle down from +Y
    // phi: angle around Y axis from +X
    let theta = (-p.y).clamp(-1.0, 1.0).acos();
    let phi = (-p.z).atan2(p.x) + PI;
    Vec2::new(phi / (2.0 * PI), theta / PI)
}
