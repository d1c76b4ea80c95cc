//! Ray/polygon intersection.
//!
//! Uses the Möller-Trumbore algorithm directly on indices into the shared
//! vertex buffer; positions are never copied into the acceleration structure.

use cray_core::{Polygon, VertexBuffer};
use cray_math::{Ray, Vec3};

/// Determinants smaller than this are treated as a ray parallel to the plane.
const PARALLEL_EPSILON: f32 = 1.0e-6;

/// Pulled off every accepted distance so the next bounce starts in front of
/// the surface it left.
pub const SELF_INTERSECTION_BIAS: f32 = 0.002;

/// A polygon hit in the space of the ray that was tested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonHit {
    pub t: f32,
    pub u: f32,
    pub v: f32,
    /// Face normal as the raw edge cross product. Not normalized.
    pub face_normal: Vec3,
    pub polygon: u32,
}

/// Möller-Trumbore test against one polygon. Hits farther than `closest`
/// are rejected.
#[inline]
pub fn intersect_polygon(
    poly: &Polygon,
    index: u32,
    vbuf: &VertexBuffer,
    ray: &Ray,
    closest: f32,
) -> Option<PolygonHit> {
    let [v0, v1, v2] = poly.vertices(vbuf);
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let det = edge1.dot(h);
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - v0;
    let u = inv_det * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = inv_det * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    // `closest` is a reported (biased) distance, so compare like with like.
    let t = inv_det * edge2.dot(q);
    let biased = t - SELF_INTERSECTION_BIAS;
    if t < 0.0 || biased > closest {
        return None;
    }

    Some(PolygonHit {
        t: biased,
        u,
        v,
        face_normal: edge1.cross(edge2),
        polygon: index,
    })
}

/// Test every polygon in turn and keep the closest hit.
pub fn intersect_brute_force(polygons: &[Polygon], vbuf: &VertexBuffer, ray: &Ray) -> Option<PolygonHit> {
    let mut best: Option<PolygonHit> = None;
    for (i, poly) in polygons.iter().enumerate() {
        let closest = best.map_or(f32::INFINITY, |h| h.t);
        if let Some(hit) = intersect_polygon(poly, i as u32, vbuf, ray, closest) {
            best = Some(hit);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> (Polygon, VertexBuffer) {
        let vbuf = VertexBuffer::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            Vec::new(),
            Vec::new(),
        );
        (Polygon::new([0, 1, 2]), vbuf)
    }

    #[test]
    fn test_triangle_hit() {
        let (poly, vbuf) = unit_triangle();
        let ray = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, -1.0));

        let hit = intersect_polygon(&poly, 0, &vbuf, &ray, f32::INFINITY).unwrap();
        assert!((hit.t - (1.0 - SELF_INTERSECTION_BIAS)).abs() < 1e-5);
        assert!((hit.u - 0.25).abs() < 1e-5);
        assert!((hit.v - 0.25).abs() < 1e-5);
        // Unnormalized cross product of the edges.
        assert_eq!(hit.face_normal, Vec3::Z);
    }

    #[test]
    fn test_triangle_miss_outside() {
        let (poly, vbuf) = unit_triangle();
        let ray = Ray::new(Vec3::new(0.8, 0.8, 1.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(intersect_polygon(&poly, 0, &vbuf, &ray, f32::INFINITY).is_none());
    }

    #[test]
    fn test_triangle_parallel_ray() {
        let (poly, vbuf) = unit_triangle();
        let ray = Ray::new(Vec3::new(-1.0, 0.25, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(intersect_polygon(&poly, 0, &vbuf, &ray, f32::INFINITY).is_none());
    }

    #[test]
    fn test_triangle_behind_and_beyond() {
        let (poly, vbuf) = unit_triangle();
        let away = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(intersect_polygon(&poly, 0, &vbuf, &away, f32::INFINITY).is_none());

        let toward = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(intersect_polygon(&poly, 0, &vbuf, &toward, 0.5).is_none());
    }

    #[test]
    fn test_brute_force_picks_closest() {
        let vbuf = VertexBuffer::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 0.5),
                Vec3::new(1.0, 0.0, 0.5),
                Vec3::new(0.0, 1.0, 0.5),
            ],
            Vec::new(),
            Vec::new(),
        );
        let polys = vec![Polygon::new([0, 1, 2]), Polygon::new([3, 4, 5])];
        let ray = Ray::new(Vec3::new(0.2, 0.2, 2.0), Vec3::new(0.0, 0.0, -1.0));

        let hit = intersect_brute_force(&polys, &vbuf, &ray).unwrap();
        assert_eq!(hit.polygon, 1);
        assert!((hit.t - (1.5 - SELF_INTERSECTION_BIAS)).abs() < 1e-5);
    }
}
