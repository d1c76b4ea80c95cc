use crate::{Ray, Vec3};

/// One of the three coordinate axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Component of `v` along this axis.
    #[inline]
    pub fn of(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// Axis-aligned bounding box used by the acceleration structure.
///
/// The midpoint is cached alongside the corners because the BVH builder
/// partitions polygons against it on every split.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
    pub midpoint: Vec3,
}

impl Aabb {
    /// A box containing nothing. Growing it by any point yields that point.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
        midpoint: Vec3::ZERO,
    };

    /// Create an AABB from two corner points (in any order).
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self {
            min,
            max,
            midpoint: (min + max) * 0.5,
        }
    }

    /// Tightest box around a set of points. Returns [`Aabb::EMPTY`] for an
    /// empty iterator.
    pub fn from_point_set<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        points.into_iter().fold(Aabb::EMPTY, |acc, p| acc.grow(p))
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(a: &Aabb, b: &Aabb) -> Self {
        if a.is_empty() {
            return *b;
        }
        if b.is_empty() {
            return *a;
        }
        Self::from_points(a.min.min(b.min), a.max.max(b.max))
    }

    /// This box extended to contain `p`.
    pub fn grow(&self, p: Vec3) -> Self {
        if self.is_empty() {
            return Self::from_points(p, p);
        }
        Self::from_points(self.min.min(p), self.max.max(p))
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        self.max - self.min
    }

    /// Total area of the six faces. Degenerate (flat) boxes have a valid,
    /// possibly zero, area.
    pub fn surface_area(&self) -> f32 {
        let e = self.extent();
        2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
    }

    /// Axis with the largest extent. Ties resolve towards Z, then Y.
    pub fn longest_axis(&self) -> Axis {
        let e = self.extent();
        if e.x > e.y && e.x > e.z {
            Axis::X
        } else if e.y > e.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// Point containment with a small tolerance for points on the faces.
    pub fn contains_point(&self, p: Vec3, epsilon: f32) -> bool {
        p.cmpge(self.min - Vec3::splat(epsilon)).all() && p.cmple(self.max + Vec3::splat(epsilon)).all()
    }

    /// True if `other` lies completely inside this box.
    pub fn contains(&self, other: &Aabb, epsilon: f32) -> bool {
        other.is_empty() || (self.contains_point(other.min, epsilon) && self.contains_point(other.max, epsilon))
    }

    /// Slab test.
    ///
    /// Returns the entry and exit parameters along the ray, or `None` if the
    /// box is missed or lies entirely behind the origin. Axis-parallel rays
    /// rely on IEEE infinities from the division by zero.
    pub fn intersect(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv = ray.direction.recip();
        let t0 = (self.min - ray.origin) * inv;
        let t1 = (self.max - ray.origin) * inv;

        let near = t0.min(t1);
        let far = t0.max(t1);

        let entry = near.x.max(near.y).max(near.z);
        let exit = far.x.min(far.y).min(far.z);

        if exit < 0.0 || entry > exit {
            return None;
        }
        Some((entry, exit))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
