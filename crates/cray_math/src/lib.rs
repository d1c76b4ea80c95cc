//! Math primitives shared by the scene and renderer crates.
//!
//! Vector and matrix types come straight from `glam`; this crate adds the
//! ray, bounding volume and transform types the path tracer is built on.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod ray;
mod transform;

pub use aabb::{Aabb, Axis};
pub use interval::Interval;
pub use ray::Ray;
pub use transform::{Mat4Ext, Transform, TransformOp};
