//! Geometry store: vertex buffers, polygons, meshes and spheres.
//!
//! Every mesh parsed from the same geometry source shares one
//! [`VertexBuffer`] through an `Arc`. Polygons only hold indices into that
//! buffer; positions are looked up when a polygon is intersected.

use std::sync::Arc;

use cray_math::{Aabb, Vec2, Vec3};

use crate::error::{CoreError, CoreResult};
use crate::scene::MaterialSet;

/// Flat vertex data for one geometry source.
#[derive(Clone, Debug, Default)]
pub struct VertexBuffer {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texture_coords: Vec<Vec2>,
}

impl VertexBuffer {
    pub fn new(vertices: Vec<Vec3>, normals: Vec<Vec3>, texture_coords: Vec<Vec2>) -> Self {
        Self {
            vertices,
            normals,
            texture_coords,
        }
    }
}

/// A triangle referencing a [`VertexBuffer`] by index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Polygon {
    pub vertex_index: [u32; 3],
    /// Per-corner normal indices. `None` means flat shading.
    pub normal_index: Option<[u32; 3]>,
    pub texture_index: Option<[u32; 3]>,
    /// Index into the material set of whichever instance places the mesh.
    pub material_index: u32,
}

impl Polygon {
    pub fn new(vertex_index: [u32; 3]) -> Self {
        Self {
            vertex_index,
            normal_index: None,
            texture_index: None,
            material_index: 0,
        }
    }

    pub fn with_normals(mut self, normal_index: [u32; 3]) -> Self {
        self.normal_index = Some(normal_index);
        self
    }

    pub fn with_material(mut self, material_index: u32) -> Self {
        self.material_index = material_index;
        self
    }

    #[inline]
    pub fn vertices(&self, vbuf: &VertexBuffer) -> [Vec3; 3] {
        let [a, b, c] = self.vertex_index;
        [
            vbuf.vertices[a as usize],
            vbuf.vertices[b as usize],
            vbuf.vertices[c as usize],
        ]
    }

    pub fn centroid(&self, vbuf: &VertexBuffer) -> Vec3 {
        let [a, b, c] = self.vertices(vbuf);
        (a + b + c) / 3.0
    }

    pub fn bounds(&self, vbuf: &VertexBuffer) -> Aabb {
        Aabb::from_point_set(self.vertices(vbuf))
    }

    pub fn area(&self, vbuf: &VertexBuffer) -> f32 {
        let [a, b, c] = self.vertices(vbuf);
        0.5 * (b - a).cross(c - a).length()
    }

    /// Interpolated shading normal at barycentric `(u, v)`, or `None` when the
    /// polygon carries no normals.
    pub fn shading_normal(&self, vbuf: &VertexBuffer, u: f32, v: f32) -> Option<Vec3> {
        let [a, b, c] = self.normal_index?;
        let n0 = vbuf.normals[a as usize];
        let n1 = vbuf.normals[b as usize];
        let n2 = vbuf.normals[c as usize];
        Some(((1.0 - u - v) * n0 + u * n1 + v * n2).normalize_or_zero())
    }

    fn check(&self, vbuf: &VertexBuffer) -> Result<(), String> {
        let in_range = |idx: [u32; 3], len: usize| idx.iter().all(|&i| (i as usize) < len);
        if !in_range(self.vertex_index, vbuf.vertices.len()) {
            return Err(format!("vertex index {:?} out of range", self.vertex_index));
        }
        if let Some(n) = self.normal_index {
            if !in_range(n, vbuf.normals.len()) {
                return Err(format!("normal index {:?} out of range", n));
            }
        }
        if let Some(t) = self.texture_index {
            if !in_range(t, vbuf.texture_coords.len()) {
                return Err(format!("uv index {:?} out of range", t));
            }
        }
        Ok(())
    }
}

/// A named polygon list over a shared vertex buffer.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub polygons: Vec<Polygon>,
    pub vbuf: Arc<VertexBuffer>,
    /// Materials that came with the geometry source. Instances without an
    /// explicit material set fall back to these.
    pub materials: Arc<MaterialSet>,
    pub surface_area: f32,
}

impl Mesh {
    /// Create a mesh, validating every polygon index against the buffer.
    pub fn new(
        name: impl Into<String>,
        polygons: Vec<Polygon>,
        vbuf: Arc<VertexBuffer>,
        materials: Arc<MaterialSet>,
    ) -> CoreResult<Self> {
        let name = name.into();
        for (i, poly) in polygons.iter().enumerate() {
            poly.check(&vbuf)
                .map_err(|e| CoreError::InvalidScene(format!("mesh '{}' polygon {}: {}", name, i, e)))?;
        }
        let surface_area = polygons.iter().map(|p| p.area(&vbuf)).sum();
        Ok(Self {
            name,
            polygons,
            vbuf,
            materials,
            surface_area,
        })
    }

    pub fn bounds(&self) -> Aabb {
        self.polygons
            .iter()
            .fold(Aabb::EMPTY, |acc, p| Aabb::surrounding(&acc, &p.bounds(&self.vbuf)))
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }
}

/// An analytic sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub material_index: u32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius,
            material_index: 0,
        }
    }

    pub fn bounds(&self) -> Aabb {
        let r = Vec3::splat(self.radius.abs());
        Aabb::from_points(self.center - r, self.center + r)
    }
}
