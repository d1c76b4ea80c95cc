//! Bounding Volume Hierarchy (BVH) over the polygons of one mesh.
//!
//! Nodes live in a flat arena and refer to their children by index, so the
//! whole tree is dropped with the `Vec` that holds it. Leaves keep indices
//! into the mesh's polygon list; vertex data stays in the shared buffer.
//!
//! Splits happen at the midpoint of the longest axis. A split is kept only if
//! `count * surface_area` summed over both children is lower than the same
//! product for the undivided node.

use cray_core::{Polygon, VertexBuffer};
use cray_math::{Aabb, Ray};

use crate::triangle::{intersect_polygon, PolygonHit};

/// One node of the tree. Internal nodes have no polygons of their own.
#[derive(Debug, Clone)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub polygons: Vec<u32>,
}

impl BvhNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Arena-allocated BVH.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    root: Option<usize>,
}

impl Bvh {
    /// Build a tree over every polygon in `polygons`.
    pub fn build(polygons: &[Polygon], vbuf: &VertexBuffer) -> Self {
        let mut bvh = Bvh::default();
        if polygons.is_empty() {
            return bvh;
        }
        let indices: Vec<u32> = (0..polygons.len() as u32).collect();
        let root = bvh.build_node(indices, polygons, vbuf);
        bvh.root = Some(root);
        bvh
    }

    fn build_node(&mut self, indices: Vec<u32>, polygons: &[Polygon], vbuf: &VertexBuffer) -> usize {
        let bounds = bounds_of(&indices, polygons, vbuf);

        if indices.len() <= 1 {
            return self.push_leaf(bounds, indices);
        }

        let axis = bounds.longest_axis();
        let mid = axis.of(bounds.midpoint);

        let (mut left, mut right): (Vec<u32>, Vec<u32>) = indices
            .iter()
            .partition(|&&i| axis.of(polygons[i as usize].centroid(vbuf)) < mid);

        // Everything landed on one side: keep the set together.
        if left.is_empty() {
            left = std::mem::take(&mut right);
        }
        if right.is_empty() {
            return self.push_leaf(bounds, left);
        }

        let left_bounds = bounds_of(&left, polygons, vbuf);
        let right_bounds = bounds_of(&right, polygons, vbuf);
        let undivided = indices.len() as f32 * bounds.surface_area();
        let divided = left.len() as f32 * left_bounds.surface_area()
            + right.len() as f32 * right_bounds.surface_area();

        if divided >= undivided {
            return self.push_leaf(bounds, indices);
        }

        let left = self.build_node(left, polygons, vbuf);
        let right = self.build_node(right, polygons, vbuf);
        self.nodes.push(BvhNode {
            bounds,
            left: Some(left),
            right: Some(right),
            polygons: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn push_leaf(&mut self, bounds: Aabb, polygons: Vec<u32>) -> usize {
        self.nodes.push(BvhNode {
            bounds,
            left: None,
            right: None,
            polygons,
        });
        self.nodes.len() - 1
    }

    pub fn root(&self) -> Option<&BvhNode> {
        self.root.map(|r| &self.nodes[r])
    }

    pub fn node(&self, index: usize) -> &BvhNode {
        &self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.root().map_or(Aabb::EMPTY, |n| n.bounds)
    }

    pub fn depth(&self) -> usize {
        fn depth_of(bvh: &Bvh, idx: usize) -> usize {
            let node = &bvh.nodes[idx];
            let l = node.left.map_or(0, |c| depth_of(bvh, c));
            let r = node.right.map_or(0, |c| depth_of(bvh, c));
            1 + l.max(r)
        }
        self.root.map_or(0, |r| depth_of(self, r))
    }

    /// Closest polygon hit along `ray`, if any.
    pub fn intersect(&self, ray: &Ray, polygons: &[Polygon], vbuf: &VertexBuffer) -> Option<PolygonHit> {
        let mut closest = None;
        if let Some(root) = self.root {
            self.intersect_node(root, ray, polygons, vbuf, &mut closest);
        }
        closest
    }

    fn intersect_node(
        &self,
        idx: usize,
        ray: &Ray,
        polygons: &[Polygon],
        vbuf: &VertexBuffer,
        closest: &mut Option<PolygonHit>,
    ) -> bool {
        let node = &self.nodes[idx];
        if node.bounds.intersect(ray).is_none() {
            return false;
        }

        if !node.is_leaf() {
            let hit_left = node
                .left
                .map_or(false, |l| self.intersect_node(l, ray, polygons, vbuf, closest));
            let hit_right = node
                .right
                .map_or(false, |r| self.intersect_node(r, ray, polygons, vbuf, closest));
            return hit_left || hit_right;
        }

        let mut hit = false;
        for &p in &node.polygons {
            let limit = closest.map_or(f32::INFINITY, |h| h.t);
            if let Some(h) = intersect_polygon(&polygons[p as usize], p, vbuf, ray, limit) {
                *closest = Some(h);
                hit = true;
            }
        }
        hit
    }
}

fn bounds_of(indices: &[u32], polygons: &[Polygon], vbuf: &VertexBuffer) -> Aabb {
    Aabb::from_point_set(
        indices
            .iter()
            .flat_map(|&i| polygons[i as usize].vertices(vbuf)),
    )
}
