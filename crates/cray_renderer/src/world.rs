//! Render-ready scene: built BVHs, compiled materials, world-space
//! instance bounds.
//!
//! A [`World`] is immutable once built and is shared by reference between
//! every render thread of a session.

use std::collections::HashMap;
use std::sync::Arc;

use cray_core::{Mesh, ObjectRef, Scene, Sphere};
use cray_math::{Aabb, Mat4Ext, Ray};
use rayon::prelude::*;

use crate::background::Background;
use crate::bvh::Bvh;
use crate::camera::Camera;
use crate::hit::HitRecord;
use crate::material::{Material, MaterialList};
use crate::sphere::{intersect_sphere, sphere_normal, sphere_uv};

/// A mesh together with its acceleration structure.
#[derive(Debug)]
struct PreparedMesh {
    mesh: Mesh,
    bvh: Bvh,
}

/// Instance with everything traversal needs precomputed.
#[derive(Debug)]
struct PreparedInstance {
    object: ObjectRef,
    transform: cray_math::Transform,
    world_bounds: Aabb,
    materials: Arc<MaterialList>,
}

#[derive(Debug)]
pub struct World {
    meshes: Vec<PreparedMesh>,
    spheres: Vec<Sphere>,
    instances: Vec<PreparedInstance>,
    pub camera: Camera,
    pub background: Background,
    bounds: Aabb,
}

impl World {
    /// Build every mesh's BVH (in parallel) and compile each distinct
    /// material set once.
    pub fn new(scene: Scene) -> Self {
        let start = std::time::Instant::now();

        let meshes: Vec<PreparedMesh> = scene
            .meshes
            .into_par_iter()
            .map(|mesh| {
                let bvh = Bvh::build(&mesh.polygons, &mesh.vbuf);
                PreparedMesh { mesh, bvh }
            })
            .collect();

        // Instances usually share a handful of material sets.
        let mut compiled: HashMap<*const cray_core::MaterialSet, Arc<MaterialList>> = HashMap::new();
        let mut bounds = Aabb::EMPTY;
        let mut instances = Vec::with_capacity(scene.instances.len());

        for instance in &scene.instances {
            let local_bounds = match instance.object {
                ObjectRef::Mesh(i) => meshes.get(i).map(|m| m.bvh.bounds()),
                ObjectRef::Sphere(i) => scene.spheres.get(i).map(Sphere::bounds),
            };
            let Some(local_bounds) = local_bounds else {
                log::warn!("Skipping instance of missing object {:?}", instance.object);
                continue;
            };

            let world_bounds = instance.transform.matrix.transform_aabb(&local_bounds);
            bounds = Aabb::surrounding(&bounds, &world_bounds);

            let materials = compiled
                .entry(Arc::as_ptr(&instance.materials))
                .or_insert_with(|| MaterialList::compile(&instance.materials))
                .clone();

            instances.push(PreparedInstance {
                object: instance.object,
                transform: instance.transform,
                world_bounds,
                materials,
            });
        }

        log::info!(
            "World ready in {:.2?}: {} meshes, {} spheres, {} instances, {} material sets",
            start.elapsed(),
            meshes.len(),
            scene.spheres.len(),
            instances.len(),
            compiled.len()
        );

        let camera = Camera::from_description(&scene.camera);
        let background = Background::from_description(&scene.background, scene.environment);

        Self {
            meshes,
            spheres: scene.spheres,
            instances,
            camera,
            background,
            bounds,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Closest hit over every instance. The returned normal faces the
    /// incoming ray and may be zero if the geometry is degenerate.
    pub fn closest_hit(&self, ray: &Ray) -> Option<HitRecord> {
        let mut closest = f32::INFINITY;
        let mut best: Option<HitRecord> = None;

        for (index, instance) in self.instances.iter().enumerate() {
            match instance.world_bounds.intersect(ray) {
                Some((entry, _)) if entry < closest => {}
                _ => continue,
            }

            // Unnormalized, so object-space t is world-space t.
            let local = instance.transform.ray_to_object(ray);

            let hit = match instance.object {
                ObjectRef::Mesh(i) => {
                    let prepared = &self.meshes[i];
                    let Some(hit) = prepared.bvh.intersect(&local, &prepared.mesh.polygons, &prepared.mesh.vbuf)
                    else {
                        continue;
                    };
                    if hit.t >= closest {
                        continue;
                    }
                    let poly = &prepared.mesh.polygons[hit.polygon as usize];
                    let local_normal = poly
                        .shading_normal(&prepared.mesh.vbuf, hit.u, hit.v)
                        .unwrap_or_else(|| hit.face_normal.normalize_or_zero());

                    let mut rec = HitRecord::new(hit.t, ray.at(hit.t));
                    rec.uv = cray_math::Vec2::new(hit.u, hit.v);
                    rec.material_index = poly.material_index;
                    rec.set_face_normal(ray, instance.transform.normal_to_world(local_normal));
                    rec
                }
                ObjectRef::Sphere(i) => {
                    let sphere = &self.spheres[i];
                    let Some(t) = intersect_sphere(sphere, &local, closest) else {
                        continue;
                    };
                    let local_point = local.at(t);
                    let local_normal = sphere_normal(sphere, local_point);

                    let mut rec = HitRecord::new(t, ray.at(t));
                    rec.uv = sphere_uv(local_normal);
                    rec.material_index = sphere.material_index;
                    rec.set_face_normal(ray, instance.transform.normal_to_world(local_normal));
                    rec
                }
            };

            closest = hit.t;
            best = Some(HitRecord {
                instance_index: index,
                ..hit
            });
        }

        best
    }

    /// Material for a hit produced by [`World::closest_hit`].
    pub fn material(&self, rec: &HitRecord) -> &dyn Material {
        self.instances[rec.instance_index].materials.get(rec.material_index)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cray_core::{MaterialDescription, MaterialSet, Polygon, VertexBuffer};
    use cray_math::{Transform, TransformOp, Vec3};

    /// Unit quad in the XY plane facing +Z.
    pub(crate) fn quad_mesh() -> Mesh {
        let vbuf = Arc::new(VertexBuffer::new(
            vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            vec![],
            vec![],
        ));
        Mesh::new(
            "quad",
            vec![Polygon::new([0, 1, 2]), Polygon::new([0, 2, 3])],
            vbuf,
            Arc::new(MaterialSet::default()),
        )
        .unwrap()
    }

    pub(crate) fn emissive_set(color: Vec3) -> Arc<MaterialSet> {
        Arc::new(MaterialSet::new(vec![MaterialDescription::Emission { color, strength: 1.0 }]))
    }

    #[test]
    fn test_instanced_quads_pick_closest() {
        let mut scene = Scene::default();
        scene.meshes.push(quad_mesh());
        let red = emissive_set(Vec3::X);
        let green = emissive_set(Vec3::Y);
        scene.add_instance(ObjectRef::Mesh(0), Transform::IDENTITY, red);
        scene.add_instance(
            ObjectRef::Mesh(0),
            Transform::from_ops(&[TransformOp::Translate { x: 0.0, y: 0.0, z: 2.0 }]),
            green,
        );

        let world = World::new(scene);
        let ray = Ray::new(Vec3::new(0.2, 0.1, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let rec = world.closest_hit(&ray).unwrap();

        assert_eq!(rec.instance_index, 1);
        assert!((rec.point.z - 2.0).abs() < 0.01);
        assert!((rec.normal - Vec3::Z).length() < 1e-4);
        assert!(rec.front_face);
        let emitted = world.material(&rec).emitted(&rec);
        assert_eq!(emitted, Vec3::Y);
    }

    #[test]
    fn test_scaled_sphere_keeps_world_distance() {
        let mut scene = Scene::default();
        scene.spheres.push(Sphere::new(Vec3::ZERO, 1.0));
        scene.add_instance(
            ObjectRef::Sphere(0),
            Transform::from_ops(&[TransformOp::ScaleUniform { scale: 2.0 }]),
            Arc::new(MaterialSet::default()),
        );

        let world = World::new(scene);
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let rec = world.closest_hit(&ray).unwrap();
        assert!((rec.t - 3.0).abs() < 1e-4);
        assert!((rec.normal - Vec3::Z).length() < 1e-4);
    }

    #[test]
    fn test_miss_and_fallback_material() {
        let mut scene = Scene::default();
        scene.spheres.push(Sphere::new(Vec3::ZERO, 1.0));
        scene.add_instance(ObjectRef::Sphere(0), Transform::IDENTITY, Arc::new(MaterialSet::default()));
        let world = World::new(scene);

        let away = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(world.closest_hit(&away).is_none());

        let toward = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let rec = world.closest_hit(&toward).unwrap();
        // Empty material set falls back to gray diffuse, which emits nothing.
        assert_eq!(world.material(&rec).emitted(&rec), Vec3::ZERO);
    }

    #[test]
    fn test_missing_object_is_skipped() {
        let mut scene = Scene::default();
        scene.add_instance(ObjectRef::Mesh(3), Transform::IDENTITY, Arc::new(MaterialSet::default()));
        let world = World::new(scene);
        assert_eq!(world.instance_count(), 0);
    }
}
