//! In-memory scene built from a [`SceneDescription`].
//!
//! The scene owns the geometry store (meshes and spheres) and a flat list of
//! instances placing that geometry in the world. Instances refer to their
//! object by index, so several instances can share one mesh without
//! copying it.

use std::collections::HashMap;
use std::sync::Arc;

use cray_math::Transform;

use crate::assets::FileCache;
use crate::description::{
    BackgroundDescription, CameraDescription, GeometryDescription, GeometrySource,
    MaterialDescription, SceneDescription,
};
use crate::error::{CoreError, CoreResult};
use crate::mesh::{Mesh, Polygon, Sphere, VertexBuffer};
use crate::prefs::RenderPrefs;
use crate::texture::Texture;

/// An ordered bag of materials. Polygons and spheres pick from it by index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialSet {
    pub materials: Vec<MaterialDescription>,
}

impl MaterialSet {
    pub fn new(materials: Vec<MaterialDescription>) -> Self {
        Self { materials }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

/// What an instance places.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectRef {
    Mesh(usize),
    Sphere(usize),
}

/// A placement of a mesh or sphere.
#[derive(Clone, Debug)]
pub struct Instance {
    pub object: ObjectRef,
    pub transform: Transform,
    pub materials: Arc<MaterialSet>,
}

/// Everything needed to render a frame.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub spheres: Vec<Sphere>,
    pub instances: Vec<Instance>,
    pub camera: CameraDescription,
    pub background: BackgroundDescription,
    /// Decoded environment map when the background asks for one.
    pub environment: Option<Arc<Texture>>,
    pub prefs: RenderPrefs,
}

impl Scene {
    /// Build a scene, reading every referenced file through `cache`.
    pub fn from_description(desc: &SceneDescription, cache: &mut FileCache) -> CoreResult<Self> {
        desc.renderer.validate()?;

        let material_sets: Vec<Arc<MaterialSet>> = desc
            .materials
            .iter()
            .map(|set| Arc::new(MaterialSet::new(set.clone())))
            .collect();

        let mut scene = Scene {
            camera: desc.camera.clone(),
            background: desc.background.clone(),
            prefs: desc.renderer.clone(),
            ..Default::default()
        };
        if let Some(width) = desc.renderer.width {
            scene.camera.width = width;
        }
        if let Some(height) = desc.renderer.height {
            scene.camera.height = height;
        }
        if scene.camera.width == 0 || scene.camera.height == 0 {
            return Err(CoreError::InvalidScene(format!(
                "invalid resolution {}x{}",
                scene.camera.width, scene.camera.height
            )));
        }

        for source in &desc.geometry {
            match source {
                GeometrySource::Inline(geometry) => scene.add_geometry(geometry)?,
                GeometrySource::File { file } => {
                    let bytes = cache.read(file)?;
                    let geometry: GeometryDescription = serde_json::from_slice(bytes)?;
                    log::debug!("Loaded geometry file {} ({} meshes)", file, geometry.meshes.len());
                    scene.add_geometry(&geometry)?;
                }
            }
        }

        scene.spheres = desc
            .spheres
            .iter()
            .map(|s| Sphere {
                center: s.center,
                radius: s.radius,
                material_index: s.material,
            })
            .collect();

        let mesh_by_name: HashMap<&str, usize> = scene
            .meshes
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.as_str(), i))
            .collect();

        for (i, inst) in desc.instances.iter().enumerate() {
            let object = match (&inst.mesh, inst.sphere) {
                (Some(name), None) => ObjectRef::Mesh(*mesh_by_name.get(name.as_str()).ok_or_else(|| {
                    CoreError::InvalidScene(format!("instance {} references unknown mesh '{}'", i, name))
                })?),
                (None, Some(idx)) if idx < scene.spheres.len() => ObjectRef::Sphere(idx),
                (None, Some(idx)) => {
                    return Err(CoreError::InvalidScene(format!(
                        "instance {} references sphere {} of {}",
                        i,
                        idx,
                        scene.spheres.len()
                    )))
                }
                _ => {
                    return Err(CoreError::InvalidScene(format!(
                        "instance {} must name exactly one mesh or sphere",
                        i
                    )))
                }
            };

            let materials = match (inst.materials, object) {
                (Some(set), _) => material_sets.get(set).cloned().ok_or_else(|| {
                    CoreError::InvalidScene(format!("instance {} references material set {}", i, set))
                })?,
                (None, ObjectRef::Mesh(m)) => scene.meshes[m].materials.clone(),
                (None, ObjectRef::Sphere(_)) => Arc::new(MaterialSet::default()),
            };

            scene.instances.push(Instance {
                object,
                transform: Transform::from_ops(&inst.transforms),
                materials,
            });
        }

        if let BackgroundDescription::Environment { path, .. } = &scene.background {
            let texture = Texture::from_image_bytes(cache.read(path)?)?;
            scene.environment = Some(Arc::new(texture));
        }

        log::info!(
            "Built scene: {} meshes, {} spheres, {} instances, {} polygons",
            scene.meshes.len(),
            scene.spheres.len(),
            scene.instances.len(),
            scene.polygon_count()
        );
        Ok(scene)
    }

    /// Add every mesh of one geometry source, all sharing one vertex buffer
    /// and one default material set.
    pub fn add_geometry(&mut self, geometry: &GeometryDescription) -> CoreResult<()> {
        let vbuf = Arc::new(VertexBuffer::new(
            geometry.vertices.clone(),
            geometry.normals.clone(),
            geometry.uvs.clone(),
        ));
        let materials = Arc::new(MaterialSet::new(geometry.materials.clone()));

        for mesh in &geometry.meshes {
            let polygons = mesh
                .polygons
                .iter()
                .map(|p| Polygon {
                    vertex_index: p.v,
                    normal_index: p.n,
                    texture_index: p.t,
                    material_index: p.material,
                })
                .collect();
            self.meshes
                .push(Mesh::new(mesh.name.clone(), polygons, vbuf.clone(), materials.clone())?);
        }
        Ok(())
    }

    /// Place an object with the given material set.
    pub fn add_instance(&mut self, object: ObjectRef, transform: Transform, materials: Arc<MaterialSet>) {
        self.instances.push(Instance {
            object,
            transform,
            materials,
        });
    }

    pub fn polygon_count(&self) -> usize {
        self.meshes.iter().map(Mesh::polygon_count).sum()
    }
}
