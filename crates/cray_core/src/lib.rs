//! Cray Core - geometry store and scene description.
//!
//! This crate provides:
//!
//! - **Geometry store**: shared `VertexBuffer`s, `Polygon`s, `Mesh`es and `Sphere`s
//! - **Scene description**: the serde model of a scene file, render preferences
//!   and the material descriptions the renderer compiles
//! - **Scene construction**: `Scene::from_description` resolves geometry files
//!   through a `FileCache` so the exact same inputs can be shipped to workers
//! - **Textures**: byte or float pixel buffers used for environment maps and
//!   for tile results sent over the network
//!
//! # Example
//!
//! ```ignore
//! use cray_core::{FileCache, Scene, SceneDescription};
//!
//! let description = SceneDescription::from_file("scenes/cornell.json")?;
//! let mut cache = FileCache::with_base_dir("scenes");
//! let scene = Scene::from_description(&description, &mut cache)?;
//! println!("{} meshes, {} instances", scene.meshes.len(), scene.instances.len());
//! ```

pub mod assets;
pub mod description;
pub mod error;
pub mod mesh;
pub mod prefs;
pub mod scene;
pub mod texture;

// Re-export commonly used types
pub use assets::{AssetEntry, FileCache};
pub use description::{
    BackgroundDescription, CameraDescription, GeometryDescription, GeometrySource,
    InstanceDescription, MaterialDescription, MeshDescription, PolygonDescription,
    SceneDescription, SphereDescription,
};
pub use error::{CoreError, CoreResult};
pub use mesh::{Mesh, Polygon, Sphere, VertexBuffer};
pub use prefs::{RenderPrefs, SamplerKind, TileOrder};
pub use scene::{Instance, MaterialSet, ObjectRef, Scene};
pub use texture::{Texture, TextureData};

/// Linear RGB color.
pub type Color = cray_math::Vec3;
