//! Serde model of a scene file.
//!
//! A scene file is plain JSON. The master reads it, builds its own [`Scene`]
//! from it and sends the very same description to every worker, which
//! builds an identical scene on its side.
//!
//! [`Scene`]: crate::Scene

use std::path::Path;

use cray_math::{TransformOp, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::prefs::RenderPrefs;
use crate::Color;

/// Top-level scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    #[serde(default)]
    pub renderer: RenderPrefs,
    pub camera: CameraDescription,
    #[serde(default)]
    pub background: BackgroundDescription,
    /// Material sets. Instances refer to them by index.
    #[serde(default)]
    pub materials: Vec<Vec<MaterialDescription>>,
    #[serde(default)]
    pub geometry: Vec<GeometrySource>,
    #[serde(default)]
    pub spheres: Vec<SphereDescription>,
    #[serde(default)]
    pub instances: Vec<InstanceDescription>,
}

impl SceneDescription {
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let description = Self::from_json(&json)?;
        log::info!(
            "Read scene description {} ({} geometry sources, {} instances)",
            path.as_ref().display(),
            description.geometry.len(),
            description.instances.len()
        );
        Ok(description)
    }
}

fn default_up() -> Vec3 {
    Vec3::Y
}

fn default_fov() -> f32 {
    45.0
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

/// Pinhole or thin-lens camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDescription {
    pub position: Vec3,
    pub look_at: Vec3,
    #[serde(default = "default_up")]
    pub up: Vec3,
    /// Vertical field of view in degrees.
    #[serde(default = "default_fov")]
    pub fov: f32,
    /// Lens aperture diameter. 0 gives a pinhole camera.
    #[serde(default)]
    pub aperture: f32,
    /// Distance to the plane in focus. Defaults to the look-at distance.
    #[serde(default)]
    pub focus_distance: Option<f32>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            look_at: Vec3::ZERO,
            up: default_up(),
            fov: default_fov(),
            aperture: 0.0,
            focus_distance: None,
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_intensity() -> f32 {
    1.0
}

/// What a ray sees when it escapes the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackgroundDescription {
    Solid {
        color: Color,
    },
    /// Vertical blend from `down` (straight down) to `up` (straight up).
    Gradient {
        down: Color,
        up: Color,
    },
    /// Equirectangular environment image, looked up through the asset cache.
    #[serde(rename_all = "camelCase")]
    Environment {
        path: String,
        #[serde(default = "default_intensity")]
        intensity: f32,
        /// Rotation around the vertical axis in degrees.
        #[serde(default)]
        offset: f32,
    },
}

impl Default for BackgroundDescription {
    fn default() -> Self {
        BackgroundDescription::Gradient {
            down: Color::ONE,
            up: Color::new(0.5, 0.7, 1.0),
        }
    }
}

fn default_ior() -> f32 {
    1.5
}

fn default_strength() -> f32 {
    1.0
}

/// A material as written in the scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MaterialDescription {
    Diffuse {
        color: Color,
    },
    Metal {
        color: Color,
        #[serde(default)]
        roughness: f32,
    },
    Glass {
        color: Color,
        #[serde(default = "default_ior")]
        ior: f32,
        #[serde(default)]
        roughness: f32,
    },
    Emission {
        color: Color,
        #[serde(default = "default_strength")]
        strength: f32,
    },
}

impl Default for MaterialDescription {
    fn default() -> Self {
        MaterialDescription::Diffuse {
            color: Color::splat(0.5),
        }
    }
}

/// Geometry either written inline or read from a JSON geometry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeometrySource {
    File { file: String },
    Inline(GeometryDescription),
}

/// One geometry source: a single vertex buffer and the meshes carved out
/// of it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryDescription {
    pub vertices: Vec<Vec3>,
    #[serde(default)]
    pub normals: Vec<Vec3>,
    #[serde(default)]
    pub uvs: Vec<Vec2>,
    /// Default materials for the meshes in this source.
    #[serde(default)]
    pub materials: Vec<MaterialDescription>,
    pub meshes: Vec<MeshDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDescription {
    pub name: String,
    pub polygons: Vec<PolygonDescription>,
}

/// Triangle indices: `v` positions, `n` normals, `t` texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolygonDescription {
    pub v: [u32; 3],
    #[serde(default)]
    pub n: Option<[u32; 3]>,
    #[serde(default)]
    pub t: Option<[u32; 3]>,
    #[serde(default)]
    pub material: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereDescription {
    pub center: Vec3,
    pub radius: f32,
    #[serde(default)]
    pub material: u32,
}

/// Placement of a mesh (by name) or a sphere (by index).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceDescription {
    #[serde(default)]
    pub mesh: Option<String>,
    #[serde(default)]
    pub sphere: Option<usize>,
    /// Index into the scene's material sets. Meshes fall back to the
    /// materials of their geometry source when absent.
    #[serde(default)]
    pub materials: Option<usize>,
    #[serde(default)]
    pub transforms: Vec<TransformOp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"{
        "renderer": { "samples": 4, "bounces": 3 },
        "camera": { "position": [0, 1, 5], "lookAt": [0, 0, 0], "width": 64, "height": 48 },
        "background": { "type": "solid", "color": [0.1, 0.1, 0.1] },
        "materials": [[{ "type": "emission", "color": [1, 1, 1], "strength": 4 }]],
        "geometry": [
            { "file": "meshes/plane.json" },
            {
                "vertices": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
                "meshes": [{ "name": "tri", "polygons": [{ "v": [0, 1, 2] }] }]
            }
        ],
        "spheres": [{ "center": [0, 0, 0], "radius": 1 }],
        "instances": [
            { "sphere": 0, "materials": 0 },
            { "mesh": "tri", "transforms": [{ "type": "translate", "x": 0, "y": -1, "z": 0 }] }
        ]
    }"#;

    #[test]
    fn test_parse_scene() {
        let desc = SceneDescription::from_json(SCENE).unwrap();

        assert_eq!(desc.renderer.samples, 4);
        assert_eq!(desc.renderer.tile_width, 32);
        assert_eq!(desc.camera.width, 64);
        assert_eq!(desc.camera.up, Vec3::Y);
        assert_eq!(desc.camera.fov, 45.0);
        assert!(matches!(desc.geometry[0], GeometrySource::File { .. }));
        assert!(matches!(desc.geometry[1], GeometrySource::Inline(_)));
        assert_eq!(desc.instances[0].sphere, Some(0));
        assert_eq!(desc.instances[1].transforms.len(), 1);

        match &desc.materials[0][0] {
            MaterialDescription::Emission { strength, .. } => assert_eq!(*strength, 4.0),
            other => panic!("unexpected material {:?}", other),
        }
    }

    #[test]
    fn test_description_survives_json() {
        // The master sends the parsed description, not the original text.
        let desc = SceneDescription::from_json(SCENE).unwrap();
        let json = serde_json::to_string(&desc).unwrap();
        assert_eq!(SceneDescription::from_json(&json).unwrap(), desc);
    }

    #[test]
    fn test_default_background() {
        let desc = SceneDescription::from_json(r#"{"camera": {"position": [0,0,1], "lookAt": [0,0,0]}}"#).unwrap();
        assert!(matches!(desc.background, BackgroundDescription::Gradient { .. }));
        assert!(desc.instances.is_empty());
    }
}
