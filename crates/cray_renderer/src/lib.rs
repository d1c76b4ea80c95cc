//! Cray Renderer - tile-based CPU path tracing, locally or across a network.
//!
//! The pieces, bottom up:
//!
//! - [`Bvh`]: per-mesh bounding volume hierarchy in an index arena
//! - [`Sampler`]: Halton, Hammersley or random sequences, seeded per pixel
//!   and per pass so output does not depend on scheduling
//! - [`World`]: the immutable render-ready scene (BVHs, compiled materials,
//!   camera, background)
//! - [`path_trace`]: the iterative integrator
//! - [`TileSet`]: the mutex-guarded tile list every thread claims work from
//! - [`RenderSession`]: one frame, rendered by local threads plus any
//!   synced network workers
//! - [`protocol`]: the master/worker TCP protocol
//!
//! # Example
//!
//! ```ignore
//! use cray_core::{FileCache, Scene, SceneDescription};
//! use cray_renderer::RenderSession;
//!
//! let description = SceneDescription::from_file("scene.json")?;
//! let scene = Scene::from_description(&description, &mut FileCache::with_base_dir("."))?;
//! let outcome = RenderSession::new(scene)?.render()?;
//! outcome.image.save("output.png")?;
//! ```

mod background;
mod bvh;
mod camera;
mod error;
mod framebuffer;
mod hit;
mod integrator;
mod material;
mod renderer;
mod sampler;
mod sphere;
mod tile;
mod triangle;
mod world;

pub mod protocol;

pub use background::Background;
pub use bvh::{Bvh, BvhNode};
pub use camera::Camera;
pub use error::{RenderError, RenderResult};
pub use framebuffer::{linear_to_gamma, AccumulationBuffer, DISPLAY_GAMMA};
pub use hit::HitRecord;
pub use integrator::{path_trace, trace_counted, IntegratorSettings};
pub use material::{compile_material, Color, Diffuse, Emission, Glass, Material, MaterialList, Metal};
pub use renderer::{AbortHandle, RenderMetadata, RenderOutcome, RenderSession};
pub use sampler::Sampler;
pub use sphere::{intersect_sphere, SPHERE_EPSILON};
pub use tile::{quantize, reorder, RenderTile, TileProgress, TileSet, TileState};
pub use triangle::{intersect_brute_force, intersect_polygon, PolygonHit, SELF_INTERSECTION_BIAS};
pub use world::World;

/// Re-export math types from cray_math
pub use cray_math::{Aabb, Ray, Vec3};
