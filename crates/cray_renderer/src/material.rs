//! Materials and their scatter capability.
//!
//! The integrator only ever asks a material two things: how much light it
//! emits at a hit, and how an incoming ray scatters (attenuation plus a new
//! ray, or `None` when the path is absorbed).

use std::fmt::Debug;
use std::sync::Arc;

use cray_core::{MaterialDescription, MaterialSet};
use cray_math::{Ray, Vec3};

use crate::hit::HitRecord;
use crate::sampler::Sampler;

/// Color type alias (linear RGB)
pub type Color = Vec3;

/// Distance refracted rays are pushed through the surface they cross.
const REFRACTION_OFFSET: f32 = 0.004;

/// Trait for materials that describe how light interacts with surfaces.
pub trait Material: Send + Sync + Debug {
    /// Scatter an incoming ray.
    ///
    /// Returns Some((attenuation, scattered_ray)) if the ray scatters,
    /// or None if the ray is absorbed.
    fn scatter(&self, ray_in: &Ray, rec: &HitRecord, sampler: &mut Sampler) -> Option<(Color, Ray)>;

    /// Get emitted light from this material.
    ///
    /// Most materials return black (no emission).
    fn emitted(&self, _rec: &HitRecord) -> Color {
        Color::ZERO
    }
}

/// Lambertian (diffuse) material.
#[derive(Debug, Clone)]
pub struct Diffuse {
    albedo: Color,
}

impl Diffuse {
    pub fn new(albedo: Color) -> Self {
        Self { albedo }
    }
}

impl Material for Diffuse {
    fn scatter(&self, _ray_in: &Ray, rec: &HitRecord, sampler: &mut Sampler) -> Option<(Color, Ray)> {
        // Cosine weighted: normal plus a point on the unit sphere.
        let mut direction = rec.normal + random_unit_vector(sampler);

        // Catch degenerate scatter direction
        if direction.length_squared() < 1e-8 {
            direction = rec.normal;
        }
        Some((self.albedo, Ray::new(rec.point, direction)))
    }
}

/// Metal (specular) material.
#[derive(Debug, Clone)]
pub struct Metal {
    albedo: Color,
    roughness: f32,
}

impl Metal {
    /// `roughness`: 0.0 = perfect mirror, 1.0 = very rough
    pub fn new(albedo: Color, roughness: f32) -> Self {
        Self {
            albedo,
            roughness: roughness.clamp(0.0, 1.0),
        }
    }
}

impl Material for Metal {
    fn scatter(&self, ray_in: &Ray, rec: &HitRecord, sampler: &mut Sampler) -> Option<(Color, Ray)> {
        let reflected = reflect(ray_in.direction.normalize(), rec.normal);
        let direction = reflected + self.roughness * random_unit_vector(sampler);

        // Fuzzed below the surface: absorbed.
        if direction.dot(rec.normal) > 0.0 {
            Some((self.albedo, Ray::new(rec.point, direction)))
        } else {
            None
        }
    }
}

/// Dielectric (glass) material.
#[derive(Debug, Clone)]
pub struct Glass {
    tint: Color,
    ior: f32,
    roughness: f32,
}

impl Glass {
    /// `ior`: index of refraction (1.0 = air, 1.5 = glass, 2.4 = diamond)
    pub fn new(tint: Color, ior: f32, roughness: f32) -> Self {
        Self {
            tint,
            ior,
            roughness: roughness.clamp(0.0, 1.0),
        }
    }

    /// Schlick's approximation for reflectance
    fn reflectance(cosine: f32, ior: f32) -> f32 {
        let r0 = ((1.0 - ior) / (1.0 + ior)).powi(2);
        r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
    }
}

impl Material for Glass {
    fn scatter(&self, ray_in: &Ray, rec: &HitRecord, sampler: &mut Sampler) -> Option<(Color, Ray)> {
        let refraction_ratio = if rec.front_face { 1.0 / self.ior } else { self.ior };

        let unit_direction = ray_in.direction.normalize();
        let cos_theta = (-unit_direction).dot(rec.normal).min(1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

        // Check for total internal reflection
        let cannot_refract = refraction_ratio * sin_theta > 1.0;
        let choose_reflect = cannot_refract || Self::reflectance(cos_theta, refraction_ratio) > sampler.dimension();

        let (direction, origin) = if choose_reflect {
            (reflect(unit_direction, rec.normal), rec.point)
        } else {
            (
                refract(unit_direction, rec.normal, refraction_ratio),
                rec.point - rec.normal * REFRACTION_OFFSET,
            )
        };
        let direction = direction + self.roughness * random_unit_vector(sampler);

        Some((self.tint, Ray::new(origin, direction)))
    }
}

/// Light emitter. Absorbs everything it is hit by.
#[derive(Debug, Clone)]
pub struct Emission {
    radiance: Color,
}

impl Emission {
    pub fn new(color: Color, strength: f32) -> Self {
        Self {
            radiance: color * strength,
        }
    }
}

impl Material for Emission {
    fn scatter(&self, _ray_in: &Ray, _rec: &HitRecord, _sampler: &mut Sampler) -> Option<(Color, Ray)> {
        None
    }

    fn emitted(&self, _rec: &HitRecord) -> Color {
        self.radiance
    }
}

/// Build the runtime material for a description.
pub fn compile_material(desc: &MaterialDescription) -> Box<dyn Material> {
    match *desc {
        MaterialDescription::Diffuse { color } => Box::new(Diffuse::new(color)),
        MaterialDescription::Metal { color, roughness } => Box::new(Metal::new(color, roughness)),
        MaterialDescription::Glass { color, ior, roughness } => Box::new(Glass::new(color, ior, roughness)),
        MaterialDescription::Emission { color, strength } => Box::new(Emission::new(color, strength)),
    }
}

/// Compiled counterpart of a [`MaterialSet`].
#[derive(Debug)]
pub struct MaterialList {
    materials: Vec<Box<dyn Material>>,
    fallback: Diffuse,
}

impl MaterialList {
    pub fn compile(set: &MaterialSet) -> Arc<Self> {
        Arc::new(Self::from_materials(set.materials.iter().map(compile_material).collect()))
    }

    pub fn from_materials(materials: Vec<Box<dyn Material>>) -> Self {
        Self {
            materials,
            fallback: Diffuse::new(Color::splat(0.5)),
        }
    }

    /// Material at `index`, or a neutral gray diffuse when the set has no
    /// such entry.
    pub fn get(&self, index: u32) -> &dyn Material {
        match self.materials.get(index as usize) {
            Some(m) => m.as_ref(),
            None => &self.fallback,
        }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

// =============================================================================
// Helper functions
// =============================================================================

/// Reflect a vector about a normal.
#[inline]
fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

/// Refract a vector through a surface.
#[inline]
fn refract(uv: Vec3, n: Vec3, etai_over_etat: f32) -> Vec3 {
    let cos_theta = (-uv).dot(n).min(1.0);
    let r_out_perp = etai_over_etat * (uv + cos_theta * n);
    let r_out_parallel = -(1.0 - r_out_perp.length_squared()).abs().sqrt() * n;
    r_out_perp + r_out_parallel
}

/// Uniform point on the unit sphere from two sampler dimensions.
fn random_unit_vector(sampler: &mut Sampler) -> Vec3 {
    let z = 1.0 - 2.0 * sampler.dimension();
    let phi = 2.0 * std::f32::consts::PI * sampler.dimension();
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cray_core::SamplerKind;

    fn hit_facing_up() -> HitRecord {
        let mut rec = HitRecord::new(1.0, Vec3::ZERO);
        rec.normal = Vec3::Y;
        rec
    }

    fn sampler() -> Sampler {
        let mut s = Sampler::new(SamplerKind::Random);
        s.init(0, 1, 17);
        s
    }

    #[test]
    fn test_diffuse_scatters_into_hemisphere() {
        let mat = Diffuse::new(Color::new(0.8, 0.2, 0.2));
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), -Vec3::Y);
        let mut s = sampler();
        for _ in 0..100 {
            let (att, scattered) = mat.scatter(&ray, &hit_facing_up(), &mut s).unwrap();
            assert_eq!(att, Color::new(0.8, 0.2, 0.2));
            assert!(scattered.direction.dot(Vec3::Y) >= 0.0);
        }
    }

    #[test]
    fn test_mirror_reflects() {
        let mat = Metal::new(Color::ONE, 0.0);
        let ray = Ray::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, -1.0, 0.0));
        let (_, scattered) = mat.scatter(&ray, &hit_facing_up(), &mut sampler()).unwrap();
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((scattered.direction - expected).length() < 0.001);
    }

    #[test]
    fn test_emission_absorbs_and_emits() {
        let mat = Emission::new(Color::new(1.0, 0.5, 0.25), 4.0);
        let ray = Ray::new(Vec3::Y, -Vec3::Y);
        assert!(mat.scatter(&ray, &hit_facing_up(), &mut sampler()).is_none());
        assert_eq!(mat.emitted(&hit_facing_up()), Color::new(4.0, 2.0, 1.0));
    }

    #[test]
    fn test_glass_always_scatters() {
        let mat = Glass::new(Color::ONE, 1.5, 0.0);
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), -Vec3::Y);
        let mut s = sampler();
        for _ in 0..50 {
            let (att, scattered) = mat.scatter(&ray, &hit_facing_up(), &mut s).unwrap();
            assert_eq!(att, Color::ONE);
            assert!(scattered.direction.is_finite());
        }
    }

    #[test]
    fn test_material_list_fallback() {
        let list = MaterialList::compile(&MaterialSet::new(vec![MaterialDescription::Emission {
            color: Color::ONE,
            strength: 2.0,
        }]));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).emitted(&hit_facing_up()), Color::splat(2.0));
        // Out of range indices land on the gray diffuse.
        assert_eq!(list.get(5).emitted(&hit_facing_up()), Color::ZERO);
        assert!(list.get(5).scatter(&Ray::new(Vec3::Y, -Vec3::Y), &hit_facing_up(), &mut sampler()).is_some());
    }
}
