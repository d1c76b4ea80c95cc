//! Camera for ray generation.

use cray_core::CameraDescription;
use cray_math::{Ray, Vec3};

use crate::sampler::Sampler;

/// Thin-lens camera. Pixel (0, 0) is the top-left corner of the image.
#[derive(Debug, Clone)]
pub struct Camera {
    pub image_width: u32,
    pub image_height: u32,

    center: Vec3,
    pixel00_loc: Vec3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
    defocus_disk_u: Vec3,
    defocus_disk_v: Vec3,
    lens_radius: f32,
}

impl Camera {
    pub fn from_description(desc: &CameraDescription) -> Self {
        let width = desc.width.max(1);
        let height = desc.height.max(1);
        let focus_dist = desc
            .focus_distance
            .unwrap_or_else(|| (desc.position - desc.look_at).length())
            .max(1e-4);

        // Calculate viewport dimensions
        let h = (desc.fov.to_radians() / 2.0).tan();
        let viewport_height = 2.0 * h * focus_dist;
        let viewport_width = viewport_height * (width as f32 / height as f32);

        // Camera basis
        let w = (desc.position - desc.look_at).normalize_or_zero();
        let u = desc.up.cross(w).normalize_or_zero();
        let v = w.cross(u);

        let viewport_u = viewport_width * u;
        let viewport_v = -viewport_height * v;
        let pixel_delta_u = viewport_u / width as f32;
        let pixel_delta_v = viewport_v / height as f32;

        let viewport_upper_left = desc.position - focus_dist * w - viewport_u / 2.0 - viewport_v / 2.0;
        let lens_radius = desc.aperture.max(0.0) / 2.0;

        Self {
            image_width: width,
            image_height: height,
            center: desc.position,
            pixel00_loc: viewport_upper_left + 0.5 * (pixel_delta_u + pixel_delta_v),
            pixel_delta_u,
            pixel_delta_v,
            defocus_disk_u: u * lens_radius,
            defocus_disk_v: v * lens_radius,
            lens_radius,
        }
    }

    /// Ray through pixel (x, y), jittered inside the pixel by the sampler.
    pub fn get_ray(&self, x: u32, y: u32, sampler: &mut Sampler) -> Ray {
        let jitter_x = sampler.dimension() - 0.5;
        let jitter_y = sampler.dimension() - 0.5;

        let pixel_sample = self.pixel00_loc
            + (x as f32 + jitter_x) * self.pixel_delta_u
            + (y as f32 + jitter_y) * self.pixel_delta_v;

        let origin = if self.lens_radius <= 0.0 {
            self.center
        } else {
            self.defocus_disk_sample(sampler)
        };

        Ray::new(origin, pixel_sample - origin)
    }

    /// Concentric mapping of two sampler values onto the lens.
    fn defocus_disk_sample(&self, sampler: &mut Sampler) -> Vec3 {
        let r = sampler.dimension().sqrt();
        let theta = 2.0 * std::f32::consts::PI * sampler.dimension();
        self.center + r * theta.cos() * self.defocus_disk_u + r * theta.sin() * self.defocus_disk_v
    }
}
