//! Iterative path tracing integrator.
//!
//! Throughput starts at the configured contrast and is multiplied by each
//! bounce's attenuation. Paths whose throughput reaches zero are dropped
//! without reweighting the survivors, so the estimate is biased in the same
//! way as the classic C-Ray integrator.

use cray_math::Ray;

use crate::material::Color;
use crate::sampler::Sampler;
use crate::world::World;

/// Per-render integrator settings.
#[derive(Debug, Clone, Copy)]
pub struct IntegratorSettings {
    pub max_bounces: u32,
    pub contrast: f32,
}

/// Radiance arriving along `ray`.
pub fn path_trace(ray: &Ray, world: &World, settings: &IntegratorSettings, sampler: &mut Sampler) -> Color {
    trace_counted(ray, world, settings, sampler).0
}

/// Same as [`path_trace`], also returning how many loop iterations ran.
pub fn trace_counted(
    ray: &Ray,
    world: &World,
    settings: &IntegratorSettings,
    sampler: &mut Sampler,
) -> (Color, u32) {
    let mut radiance = Color::ZERO;
    let mut throughput = Color::splat(settings.contrast);
    let mut ray = *ray;
    let mut iterations = 0;

    for bounce in 0..=settings.max_bounces {
        iterations += 1;

        let Some(rec) = world.closest_hit(&ray) else {
            radiance += throughput * world.background.sample(ray.direction);
            break;
        };

        if rec.has_degenerate_normal() {
            return (radiance, iterations);
        }

        let material = world.material(&rec);
        radiance += throughput * material.emitted(&rec);

        if bounce == settings.max_bounces {
            break;
        }

        let Some((attenuation, scattered)) = material.scatter(&ray, &rec, sampler) else {
            break;
        };

        throughput *= attenuation;
        if throughput.max_element() <= 0.0 {
            break;
        }
        ray = scattered;
    }

    (radiance, iterations)
}
