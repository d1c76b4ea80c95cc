//! Radiance for rays that leave the scene.

use std::f32::consts::PI;
use std::sync::Arc;

use cray_core::{BackgroundDescription, Texture};
use cray_math::Vec3;

use crate::material::Color;

#[derive(Debug, Clone)]
pub enum Background {
    Solid(Color),
    Gradient { down: Color, up: Color },
    Environment {
        texture: Arc<Texture>,
        intensity: f32,
        /// Rotation around +Y in radians.
        offset: f32,
    },
}

impl Background {
    /// Resolve a description. An environment background without a decoded
    /// texture falls back to black.
    pub fn from_description(desc: &BackgroundDescription, environment: Option<Arc<Texture>>) -> Self {
        match desc {
            BackgroundDescription::Solid { color } => Background::Solid(*color),
            BackgroundDescription::Gradient { down, up } => Background::Gradient { down: *down, up: *up },
            BackgroundDescription::Environment { intensity, offset, path } => match environment {
                Some(texture) => Background::Environment {
                    texture,
                    intensity: *intensity,
                    offset: offset.to_radians(),
                },
                None => {
                    log::warn!("Environment map {} was not loaded, using black", path);
                    Background::Solid(Color::ZERO)
                }
            },
        }
    }

    /// Radiance arriving from `direction` (need not be normalized).
    pub fn sample(&self, direction: Vec3) -> Color {
        let dir = direction.normalize_or_zero();
        match self {
            Background::Solid(color) => *color,
            Background::Gradient { down, up } => {
                let a = 0.5 * (dir.y + 1.0);
                down.lerp(*up, a)
            }
            Background::Environment {
                texture,
                intensity,
                offset,
            } => {
                // Equirectangular: u around the horizon, v from top to bottom.
                let phi = dir.z.atan2(dir.x) + offset;
                let theta = dir.y.clamp(-1.0, 1.0).acos();
                let u = (phi / (2.0 * PI)).rem_euclid(1.0);
                let v = theta / PI;
                texture.sample(u, v) * *intensity
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid() {
        let bg = Background::Solid(Color::new(0.1, 0.2, 0.3));
        assert_eq!(bg.sample(Vec3::X), Color::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_gradient_ends() {
        let bg = Background::Gradient {
            down: Color::ONE,
            up: Color::new(0.5, 0.7, 1.0),
        };
        assert!((bg.sample(Vec3::Y) - Color::new(0.5, 0.7, 1.0)).length() < 0.001);
        assert!((bg.sample(-Vec3::Y) - Color::ONE).length() < 0.001);
    }

    #[test]
    fn test_environment_lookup() {
        // Top row white, bottom row black.
        let mut tex = Texture::new_float(4, 2, 3);
        for x in 0..4 {
            tex.set_pixel(x, 0, Color::ONE);
        }
        let bg = Background::from_description(
            &BackgroundDescription::Environment {
                path: "sky.hdr".into(),
                intensity: 2.0,
                offset: 0.0,
            },
            Some(Arc::new(tex)),
        );
        assert!((bg.sample(Vec3::Y) - Color::splat(2.0)).length() < 0.001);
        assert!(bg.sample(-Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_missing_environment_is_black() {
        let bg = Background::from_description(
            &BackgroundDescription::Environment {
                path: "nope.hdr".into(),
                intensity: 1.0,
                offset: 0.0,
            },
            None,
        );
        assert_eq!(bg.sample(Vec3::X), Color::ZERO);
    }
}
