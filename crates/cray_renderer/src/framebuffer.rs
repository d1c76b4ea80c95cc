//! Shared float accumulation buffer.
//!
//! Tiles cover disjoint pixel rectangles, so render threads write into the
//! buffer concurrently without locking. Each channel is stored as the bit
//! pattern of an `f32` in an `AtomicU32`, which keeps the buffer `Sync`
//! without any `unsafe`.

use std::sync::atomic::{AtomicU32, Ordering};

use cray_core::Texture;
use image::RgbImage;

use crate::material::Color;
use crate::tile::RenderTile;

/// Display gamma applied when converting to 8-bit.
pub const DISPLAY_GAMMA: f32 = 2.2;

#[derive(Debug)]
pub struct AccumulationBuffer {
    width: u32,
    height: u32,
    data: Vec<AtomicU32>,
}

impl AccumulationBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 3;
        Self {
            width,
            height,
            data: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        let i = self.offset(x, y);
        Color::new(
            f32::from_bits(self.data[i].load(Ordering::Relaxed)),
            f32::from_bits(self.data[i + 1].load(Ordering::Relaxed)),
            f32::from_bits(self.data[i + 2].load(Ordering::Relaxed)),
        )
    }

    pub fn set(&self, x: u32, y: u32, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.offset(x, y);
        for c in 0..3 {
            self.data[i + c].store(color[c].to_bits(), Ordering::Relaxed);
        }
    }

    /// Paint a tile result (tile-local, row-major) at the tile's offset.
    pub fn paint_tile(&self, tile: &RenderTile, pixels: &Texture) {
        for y in 0..tile.height.min(pixels.height) {
            for x in 0..tile.width.min(pixels.width) {
                self.set(tile.begin_x + x, tile.begin_y + y, pixels.pixel(x, y));
            }
        }
    }

    /// Copy a tile's pixels out as a float texture, as sent over the wire.
    pub fn extract_tile(&self, tile: &RenderTile) -> Texture {
        let mut texture = Texture::new_float(tile.width, tile.height, 3);
        for y in 0..tile.height {
            for x in 0..tile.width {
                texture.set_pixel(x, y, self.get(tile.begin_x + x, tile.begin_y + y));
            }
        }
        texture
    }

    /// Tone map to an 8-bit RGB image.
    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let c = self.get(x, y);
            image::Rgb([to_byte(c.x), to_byte(c.y), to_byte(c.z)])
        })
    }
}

/// Gamma encode a linear value.
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.powf(1.0 / DISPLAY_GAMMA)
    } else {
        0.0
    }
}

#[inline]
fn to_byte(linear: f32) -> u8 {
    (255.0 * linear_to_gamma(linear.clamp(0.0, 1.0)) + 0.5) as u8
}
