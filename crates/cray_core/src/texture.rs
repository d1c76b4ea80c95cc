//! Pixel buffers with byte or float precision.
//!
//! Textures serve two purposes: environment maps decoded from the asset
//! cache, and rendered tile results shipped from workers back to the master.

use cray_math::Vec3;

use crate::error::{CoreError, CoreResult};

/// Pixel storage, row-major, `channels` values per pixel.
#[derive(Clone, Debug, PartialEq)]
pub enum TextureData {
    Byte(Vec<u8>),
    Float(Vec<f32>),
}

/// A width x height image with 1 to 4 channels.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: TextureData,
}

impl Texture {
    /// A zeroed float texture, as used for tile results.
    pub fn new_float(width: u32, height: u32, channels: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: TextureData::Float(vec![0.0; len]),
        }
    }

    /// A zeroed 8-bit texture.
    pub fn new_byte(width: u32, height: u32, channels: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: TextureData::Byte(vec![0; len]),
        }
    }

    /// Wrap existing samples after checking the length matches.
    pub fn from_data(width: u32, height: u32, channels: u8, data: TextureData) -> CoreResult<Self> {
        let expected = width as usize * height as usize * channels as usize;
        let actual = match &data {
            TextureData::Byte(b) => b.len(),
            TextureData::Float(f) => f.len(),
        };
        if channels == 0 || channels > 4 || expected != actual {
            return Err(CoreError::InvalidScene(format!(
                "texture {}x{}x{} does not match {} samples",
                width, height, channels, actual
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Decode an image file held in memory (PNG, JPEG, HDR, ...). HDR
    /// images keep float precision, everything else is stored as 8-bit sRGB.
    pub fn from_image_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let img = image::load_from_memory(bytes)?;
        let (width, height) = (img.width(), img.height());
        let texture = match img {
            image::DynamicImage::ImageRgb32F(_) | image::DynamicImage::ImageRgba32F(_) => {
                Texture::from_data(width, height, 3, TextureData::Float(img.to_rgb32f().into_raw()))?
            }
            _ => Texture::from_data(width, height, 3, TextureData::Byte(img.to_rgb8().into_raw()))?,
        };
        log::debug!(
            "Decoded {}x{} texture ({})",
            width,
            height,
            if texture.is_float() { "float" } else { "byte" }
        );
        Ok(texture)
    }

    pub fn is_float(&self) -> bool {
        matches!(self.data, TextureData::Float(_))
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// Linear RGB at integer coordinates. Byte textures are treated as sRGB.
    /// Single channel textures return gray.
    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        let base = self.offset(x, y);
        let channel = |c: usize| -> f32 {
            let c = base + c.min(self.channels as usize - 1);
            match &self.data {
                TextureData::Float(f) => f[c],
                TextureData::Byte(b) => srgb_to_linear(b[c]),
            }
        };
        Vec3::new(channel(0), channel(1), channel(2))
    }

    /// Write linear RGB. Float textures store the value as-is; byte textures
    /// store the clamped sRGB encoding.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Vec3) {
        if x >= self.width || y >= self.height {
            return;
        }
        let base = self.offset(x, y);
        let channels = (self.channels as usize).min(3);
        match &mut self.data {
            TextureData::Float(f) => {
                for c in 0..channels {
                    f[base + c] = color[c];
                }
            }
            TextureData::Byte(b) => {
                for c in 0..channels {
                    b[base + c] = linear_to_srgb(color[c]);
                }
            }
        }
    }

    /// Sample the texture at UV coordinates (bilinear filtering).
    ///
    /// `u` wraps around horizontally, `v` is clamped to the top and bottom
    /// rows. (0, 0) is the top-left pixel.
    pub fn sample(&self, u: f32, v: f32) -> Vec3 {
        let u = u.rem_euclid(1.0);
        let v = v.clamp(0.0, 1.0);

        let x = u * (self.width as f32 - 1.0);
        let y = v * (self.height as f32 - 1.0);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let fx = x.fract();
        let fy = y.fract();

        let top = self.pixel(x0, y0).lerp(self.pixel(x1, y0), fx);
        let bottom = self.pixel(x0, y1).lerp(self.pixel(x1, y1), fx);
        top.lerp(bottom, fy)
    }

    /// Get total size in bytes of the pixel storage.
    pub fn size_bytes(&self) -> usize {
        match &self.data {
            TextureData::Byte(b) => b.len(),
            TextureData::Float(f) => f.len() * std::mem::size_of::<f32>(),
        }
    }
}

/// Convert sRGB byte value to linear float.
pub fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Convert a linear float to an sRGB byte, clamping to [0, 1] first.
pub fn linear_to_srgb(value: f32) -> u8 {
    let v = value.clamp(0.0, 1.0);
    let s = if v <= 0.0031308 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (s * 255.0).round() as u8
}
