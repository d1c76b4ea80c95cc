//! JSON encoding of textures.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use byteorder::{ByteOrder, LittleEndian};
use cray_core::{Texture, TextureData};
use serde::{Deserialize, Serialize};

use super::{ProtocolError, ProtocolResult};

/// A texture as sent over the wire. Float samples travel as little-endian
/// `f32` bytes, byte samples as-is, both base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTexture {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: String,
    pub is_float_precision: bool,
}

pub fn encode_texture(texture: &Texture) -> EncodedTexture {
    let (bytes, is_float_precision) = match &texture.data {
        TextureData::Byte(b) => (b.clone(), false),
        TextureData::Float(f) => {
            let mut bytes = vec![0u8; f.len() * 4];
            LittleEndian::write_f32_into(f, &mut bytes);
            (bytes, true)
        }
    };
    EncodedTexture {
        width: texture.width,
        height: texture.height,
        channels: texture.channels,
        data: STANDARD.encode(bytes),
        is_float_precision,
    }
}

pub fn decode_texture(encoded: &EncodedTexture) -> ProtocolResult<Texture> {
    let bytes = STANDARD.decode(&encoded.data)?;
    let data = if encoded.is_float_precision {
        if bytes.len() % 4 != 0 {
            return Err(ProtocolError::InvalidPayload(format!(
                "float texture data of {} bytes",
                bytes.len()
            )));
        }
        let mut floats = vec![0f32; bytes.len() / 4];
        LittleEndian::read_f32_into(&bytes, &mut floats);
        TextureData::Float(floats)
    } else {
        TextureData::Byte(bytes)
    };
    Texture::from_data(encoded.width, encoded.height, encoded.channels, data)
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cray_math::Vec3;

    #[test]
    fn test_float_texture_round_trip() {
        let mut tex = Texture::new_float(3, 2, 3);
        tex.set_pixel(0, 0, Vec3::new(0.1, -2.5, 1e9));
        tex.set_pixel(2, 1, Vec3::new(f32::MIN_POSITIVE, 0.333, 7.0));
        let encoded = encode_texture(&tex);
        assert!(encoded.is_float_precision);
        assert_eq!(decode_texture(&encoded).unwrap(), tex);
    }

    #[test]
    fn test_byte_texture_round_trip() {
        let tex = Texture::from_data(2, 2, 3, TextureData::Byte((0..12).collect())).unwrap();
        let encoded = encode_texture(&tex);
        assert!(!encoded.is_float_precision);
        assert_eq!(encoded.data, STANDARD.encode((0..12).collect::<Vec<u8>>()));
        assert_eq!(decode_texture(&encoded).unwrap(), tex);
    }

    #[test]
    fn test_bad_texture_payloads() {
        let mut encoded = encode_texture(&Texture::new_float(2, 2, 3));
        encoded.width = 3;
        assert!(decode_texture(&encoded).is_err());

        encoded.data = "not base64!".into();
        assert!(matches!(decode_texture(&encoded), Err(ProtocolError::Base64(_))));
    }
}
