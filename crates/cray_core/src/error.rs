//! Error types for scene loading and asset handling.

use thiserror::Error;

/// Errors that can occur while reading or building a scene.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Asset not found: {0}")]
    MissingAsset(String),

    #[error("Invalid scene: {0}")]
    InvalidScene(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
