//! Error types for rendering sessions.

use cray_core::CoreError;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors that stop a render from starting or finishing.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Scene error: {0}")]
    Scene(#[from] CoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No local threads and no reachable workers, nothing would render")]
    NoWorkers,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type RenderResult<T> = Result<T, RenderError>;
