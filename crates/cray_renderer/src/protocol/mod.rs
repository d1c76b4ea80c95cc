//! Distributed rendering over TCP.
//!
//! One master owns the canonical tile list. Workers connect in, receive the
//! scene and its assets, then rent tiles one at a time:
//!
//! ```text
//! master                                  worker
//!   handshake{version, githash}  ------>
//!                                <------  startSync
//!   loadScene{data, assets}      ------>
//!                                <------  ready{threadCount}
//!   startRender                  ------>
//!                                <------  getWork
//!   newWork{tile}                ------>
//!                                <------  stats{tiles}        (every 256ms)
//!                                <------  submitWork{result, tile}
//!   ok                           ------>
//!   ...
//!                                <------  getWork
//!   renderComplete               ------>
//!                                <------  goodbye
//! ```
//!
//! Every message is JSON inside a length-prefixed frame, see [`wire`].

mod codec;
mod master;
mod message;
pub mod wire;
mod worker;

use std::time::Duration;

use thiserror::Error;

pub use codec::{decode_texture, encode_texture, EncodedTexture};
pub(crate) use master::run_client;
pub use master::{shutdown_clients, sync_clients, ClientStatus, RenderClient};
pub use message::{Action, Message};
pub use wire::Connection;
pub use worker::{WorkerServer, WorkerSession};

/// Bumped whenever the message set changes incompatibly.
pub const PROTO_VERSION: &str = "0.1";

pub const DEFAULT_PORT: u16 = 2222;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Short commit hash of the build. Master and workers must match exactly.
pub fn git_hash() -> &'static str {
    env!("CRAY_GIT_HASH")
}

/// Errors raised on a single connection. None of these are fatal to a
/// render; the affected client is dropped.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Frame of {0} bytes exceeds the maximum message size")]
    FrameTooLarge(u64),

    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("Git hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Unexpected message: {0}")]
    Unexpected(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Resolve `host[:port]`, defaulting the port.
pub(crate) fn with_default_port(node: &str) -> String {
    if node.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        node.to_string()
    } else {
        format!("{}:{}", node, DEFAULT_PORT)
    }
}
