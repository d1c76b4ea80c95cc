//! The closed set of protocol messages.

use cray_core::{AssetEntry, SceneDescription};
use serde::{Deserialize, Serialize};

use super::codec::EncodedTexture;
use crate::tile::{RenderTile, TileProgress};

/// Every request and response, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    Handshake {
        version: String,
        githash: String,
    },
    StartSync,
    /// Scene description plus every file it references.
    LoadScene {
        data: Box<SceneDescription>,
        assets: Vec<AssetEntry>,
    },
    #[serde(rename_all = "camelCase")]
    Ready {
        thread_count: usize,
    },
    StartRender,
    GetWork,
    NewWork {
        tile: RenderTile,
    },
    RenderComplete,
    SubmitWork {
        result: EncodedTexture,
        tile: RenderTile,
    },
    Ok,
    /// Worker heartbeat listing its in-flight tiles.
    Stats {
        tiles: Vec<TileProgress>,
    },
    Goodbye,
    Shutdown,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Handshake { .. } => "handshake",
            Action::StartSync => "startSync",
            Action::LoadScene { .. } => "loadScene",
            Action::Ready { .. } => "ready",
            Action::StartRender => "startRender",
            Action::GetWork => "getWork",
            Action::NewWork { .. } => "newWork",
            Action::RenderComplete => "renderComplete",
            Action::SubmitWork { .. } => "submitWork",
            Action::Ok => "ok",
            Action::Stats { .. } => "stats",
            Action::Goodbye => "goodbye",
            Action::Shutdown => "shutdown",
        }
    }
}

/// What actually travels in a frame: an action, or `{"error": ".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Error { error: String },
    Action(Action),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::Error { .. } => "error",
            Message::Action(action) => action.name(),
        }
    }
}

impl From<Action> for Message {
    fn from(action: Action) -> Self {
        Message::Action(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_tags() {
        let msg = Message::from(Action::GetWork);
        assert_eq!(serde_json::to_value(&msg).unwrap(), json!({"action": "getWork"}));

        let ready = Message::from(Action::Ready { thread_count: 12 });
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            json!({"action": "ready", "threadCount": 12})
        );
    }

    #[test]
    fn test_error_shape() {
        let parsed: Message = serde_json::from_str(r#"{"error": "Git hash mismatch"}"#).unwrap();
        assert_eq!(
            parsed,
            Message::Error {
                error: "Git hash mismatch".into()
            }
        );
        assert_eq!(parsed.name(), "error");
    }

    #[test]
    fn test_handshake_parse() {
        let parsed: Message =
            serde_json::from_str(r#"{"action": "handshake", "version": "0.1", "githash": "abcd1234"}"#).unwrap();
        assert_eq!(
            parsed,
            Message::Action(Action::Handshake {
                version: "0.1".into(),
                githash: "abcd1234".into()
            })
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_str::<Message>(r#"{"action": "frobnicate"}"#).is_err());
        assert!(serde_json::from_str::<Message>(r#"{"tile": 3}"#).is_err());
    }

    #[test]
    fn test_new_work_tile_fields() {
        let msg = Message::from(Action::NewWork {
            tile: RenderTile::new(0, 32, 32, 64, 60),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["action"], "newWork");
        assert_eq!(value["tile"]["tileNum"], 60);
        assert_eq!(value["tile"]["beginY"], 32);
    }
}
