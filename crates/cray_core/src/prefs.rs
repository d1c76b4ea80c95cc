//! Render preferences read from the `renderer` block of a scene file.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Order in which tiles are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TileOrder {
    /// Raster order, left to right and top to bottom.
    #[default]
    Normal,
    TopToBottom,
    FromMiddle,
    ToMiddle,
    Random,
}

/// Sample sequence used for camera jitter and scattering decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SamplerKind {
    Halton,
    Hammersley,
    #[default]
    Random,
}

/// Every knob of a render. All fields have defaults so a scene file may
/// omit the block entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderPrefs {
    /// Local render threads. 0 picks the machine's available parallelism.
    pub threads: usize,
    pub samples: u32,
    pub bounces: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_order: TileOrder,
    pub sampler: SamplerKind,
    /// Initial path throughput.
    pub contrast: f32,
    /// Progressive mode: every pass sweeps the whole frame once.
    pub interactive: bool,
    pub save_on_abort: bool,
    pub output_path: String,
    /// Comma separated `host[:port]` list of workers.
    pub nodes: Option<String>,
    /// Seed for the `random` tile order.
    pub seed: u64,
    /// Resolution overrides for the camera.
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for RenderPrefs {
    fn default() -> Self {
        Self {
            threads: 0,
            samples: 16,
            bounces: 20,
            tile_width: 32,
            tile_height: 32,
            tile_order: TileOrder::Normal,
            sampler: SamplerKind::Random,
            contrast: 1.0,
            interactive: false,
            save_on_abort: true,
            output_path: "output.png".to_string(),
            nodes: None,
            seed: 3141592,
            width: None,
            height: None,
        }
    }
}

impl RenderPrefs {
    /// Reject settings no render could proceed with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.samples == 0 {
            return Err(CoreError::InvalidScene("sample count must be at least 1".into()));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(CoreError::InvalidScene(format!(
                "invalid tile size {}x{}",
                self.tile_width, self.tile_height
            )));
        }
        if !self.contrast.is_finite() || self.contrast < 0.0 {
            return Err(CoreError::InvalidScene(format!("invalid contrast {}", self.contrast)));
        }
        Ok(())
    }

    /// Worker addresses listed in `nodes`, trimmed, empty entries dropped.
    pub fn node_list(&self) -> Vec<String> {
        self.nodes
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
