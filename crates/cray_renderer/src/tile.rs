//! Tile scheduling.
//!
//! The frame is cut into rectangular tiles that are rendered independently.
//! A [`TileSet`] owns the canonical tile list and hands tiles out to local
//! threads and to remote workers. All bookkeeping happens under a single
//! mutex; pixel data never does.

use cray_core::TileOrder;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Lifecycle of a tile within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileState {
    #[default]
    Ready,
    Rendering,
    Finished,
}

/// A rectangular region of the image to render. `begin` is inclusive and
/// `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTile {
    pub width: u32,
    pub height: u32,
    pub begin_x: u32,
    pub begin_y: u32,
    pub end_x: u32,
    pub end_y: u32,
    /// Position of this tile in raster order.
    #[serde(rename = "tileNum")]
    pub index: usize,

    #[serde(skip)]
    pub state: TileState,
    /// Claimed by a network client rather than a local thread.
    #[serde(skip)]
    pub network_renderer: bool,
    /// Client currently holding the tile. Cleared when that client is lost.
    #[serde(skip)]
    pub remote_client: Option<usize>,
    #[serde(skip)]
    pub completed_samples: u32,
    #[serde(skip)]
    pub total_samples: u32,
}

impl RenderTile {
    pub fn new(begin_x: u32, begin_y: u32, end_x: u32, end_y: u32, index: usize) -> Self {
        Self {
            width: end_x - begin_x,
            height: end_y - begin_y,
            begin_x,
            begin_y,
            end_x,
            end_y,
            index,
            ..Default::default()
        }
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// A tile is abandoned when it was handed to a client that has since
    /// gone away without finishing it.
    pub fn is_abandoned(&self) -> bool {
        self.state == TileState::Rendering && self.network_renderer && self.remote_client.is_none()
    }
}

/// Progress of one in-flight tile, as reported in worker heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileProgress {
    #[serde(rename = "tileNum")]
    pub index: usize,
    pub completed_samples: u32,
    pub total_samples: u32,
}

/// Cut a `width` x `height` frame into tiles of at most
/// `tile_width` x `tile_height`, in raster order.
pub fn quantize(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Vec<RenderTile> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let tile_width = tile_width.clamp(1, width);
    let tile_height = tile_height.clamp(1, height);

    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);

    let mut tiles = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for y in 0..tiles_y {
        for x in 0..tiles_x {
            let begin_x = x * tile_width;
            let begin_y = y * tile_height;
            let end_x = (begin_x + tile_width).min(width);
            let end_y = (begin_y + tile_height).min(height);
            let index = tiles.len();
            tiles.push(RenderTile::new(begin_x, begin_y, end_x, end_y, index));
        }
    }

    log::debug!(
        "Quantized {}x{} into {} tiles of {}x{}",
        width,
        height,
        tiles.len(),
        tile_width,
        tile_height
    );
    tiles
}

/// Apply a claim order to a raster-ordered tile list.
pub fn reorder(tiles: Vec<RenderTile>, order: TileOrder, seed: u64) -> Vec<RenderTile> {
    match order {
        TileOrder::Normal => tiles,
        TileOrder::TopToBottom => reverse(tiles),
        TileOrder::FromMiddle => from_middle(tiles),
        TileOrder::ToMiddle => to_middle(tiles),
        TileOrder::Random => shuffle(tiles, seed),
    }
}

fn reverse(mut tiles: Vec<RenderTile>) -> Vec<RenderTile> {
    tiles.reverse();
    tiles
}

/// Start at the center index and alternate right, left, right, ...
fn from_middle(tiles: Vec<RenderTile>) -> Vec<RenderTile> {
    let count = tiles.len();
    if count == 0 {
        return tiles;
    }
    let mut order = Vec::with_capacity(count);
    let mut right = count / 2;
    let mut left = right as isize - 1;
    let mut take_right = true;
    while order.len() < count {
        if (take_right && right < count) || left < 0 {
            order.push(right);
            right += 1;
        } else {
            order.push(left as usize);
            left -= 1;
        }
        take_right = !take_right;
    }
    pick(&tiles, &order)
}

/// Alternate between the last and first remaining tile, meeting in the
/// middle.
fn to_middle(tiles: Vec<RenderTile>) -> Vec<RenderTile> {
    let count = tiles.len();
    let mut order = Vec::with_capacity(count);
    let (mut left, mut right) = (0usize, count);
    let mut take_right = true;
    while left < right {
        if take_right {
            right -= 1;
            order.push(right);
        } else {
            order.push(left);
            left += 1;
        }
        take_right = !take_right;
    }
    pick(&tiles, &order)
}

fn shuffle(mut tiles: Vec<RenderTile>, seed: u64) -> Vec<RenderTile> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let n = tiles.len();
    for i in 0..n {
        let j = rng.gen_range(0..n);
        tiles.swap(i, j);
    }
    tiles
}

fn pick(tiles: &[RenderTile], order: &[usize]) -> Vec<RenderTile> {
    order.iter().map(|&i| tiles[i]).collect()
}

// =============================================================================
// Shared tile list
// =============================================================================

#[derive(Debug, Default)]
struct TileList {
    tiles: Vec<RenderTile>,
    /// Next position in claim order that has never been handed out.
    next: usize,
    finished: usize,
    /// Current interactive pass, 1-based.
    pass: u32,
}

/// The master's canonical tile list.
#[derive(Debug)]
pub struct TileSet {
    inner: Mutex<TileList>,
    samples: u32,
}

impl TileSet {
    /// Quantize and reorder a frame. `samples` bounds the progressive passes.
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32, order: TileOrder, seed: u64, samples: u32) -> Self {
        let tiles = reorder(quantize(width, height, tile_width, tile_height), order, seed);
        Self::from_tiles(tiles, samples)
    }

    pub fn from_tiles(mut tiles: Vec<RenderTile>, samples: u32) -> Self {
        for tile in &mut tiles {
            tile.total_samples = samples;
        }
        Self {
            inner: Mutex::new(TileList {
                tiles,
                pass: 1,
                ..Default::default()
            }),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finished_count(&self) -> usize {
        self.inner.lock().finished
    }

    pub fn is_complete(&self) -> bool {
        let list = self.inner.lock();
        list.finished == list.tiles.len()
    }

    /// Claim the next tile for a local thread.
    ///
    /// Fresh tiles go out in claim order. Once those run out, a tile left
    /// behind by a lost network client is reclaimed instead.
    pub fn next_tile(&self) -> Option<RenderTile> {
        self.claim(None)
    }

    /// Claim the next tile on behalf of network client `client`.
    pub fn next_tile_for_client(&self, client: usize) -> Option<RenderTile> {
        self.claim(Some(client))
    }

    fn claim(&self, client: Option<usize>) -> Option<RenderTile> {
        let mut list = self.inner.lock();

        while list.next < list.tiles.len() {
            let pos = list.next;
            list.next += 1;
            let tile = &mut list.tiles[pos];
            if tile.state != TileState::Ready {
                continue;
            }
            tile.state = TileState::Rendering;
            tile.network_renderer = client.is_some();
            tile.remote_client = client;
            return Some(*tile);
        }

        let tile = list.tiles.iter_mut().find(|t| t.is_abandoned())?;
        log::debug!("Reclaiming abandoned tile {}", tile.index);
        tile.network_renderer = client.is_some();
        tile.remote_client = client;
        tile.completed_samples = 0;
        Some(*tile)
    }

    /// Progressive variant of [`TileSet::next_tile`]. Every tile gets one
    /// sample per pass; a new pass starts only once every tile has finished
    /// the current one, up to the configured sample count. Returns the tile
    /// and the 1-based pass it should render, or `None` if nothing can be
    /// claimed right now.
    pub fn next_tile_interactive(&self) -> Option<(RenderTile, u32)> {
        let mut list = self.inner.lock();
        loop {
            let pass = list.pass;
            let ready = list
                .tiles
                .iter()
                .position(|t| t.state == TileState::Ready && t.completed_samples + 1 == pass);
            if let Some(pos) = ready {
                let tile = &mut list.tiles[pos];
                tile.state = TileState::Rendering;
                return Some((*tile, pass));
            }

            let pass_done = list.tiles.iter().all(|t| t.completed_samples >= pass);
            if !pass_done || pass >= self.samples {
                return None;
            }
            list.pass += 1;
        }
    }

    /// Record that a claimed tile has finished.
    pub fn mark_finished(&self, index: usize) {
        let mut list = self.inner.lock();
        let Some(tile) = list.tiles.iter_mut().find(|t| t.index == index) else {
            return;
        };
        if tile.state == TileState::Finished {
            return;
        }
        tile.state = TileState::Finished;
        tile.remote_client = None;
        tile.completed_samples = tile.total_samples;
        list.finished += 1;
    }

    /// Check a tile submitted by network client `client` against the tile
    /// it was handed: same rectangle, still rendering, still owned by it.
    pub fn check_submission(&self, client: usize, tile: &RenderTile) -> Result<(), String> {
        let list = self.inner.lock();
        let Some(held) = list.tiles.iter().find(|t| t.index == tile.index) else {
            return Err(format!("unknown tile {}", tile.index));
        };
        if held.state != TileState::Rendering || held.remote_client != Some(client) {
            return Err(format!("tile {} is not assigned to client {}", tile.index, client));
        }
        let rect = |t: &RenderTile| (t.begin_x, t.begin_y, t.end_x, t.end_y, t.width, t.height);
        if rect(held) != rect(tile) {
            return Err(format!("tile {} does not match the assigned region", tile.index));
        }
        Ok(())
    }

    /// Record the end of one interactive pass over a tile. The tile only
    /// counts as finished after the final pass.
    pub fn mark_pass_done(&self, index: usize, pass: u32) {
        if pass >= self.samples {
            self.mark_finished(index);
            return;
        }
        let mut list = self.inner.lock();
        if let Some(tile) = list.tiles.iter_mut().find(|t| t.index == index) {
            tile.completed_samples = pass;
            tile.state = TileState::Ready;
        }
    }

    /// Update per-tile progress from a worker heartbeat.
    pub fn update_from_stats(&self, client: usize, stats: &[TileProgress]) {
        let mut list = self.inner.lock();
        for reported in stats {
            if let Some(tile) = list
                .tiles
                .iter_mut()
                .find(|t| t.index == reported.index && t.remote_client == Some(client))
            {
                tile.completed_samples = reported.completed_samples;
            }
        }
    }

    /// Release every tile held by a lost client so it can be reclaimed.
    /// Returns how many tiles were released.
    pub fn abandon_client(&self, client: usize) -> usize {
        let mut list = self.inner.lock();
        let mut released = 0;
        for tile in list.tiles.iter_mut() {
            if tile.state == TileState::Rendering && tile.remote_client == Some(client) {
                tile.remote_client = None;
                released += 1;
            }
        }
        released
    }

    /// True while a tile handed to a network client is unfinished, whether
    /// that client is still connected or its tile is waiting to be
    /// reclaimed. Local threads keep polling while this is set.
    pub fn has_remote_work(&self) -> bool {
        self.inner
            .lock()
            .tiles
            .iter()
            .any(|t| t.state == TileState::Rendering && t.network_renderer)
    }

    /// Snapshot of the tile list in claim order.
    pub fn snapshot(&self) -> Vec<RenderTile> {
        self.inner.lock().tiles.clone()
    }
}
