//! Render sessions.
//!
//! A [`RenderSession`] owns everything one frame needs: the world, the tile
//! list, the accumulation buffer, the abort flag and any synced network
//! clients. [`RenderSession::render`] runs local threads and one network
//! thread per client until every tile is finished or the render is aborted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cray_core::{RenderPrefs, SamplerKind, Scene};
use image::RgbImage;

use crate::error::{RenderError, RenderResult};
use crate::framebuffer::AccumulationBuffer;
use crate::integrator::{path_trace, IntegratorSettings};
use crate::material::Color;
use crate::protocol::{self, RenderClient};
use crate::sampler::Sampler;
use crate::tile::{RenderTile, TileSet};
use crate::world::World;

/// How often the coordinating thread wakes up.
pub const POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Interval between progress log lines.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Cloneable handle that stops a running render.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// Facts about a finished frame, for the image writer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderMetadata {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub bounces: u32,
    pub elapsed: Duration,
    pub local_threads: usize,
    pub clients: usize,
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub image: RgbImage,
    pub metadata: RenderMetadata,
    /// The frame was stopped before every tile finished.
    pub aborted: bool,
}

impl RenderOutcome {
    /// Whether the image is worth writing out.
    pub fn should_save(&self, save_on_abort: bool) -> bool {
        !self.aborted || save_on_abort
    }
}

// =============================================================================
// Per-tile rendering, shared by local threads and workers
// =============================================================================

/// Everything needed to render samples of a tile into a buffer.
#[derive(Clone, Copy)]
pub(crate) struct TileRenderer<'a> {
    pub world: &'a World,
    pub settings: IntegratorSettings,
    pub sampler: SamplerKind,
    pub samples: u32,
    pub abort: &'a AtomicBool,
}

impl<'a> TileRenderer<'a> {
    pub fn new(world: &'a World, prefs: &RenderPrefs, abort: &'a AtomicBool) -> Self {
        Self {
            world,
            settings: IntegratorSettings {
                max_bounces: prefs.bounces,
                contrast: prefs.contrast,
            },
            sampler: prefs.sampler,
            samples: prefs.samples,
            abort,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Add sample `pass` (1-based) to every pixel of the tile as a running
    /// average. Returns false if the render was aborted part way.
    pub fn render_pass(&self, tile: &RenderTile, pass: u32, sampler: &mut Sampler, buffer: &AccumulationBuffer) -> bool {
        let camera = &self.world.camera;
        let weight = (pass - 1) as f32;
        let inv = 1.0 / pass as f32;

        for y in tile.begin_y..tile.end_y {
            for x in tile.begin_x..tile.end_x {
                if self.is_aborted() {
                    return false;
                }
                let pixel_index = y * camera.image_width + x;
                sampler.init(pass - 1, self.samples, pixel_index);

                let ray = camera.get_ray(x, y, sampler);
                let output = buffer.get(x, y);
                let sample = nan_clamp(path_trace(&ray, self.world, &self.settings, sampler), output);

                buffer.set(x, y, (output * weight + sample) * inv);
            }
        }
        true
    }

    /// Render every pass of a tile. Returns false if aborted.
    pub fn render_tile(&self, tile: &RenderTile, sampler: &mut Sampler, buffer: &AccumulationBuffer) -> bool {
        (1..=self.samples).all(|pass| self.render_pass(tile, pass, sampler, buffer))
    }
}

/// Replace non-finite components of a fresh sample with the running value.
#[inline]
fn nan_clamp(sample: Color, output: Color) -> Color {
    let pick = |s: f32, o: f32| if s.is_finite() { s } else { o };
    Color::new(pick(sample.x, output.x), pick(sample.y, output.y), pick(sample.z, output.z))
}

/// Body of a local render thread: claim tiles until none are left.
///
/// While a network client still holds tiles, the thread keeps polling so it
/// can pick them up if the client is lost.
pub(crate) fn render_local(renderer: &TileRenderer, tiles: &TileSet, buffer: &AccumulationBuffer, interactive: bool) {
    let mut sampler = Sampler::new(renderer.sampler);

    while !renderer.is_aborted() {
        if interactive {
            match tiles.next_tile_interactive() {
                Some((tile, pass)) => {
                    if !renderer.render_pass(&tile, pass, &mut sampler, buffer) {
                        return;
                    }
                    tiles.mark_pass_done(tile.index, pass);
                }
                None if tiles.is_complete() => return,
                None => thread::sleep(POLL_INTERVAL),
            }
            continue;
        }

        match tiles.next_tile() {
            Some(tile) => {
                if !renderer.render_tile(&tile, &mut sampler, buffer) {
                    return;
                }
                tiles.mark_finished(tile.index);
            }
            None if tiles.has_remote_work() => thread::sleep(POLL_INTERVAL),
            None => return,
        }
    }
}

/// Shared state of one frame, handed to every render and network thread.
pub(crate) struct FrameContext<'a> {
    pub renderer: TileRenderer<'a>,
    pub tiles: &'a TileSet,
    pub buffer: &'a AccumulationBuffer,
    pub local_threads: usize,
}

// =============================================================================
// Session
// =============================================================================

pub struct RenderSession {
    world: World,
    prefs: RenderPrefs,
    tiles: TileSet,
    buffer: AccumulationBuffer,
    abort: AbortHandle,
    local_threads: usize,
    clients: Vec<RenderClient>,
}

impl RenderSession {
    /// Prepare a frame: build the world and cut the image into tiles.
    pub fn new(scene: Scene) -> RenderResult<Self> {
        scene.prefs.validate()?;
        let prefs = scene.prefs.clone();
        let world = World::new(scene);
        log::debug!("{} instances within {:?}", world.instance_count(), world.bounds());

        let (width, height) = (world.camera.image_width, world.camera.image_height);
        let tiles = TileSet::new(
            width,
            height,
            prefs.tile_width,
            prefs.tile_height,
            prefs.tile_order,
            prefs.seed,
            prefs.samples,
        );
        log::info!(
            "{}x{} frame, {} tiles of {}x{}, {} samples, {} bounces",
            width,
            height,
            tiles.len(),
            prefs.tile_width,
            prefs.tile_height,
            prefs.samples,
            prefs.bounces
        );

        let local_threads = match prefs.threads {
            0 => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        };

        Ok(Self {
            world,
            buffer: AccumulationBuffer::new(width, height),
            tiles,
            prefs,
            abort: AbortHandle::new(),
            local_threads,
            clients: Vec::new(),
        })
    }

    /// Override the local thread count. Zero renders on network clients
    /// only.
    pub fn with_local_threads(mut self, threads: usize) -> Self {
        self.local_threads = threads;
        self
    }

    /// Attach clients returned by [`protocol::sync_clients`].
    pub fn with_clients(mut self, clients: Vec<RenderClient>) -> Self {
        self.clients = clients;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn prefs(&self) -> &RenderPrefs {
        &self.prefs
    }

    pub fn tiles(&self) -> &TileSet {
        &self.tiles
    }

    pub fn clients(&self) -> &[RenderClient] {
        &self.clients
    }

    /// Render the frame, blocking until it is complete or aborted.
    pub fn render(&mut self) -> RenderResult<RenderOutcome> {
        let interactive = self.prefs.interactive;
        if interactive && !self.clients.is_empty() {
            log::warn!("Interactive mode renders locally, ignoring {} network clients", self.clients.len());
            self.clients.clear();
        }

        let mut threads = self.local_threads;
        if threads > self.tiles.len() {
            log::warn!(
                "Reducing thread count from {} to {}, tiles are too large for more",
                threads,
                self.tiles.len()
            );
            threads = self.tiles.len();
        }
        if threads == 0 && self.clients.is_empty() {
            return Err(RenderError::NoWorkers);
        }

        log::info!(
            "Rendering with {} local thread{} and {} network client{}",
            threads,
            if threads == 1 { "" } else { "s" },
            self.clients.len(),
            if self.clients.len() == 1 { "" } else { "s" }
        );

        let start = Instant::now();
        let ctx = FrameContext {
            renderer: TileRenderer::new(&self.world, &self.prefs, self.abort.flag()),
            tiles: &self.tiles,
            buffer: &self.buffer,
            local_threads: threads,
        };
        let active = AtomicUsize::new(threads + self.clients.len());
        let clients = &mut self.clients;

        thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| {
                    render_local(&ctx.renderer, ctx.tiles, ctx.buffer, interactive);
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
            for client in clients.iter_mut() {
                let ctx = &ctx;
                let active = &active;
                s.spawn(move || {
                    protocol::run_client(client, ctx);
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }

            let mut last_report = Instant::now();
            while active.load(Ordering::SeqCst) > 0 {
                thread::sleep(POLL_INTERVAL);
                if last_report.elapsed() >= PROGRESS_INTERVAL {
                    log::info!(
                        "[{:.1?}] {}/{} tiles",
                        start.elapsed(),
                        ctx.tiles.finished_count(),
                        ctx.tiles.len()
                    );
                    last_report = Instant::now();
                }
            }
        });

        let elapsed = start.elapsed();
        let aborted = !self.tiles.is_complete();
        if aborted {
            log::warn!(
                "Render stopped after {:.2?} with {}/{} tiles finished",
                elapsed,
                self.tiles.finished_count(),
                self.tiles.len()
            );
        } else {
            log::info!("Render finished in {:.2?}", elapsed);
        }

        Ok(RenderOutcome {
            image: self.buffer.to_image(),
            metadata: RenderMetadata {
                width: self.buffer.width(),
                height: self.buffer.height(),
                samples: self.prefs.samples,
                bounces: self.prefs.bounces,
                elapsed,
                local_threads: threads,
                clients: self.clients.len(),
            },
            aborted,
        })
    }

    /// Linear radiance of one pixel after rendering.
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.buffer.get(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cray_core::{BackgroundDescription, CameraDescription, MaterialDescription, MaterialSet, ObjectRef, Sphere};
    use cray_math::{Transform, Vec3};

    /// Small scene: a diffuse sphere under a gradient sky.
    fn test_scene(width: u32, height: u32, prefs: RenderPrefs) -> Scene {
        let mut scene = Scene {
            camera: CameraDescription {
                width,
                height,
                ..Default::default()
            },
            background: BackgroundDescription::default(),
            prefs,
            ..Default::default()
        };
        scene.spheres.push(Sphere::new(Vec3::ZERO, 1.0));
        scene.add_instance(
            ObjectRef::Sphere(0),
            Transform::IDENTITY,
            Arc::new(MaterialSet::new(vec![MaterialDescription::Diffuse {
                color: Vec3::new(0.8, 0.3, 0.3),
            }])),
        );
        scene
    }

    fn prefs(threads: usize) -> RenderPrefs {
        RenderPrefs {
            threads,
            samples: 4,
            bounces: 4,
            tile_width: 8,
            tile_height: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_completes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut session = RenderSession::new(test_scene(32, 24, prefs(2))).unwrap();
        let outcome = session.render().unwrap();

        assert!(!outcome.aborted);
        assert_eq!(outcome.image.dimensions(), (32, 24));
        assert_eq!(outcome.metadata.samples, 4);
        assert!(session.tiles().is_complete());

        // Corner sees sky, center sees the sphere.
        let corner = session.pixel(0, 0);
        let center = session.pixel(16, 12);
        assert!(corner.min_element() > 0.0);
        assert!(center.x > center.z);
    }

    #[test]
    fn test_single_thread_is_deterministic() {
        let render = || {
            let mut session = RenderSession::new(test_scene(16, 16, prefs(1))).unwrap();
            session.render().unwrap().image.into_raw()
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn test_thread_count_does_not_change_image() {
        let render = |threads| {
            let mut session = RenderSession::new(test_scene(16, 16, prefs(threads))).unwrap();
            session.render().unwrap().image.into_raw()
        };
        assert_eq!(render(1), render(4));
    }

    #[test]
    fn test_interactive_matches_batch() {
        let batch = RenderSession::new(test_scene(16, 16, prefs(2))).unwrap().render().unwrap();
        let interactive = RenderSession::new(test_scene(
            16,
            16,
            RenderPrefs {
                interactive: true,
                ..prefs(2)
            },
        ))
        .unwrap()
        .render()
        .unwrap();
        assert!(!interactive.aborted);
        assert_eq!(batch.image.into_raw(), interactive.image.into_raw());
    }

    #[test]
    fn test_no_workers_refused() {
        let mut session = RenderSession::new(test_scene(8, 8, prefs(1)))
            .unwrap()
            .with_local_threads(0);
        assert!(matches!(session.render(), Err(RenderError::NoWorkers)));
    }

    #[test]
    fn test_abort_before_start() {
        let mut session = RenderSession::new(test_scene(16, 16, prefs(2))).unwrap();
        session.abort_handle().abort();
        let outcome = session.render().unwrap();
        assert!(outcome.aborted);
        assert!(outcome.should_save(true));
        assert!(!outcome.should_save(false));
    }

    #[test]
    fn test_invalid_prefs_rejected() {
        let bad = RenderPrefs {
            samples: 0,
            ..Default::default()
        };
        assert!(matches!(
            RenderSession::new(test_scene(8, 8, bad)),
            Err(RenderError::Scene(_))
        ));
    }

    #[test]
    fn test_local_thread_reclaims_tile_of_lost_client() {
        let session = RenderSession::new(test_scene(16, 8, prefs(1))).unwrap();
        let abort = AtomicBool::new(false);
        let renderer = TileRenderer::new(&session.world, &session.prefs, &abort);
        let held = session.tiles.next_tile_for_client(0).unwrap();

        thread::scope(|s| {
            let local = s.spawn(|| render_local(&renderer, &session.tiles, &session.buffer, false));
            while session.tiles.finished_count() + 1 < session.tiles.len() {
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(session.tiles.abandon_client(0), 1);
            local.join().unwrap();
        });

        assert!(session.tiles.is_complete());
        let center = session.pixel(held.begin_x + held.width / 2, held.begin_y + held.height / 2);
        assert!(center.max_element() > 0.0);
    }

    #[test]
    fn test_nan_clamp() {
        let out = nan_clamp(Vec3::new(f32::NAN, 0.5, f32::INFINITY), Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(out, Vec3::new(0.1, 0.5, 0.3));
    }
}
