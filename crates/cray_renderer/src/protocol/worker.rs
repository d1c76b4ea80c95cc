//! Worker side: accept a master, load its scene, render the tiles it hands
//! out.
//!
//! Connections are served one at a time. Everything a connection loads
//! lives in its [`WorkerSession`] and is dropped when the master goes away.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cray_core::{FileCache, RenderPrefs, Scene};
use parking_lot::Mutex;

use super::codec::encode_texture;
use super::message::Action;
use super::wire::Connection;
use super::{git_hash, ProtocolError, ProtocolResult, PROTO_VERSION};
use crate::framebuffer::AccumulationBuffer;
use crate::renderer::{TileRenderer, POLL_INTERVAL};
use crate::sampler::Sampler;
use crate::tile::TileProgress;
use crate::world::World;

/// Interval between `stats` heartbeats.
pub const STATS_INTERVAL: Duration = Duration::from_millis(256);

/// What ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The master hung up; wait for the next one.
    Disconnected,
    /// The master asked this worker to exit.
    Shutdown,
}

/// Listens for masters on a TCP port.
#[derive(Debug)]
pub struct WorkerServer {
    listener: TcpListener,
    thread_limit: Option<usize>,
}

impl WorkerServer {
    pub fn bind(address: impl ToSocketAddrs) -> ProtocolResult<Self> {
        let listener = TcpListener::bind(address)?;
        Ok(Self {
            listener,
            thread_limit: None,
        })
    }

    /// Cap the render threads regardless of the scene's settings.
    pub fn with_thread_limit(mut self, threads: usize) -> Self {
        self.thread_limit = Some(threads.max(1));
        self
    }

    pub fn local_addr(&self) -> ProtocolResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve masters until one sends `shutdown`.
    pub fn run(&self) -> ProtocolResult<()> {
        log::info!("Listening for connections on {}", self.local_addr()?);
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let connection = match Connection::new(stream) {
                Ok(connection) => connection,
                Err(e) => {
                    log::warn!("Failed to set up connection: {}", e);
                    continue;
                }
            };
            log::info!("Got connection from {}", connection.peer());

            let mut session = WorkerSession::new(connection, self.thread_limit);
            match session.run() {
                Ok(SessionEnd::Shutdown) => {
                    log::info!("Received shutdown command, exiting");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => log::info!("Master disconnected, waiting for a new one"),
                Err(e) => log::warn!("Connection ended with error: {}", e),
            }
        }
        Ok(())
    }
}

/// A scene loaded for the current master.
struct LoadedScene {
    world: World,
    prefs: RenderPrefs,
}

/// State of one master connection.
pub struct WorkerSession {
    connection: Connection,
    scene: Option<LoadedScene>,
    thread_limit: Option<usize>,
}

impl WorkerSession {
    pub fn new(connection: Connection, thread_limit: Option<usize>) -> Self {
        Self {
            connection,
            scene: None,
            thread_limit,
        }
    }

    /// Handle commands until the master disconnects or asks us to exit.
    pub fn run(&mut self) -> ProtocolResult<SessionEnd> {
        loop {
            let action = match self.connection.receive_action() {
                Ok(action) => action,
                Err(ProtocolError::ConnectionClosed) => return Ok(SessionEnd::Disconnected),
                Err(e) => return Err(e),
            };

            match action {
                Action::Handshake { version, githash } => {
                    if version != PROTO_VERSION {
                        self.connection.send_error("Protocol version mismatch")?;
                        return Err(ProtocolError::VersionMismatch {
                            expected: PROTO_VERSION.to_string(),
                            actual: version,
                        });
                    }
                    if githash != git_hash() {
                        self.connection.send_error("Git hash mismatch")?;
                        return Err(ProtocolError::HashMismatch {
                            expected: git_hash().to_string(),
                            actual: githash,
                        });
                    }
                    self.connection.send_action(Action::StartSync)?;
                }
                Action::LoadScene { data, assets } => {
                    log::info!("Received scene description with {} assets", assets.len());
                    let loaded = FileCache::decode(&assets)
                        .and_then(|mut cache| Scene::from_description(&data, &mut cache));
                    match loaded {
                        Ok(scene) => {
                            let prefs = scene.prefs.clone();
                            let world = World::new(scene);
                            let thread_count = self.thread_count(&prefs);
                            self.scene = Some(LoadedScene { world, prefs });
                            self.connection.send_action(Action::Ready { thread_count })?;
                        }
                        Err(e) => {
                            log::warn!("Scene failed to load: {}", e);
                            self.connection.send_error(format!("Scene failed to load: {}", e))?;
                        }
                    }
                }
                Action::StartRender => match &self.scene {
                    Some(_) => self.render()?,
                    None => self.connection.send_error("No scene loaded")?,
                },
                Action::Goodbye => return Ok(SessionEnd::Disconnected),
                Action::Shutdown => return Ok(SessionEnd::Shutdown),
                other => {
                    log::debug!("Unknown command: {}", other.name());
                    self.connection.send_error("Unknown command")?;
                }
            }
        }
    }

    fn thread_count(&self, prefs: &RenderPrefs) -> usize {
        match (self.thread_limit, prefs.threads) {
            (Some(limit), _) => limit,
            (None, 0) => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            (None, n) => n,
        }
    }

    /// Run the render pool until the master has no more work, then say
    /// goodbye.
    fn render(&mut self) -> ProtocolResult<()> {
        let Some(loaded) = self.scene.as_ref() else {
            return Ok(());
        };
        let threads = self.thread_count(&loaded.prefs);
        let camera = &loaded.world.camera;
        log::info!(
            "Got job: {}x{}, {} samples with {} bounces, {} threads",
            camera.image_width,
            camera.image_height,
            loaded.prefs.samples,
            loaded.prefs.bounces,
            threads
        );

        let lost = AtomicBool::new(false);
        let renderer = TileRenderer::new(&loaded.world, &loaded.prefs, &lost);
        let buffer = AccumulationBuffer::new(camera.image_width, camera.image_height);
        let socket = Mutex::new(&mut self.connection);
        let progress: Vec<Mutex<Option<TileProgress>>> = (0..threads).map(|_| Mutex::new(None)).collect();
        let active = AtomicUsize::new(threads);

        thread::scope(|s| {
            for slot in &progress {
                let (renderer, buffer, socket, active, lost) = (&renderer, &buffer, &socket, &active, &lost);
                s.spawn(move || {
                    if let Err(e) = worker_thread(renderer, buffer, socket, slot) {
                        log::debug!("Render thread stopping: {}", e);
                        lost.store(true, Ordering::Relaxed);
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }

            let mut last_stats = Instant::now();
            while active.load(Ordering::SeqCst) > 0 {
                thread::sleep(POLL_INTERVAL);
                if last_stats.elapsed() < STATS_INTERVAL || lost.load(Ordering::Relaxed) {
                    continue;
                }
                let tiles: Vec<TileProgress> = progress.iter().filter_map(|p| *p.lock()).collect();
                if let Err(e) = socket.lock().send_action(Action::Stats { tiles }) {
                    log::debug!("Connection lost, bailing out: {}", e);
                    lost.store(true, Ordering::Relaxed);
                }
                last_stats = Instant::now();
            }
        });
        drop(socket);

        if lost.load(Ordering::Relaxed) {
            return Err(ProtocolError::ConnectionClosed);
        }
        log::info!("Render job done");
        self.connection.send_action(Action::Goodbye)
    }
}

/// One render thread: rent a tile, render every sample of it, send it back.
fn worker_thread(
    renderer: &TileRenderer,
    buffer: &AccumulationBuffer,
    socket: &Mutex<&mut Connection>,
    progress: &Mutex<Option<TileProgress>>,
) -> ProtocolResult<()> {
    let mut sampler = Sampler::new(renderer.sampler);

    loop {
        let tile = {
            let mut conn = socket.lock();
            conn.send_action(Action::GetWork)?;
            match conn.receive_action()? {
                Action::NewWork { tile } => tile,
                Action::RenderComplete => {
                    log::debug!("Master reported render is complete");
                    return Ok(());
                }
                other => return Err(ProtocolError::Unexpected(other.name().to_string())),
            }
        };

        *progress.lock() = Some(TileProgress {
            index: tile.index,
            completed_samples: 0,
            total_samples: renderer.samples,
        });
        for pass in 1..=renderer.samples {
            if !renderer.render_pass(&tile, pass, &mut sampler, buffer) {
                return Err(ProtocolError::ConnectionClosed);
            }
            if let Some(p) = progress.lock().as_mut() {
                p.completed_samples = pass;
            }
        }

        let result = encode_texture(&buffer.extract_tile(&tile));
        {
            let mut conn = socket.lock();
            conn.send_action(Action::SubmitWork { result, tile })?;
            match conn.receive_action()? {
                Action::Ok => {}
                other => return Err(ProtocolError::Unexpected(other.name().to_string())),
            }
        }
        *progress.lock() = None;
    }
}
