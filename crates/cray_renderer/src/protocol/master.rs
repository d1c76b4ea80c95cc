//! Master side: connecting to workers, syncing the scene, serving tiles.

use std::thread;

use cray_core::{AssetEntry, SceneDescription};

use super::codec::decode_texture;
use super::message::Action;
use super::wire::Connection;
use super::{git_hash, with_default_port, ProtocolError, ProtocolResult, CONNECT_TIMEOUT, PROTO_VERSION};
use crate::renderer::{render_local, FrameContext};

/// Where a client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Disconnected,
    Connected,
    ConnectionFailed,
    Syncing,
    SyncFailed,
    Synced,
    Rendering,
    Finished,
}

/// One remote worker as seen from the master.
#[derive(Debug)]
pub struct RenderClient {
    pub id: usize,
    pub address: String,
    pub status: ClientStatus,
    /// Threads the worker reported after loading the scene.
    pub available_threads: usize,
    connection: Option<Connection>,
}

impl RenderClient {
    /// Try to connect within [`CONNECT_TIMEOUT`].
    pub fn connect(id: usize, node: &str) -> Self {
        let address = with_default_port(node);
        log::debug!("Attempting connection to {}...", address);
        let (status, connection) = match Connection::connect(&address, CONNECT_TIMEOUT) {
            Ok(conn) => {
                log::debug!("Connected to {}", address);
                (ClientStatus::Connected, Some(conn))
            }
            Err(e) => {
                log::warn!("Failed to connect to {}: {}", address, e);
                (ClientStatus::ConnectionFailed, None)
            }
        };
        Self {
            id,
            address,
            status,
            available_threads: 0,
            connection,
        }
    }

    /// Close the socket and mark the client disconnected.
    pub fn drop_connection(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.close();
        }
        self.status = ClientStatus::Disconnected;
    }

    /// Handshake, upload the scene and wait for the worker to report ready.
    pub fn sync(&mut self, description: &SceneDescription, assets: &[AssetEntry]) -> ProtocolResult<()> {
        let conn = self.connection.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
        self.status = ClientStatus::Syncing;

        conn.send_action(Action::Handshake {
            version: PROTO_VERSION.to_string(),
            githash: git_hash().to_string(),
        })?;
        match conn.receive_action()? {
            Action::StartSync => {}
            other => return Err(ProtocolError::Unexpected(other.name().to_string())),
        }

        log::debug!("Syncing scene to client {}", self.id);
        conn.send_action(Action::LoadScene {
            data: Box::new(description.clone()),
            assets: assets.to_vec(),
        })?;
        match conn.receive_action()? {
            Action::Ready { thread_count } => self.available_threads = thread_count,
            other => return Err(ProtocolError::Unexpected(other.name().to_string())),
        }

        log::info!(
            "Client {} ({}) synced, {} threads available",
            self.id,
            self.address,
            self.available_threads
        );
        self.status = ClientStatus::Synced;
        Ok(())
    }
}

/// Connect to every node and sync the scene, in parallel. Only clients that
/// end up synced are returned; the rest are logged and dropped.
pub fn sync_clients(nodes: &[String], description: &SceneDescription, assets: &[AssetEntry]) -> Vec<RenderClient> {
    if nodes.is_empty() {
        return Vec::new();
    }
    let total_bytes: usize = assets.iter().map(|a| a.data.len()).sum();
    log::info!(
        "Syncing scene with {} asset{} ({} bytes encoded) to {} node{}",
        assets.len(),
        if assets.len() == 1 { "" } else { "s" },
        total_bytes,
        nodes.len(),
        if nodes.len() == 1 { "" } else { "s" }
    );

    let clients: Vec<RenderClient> = thread::scope(|s| {
        let handles: Vec<_> = nodes
            .iter()
            .enumerate()
            .map(|(id, node)| {
                s.spawn(move || {
                    let mut client = RenderClient::connect(id, node);
                    if client.status == ClientStatus::Connected {
                        if let Err(e) = client.sync(description, assets) {
                            log::warn!("Client {} ({}) failed to sync: {}", client.id, client.address, e);
                            client.drop_connection();
                            client.status = ClientStatus::SyncFailed;
                        }
                    }
                    client
                })
            })
            .collect();
        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    });

    let synced: Vec<RenderClient> = clients
        .into_iter()
        .filter(|c| c.status == ClientStatus::Synced)
        .enumerate()
        .map(|(id, mut c)| {
            c.id = id;
            c
        })
        .collect();
    log::info!("{} of {} nodes ready", synced.len(), nodes.len());
    synced
}

/// Network thread body for one synced client.
///
/// On any failure the client's tiles are released back to the scheduler.
/// When there are no local threads to pick those up, this thread renders
/// the leftovers itself so the frame still completes.
pub(crate) fn run_client(client: &mut RenderClient, ctx: &FrameContext) {
    if client.status != ClientStatus::Synced {
        log::debug!("Client {} wasn't synced fully, skipping", client.id);
        return;
    }
    let Some(conn) = client.connection.as_mut() else {
        client.status = ClientStatus::ConnectionFailed;
        return;
    };

    client.status = ClientStatus::Rendering;
    match serve_client(client.id, conn, ctx) {
        Ok(()) => {
            log::info!("Client {} finished", client.id);
            client.drop_connection();
            client.status = ClientStatus::Finished;
        }
        Err(e) => {
            let released = ctx.tiles.abandon_client(client.id);
            log::warn!(
                "Lost client {} ({}): {}. Releasing {} tile{}",
                client.id,
                client.address,
                e,
                released,
                if released == 1 { "" } else { "s" }
            );
            client.drop_connection();
            client.status = ClientStatus::ConnectionFailed;

            if ctx.local_threads == 0 && !ctx.renderer.is_aborted() {
                log::info!("No local threads, finishing remaining tiles here");
                render_local(&ctx.renderer, ctx.tiles, ctx.buffer, false);
            }
        }
    }
}

/// Answer one client's requests until it says goodbye.
///
/// After an abort the next `getWork` is answered with `renderComplete`.
/// Workers only read between tiles, so a tile already being rendered remotely
/// still runs to the end and its result is accepted.
fn serve_client(id: usize, conn: &mut Connection, ctx: &FrameContext) -> ProtocolResult<()> {
    conn.send_action(Action::StartRender)?;

    loop {
        match conn.receive_action()? {
            Action::Stats { tiles } => ctx.tiles.update_from_stats(id, &tiles),
            Action::GetWork => {
                let next = if ctx.renderer.is_aborted() {
                    None
                } else {
                    ctx.tiles.next_tile_for_client(id)
                };
                let reply = match next {
                    Some(tile) => Action::NewWork { tile },
                    None => Action::RenderComplete,
                };
                conn.send_action(reply)?;
            }
            Action::SubmitWork { result, tile } => {
                if let Err(reason) = ctx.tiles.check_submission(id, &tile) {
                    conn.send_error(reason.clone())?;
                    return Err(ProtocolError::InvalidPayload(reason));
                }
                let texture = decode_texture(&result)?;
                if texture.width != tile.width || texture.height != tile.height {
                    let reason = format!(
                        "result is {}x{}, tile {} is {}x{}",
                        texture.width, texture.height, tile.index, tile.width, tile.height
                    );
                    conn.send_error(reason.clone())?;
                    return Err(ProtocolError::InvalidPayload(reason));
                }
                ctx.buffer.paint_tile(&tile, &texture);
                ctx.tiles.mark_finished(tile.index);
                conn.send_action(Action::Ok)?;
            }
            Action::Goodbye => {
                log::debug!("Client {} said goodbye", id);
                conn.send_action(Action::Goodbye)?;
                return Ok(());
            }
            other => {
                conn.send_error("Unknown command")?;
                return Err(ProtocolError::Unexpected(other.name().to_string()));
            }
        }
    }
}

/// Ask every node to exit. Returns how many were reached.
pub fn shutdown_clients(nodes: &[String]) -> usize {
    log::info!(
        "Sending shutdown command to {} client{}",
        nodes.len(),
        if nodes.len() == 1 { "" } else { "s" }
    );
    let mut reached = 0;
    for (id, node) in nodes.iter().enumerate() {
        let mut client = RenderClient::connect(id, node);
        let Some(conn) = client.connection.as_mut() else {
            continue;
        };
        match conn.send_action(Action::Shutdown) {
            Ok(()) => reached += 1,
            Err(e) => log::warn!("Failed to send shutdown to {}: {}", client.address, e),
        }
        client.drop_connection();
    }
    if reached == 0 {
        log::warn!("No clients reached");
    }
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_texture, WorkerServer};
    use crate::renderer::{AbortHandle, RenderSession};
    use cray_core::{FileCache, Scene, Texture};
    use std::net::TcpListener;
    use std::sync::mpsc;

    const SCENE: &str = r#"{
        "renderer": { "threads": 2, "samples": 3, "bounces": 3, "tileWidth": 8, "tileHeight": 8 },
        "camera": { "position": [0, 0, 5], "lookAt": [0, 0, 0], "width": 24, "height": 16 },
        "materials": [[{ "type": "diffuse", "color": [0.7, 0.4, 0.2] }]],
        "spheres": [{ "center": [0, 0, 0], "radius": 1 }],
        "instances": [{ "sphere": 0, "materials": 0 }]
    }"#;

    fn description() -> SceneDescription {
        SceneDescription::from_json(SCENE).unwrap()
    }

    fn build_scene() -> Scene {
        Scene::from_description(&description(), &mut FileCache::new()).unwrap()
    }

    fn local_render() -> Vec<u8> {
        let mut session = RenderSession::new(build_scene()).unwrap();
        session.render().unwrap().image.into_raw()
    }

    /// Accept one master and answer the sync, then let `then` take over.
    fn fake_worker<F>(accept_handshake: bool, then: F) -> (String, thread::JoinHandle<()>)
    where
        F: FnOnce(&mut Connection) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = Connection::new(stream).unwrap();
            assert!(matches!(conn.receive_action().unwrap(), Action::Handshake { .. }));
            if !accept_handshake {
                conn.send_error("Git hash mismatch").unwrap();
                return;
            }
            conn.send_action(Action::StartSync).unwrap();
            assert!(matches!(conn.receive_action().unwrap(), Action::LoadScene { .. }));
            conn.send_action(Action::Ready { thread_count: 1 }).unwrap();
            then(&mut conn);
        });
        (address, handle)
    }

    #[test]
    fn test_distributed_render_matches_local() {
        let _ = env_logger::builder().is_test(true).try_init();

        let server = WorkerServer::bind("127.0.0.1:0").unwrap().with_thread_limit(2);
        let address = server.local_addr().unwrap().to_string();
        let worker = thread::spawn(move || server.run());

        let nodes = vec![address.clone()];
        let clients = sync_clients(&nodes, &description(), &[]);
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].status, ClientStatus::Synced);
        assert_eq!(clients[0].available_threads, 2);

        let mut session = RenderSession::new(build_scene())
            .unwrap()
            .with_local_threads(0)
            .with_clients(clients);
        let outcome = session.render().unwrap();
        assert!(!outcome.aborted);
        assert_eq!(session.clients()[0].status, ClientStatus::Finished);
        assert_eq!(outcome.image.into_raw(), local_render());

        assert_eq!(shutdown_clients(&nodes), 1);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_lost_worker_tiles_are_reclaimed() {
        let (address, fake) = fake_worker(true, |conn| {
            assert_eq!(conn.receive_action().unwrap(), Action::StartRender);
            conn.send_action(Action::GetWork).unwrap();
            // Usually a tile, unless the local thread already took them all.
            // Either way, vanish without answering.
            let _ = conn.receive_action();
        });

        let clients = sync_clients(&[address], &description(), &[]);
        assert_eq!(clients.len(), 1);

        let mut session = RenderSession::new(build_scene())
            .unwrap()
            .with_local_threads(1)
            .with_clients(clients);
        let outcome = session.render().unwrap();
        fake.join().unwrap();

        assert!(!outcome.aborted);
        assert_eq!(session.clients()[0].status, ClientStatus::ConnectionFailed);
        assert_eq!(outcome.image.into_raw(), local_render());
    }

    #[test]
    fn test_lost_worker_without_local_threads_still_completes() {
        let (address, fake) = fake_worker(true, |conn| {
            assert_eq!(conn.receive_action().unwrap(), Action::StartRender);
            conn.send_action(Action::GetWork).unwrap();
            assert!(matches!(conn.receive_action().unwrap(), Action::NewWork { .. }));
        });

        let clients = sync_clients(&[address], &description(), &[]);
        let mut session = RenderSession::new(build_scene())
            .unwrap()
            .with_local_threads(0)
            .with_clients(clients);
        let outcome = session.render().unwrap();
        fake.join().unwrap();

        assert!(!outcome.aborted);
        assert!(session.tiles().is_complete());
    }

    #[test]
    fn test_mismatched_submission_is_refused() {
        let (address, fake) = fake_worker(true, |conn| {
            assert_eq!(conn.receive_action().unwrap(), Action::StartRender);
            conn.send_action(Action::GetWork).unwrap();
            let Action::NewWork { mut tile } = conn.receive_action().unwrap() else {
                panic!("expected a tile");
            };
            // Claim a region shifted one pixel from the one handed out.
            tile.begin_x += 1;
            tile.width -= 1;
            let result = encode_texture(&Texture::new_float(tile.width, tile.height, 3));
            conn.send_action(Action::SubmitWork { result, tile }).unwrap();
            assert!(matches!(conn.receive_action(), Err(ProtocolError::Remote(_))));
        });

        let clients = sync_clients(&[address], &description(), &[]);
        let mut session = RenderSession::new(build_scene())
            .unwrap()
            .with_local_threads(0)
            .with_clients(clients);
        let outcome = session.render().unwrap();
        fake.join().unwrap();

        assert!(!outcome.aborted);
        assert_eq!(session.clients()[0].status, ClientStatus::ConnectionFailed);
        // The black submission was never painted.
        assert_eq!(outcome.image.into_raw(), local_render());
    }

    #[test]
    fn test_abort_stops_handing_out_tiles() {
        let (handles, abort) = mpsc::channel::<AbortHandle>();
        let (address, fake) = fake_worker(true, move |conn| {
            assert_eq!(conn.receive_action().unwrap(), Action::StartRender);
            conn.send_action(Action::GetWork).unwrap();
            let Action::NewWork { tile } = conn.receive_action().unwrap() else {
                panic!("expected a tile");
            };
            abort.recv().unwrap().abort();

            // The tile in flight is still taken.
            let result = encode_texture(&Texture::new_float(tile.width, tile.height, 3));
            conn.send_action(Action::SubmitWork { result, tile }).unwrap();
            assert_eq!(conn.receive_action().unwrap(), Action::Ok);

            conn.send_action(Action::GetWork).unwrap();
            assert_eq!(conn.receive_action().unwrap(), Action::RenderComplete);
            conn.send_action(Action::Goodbye).unwrap();
            assert_eq!(conn.receive_action().unwrap(), Action::Goodbye);
        });

        let clients = sync_clients(&[address], &description(), &[]);
        let mut session = RenderSession::new(build_scene())
            .unwrap()
            .with_local_threads(0)
            .with_clients(clients);
        handles.send(session.abort_handle()).unwrap();
        let outcome = session.render().unwrap();
        fake.join().unwrap();

        assert!(outcome.aborted);
        assert_eq!(session.clients()[0].status, ClientStatus::Finished);
        assert_eq!(session.tiles().finished_count(), 1);
    }

    #[test]
    fn test_handshake_error_drops_client() {
        let (address, fake) = fake_worker(false, |_| {});
        let clients = sync_clients(&[address], &description(), &[]);
        fake.join().unwrap();
        assert!(clients.is_empty());
    }

    #[test]
    fn test_unreachable_node_is_skipped() {
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let client = RenderClient::connect(0, &address);
        assert_eq!(client.status, ClientStatus::ConnectionFailed);
        assert!(sync_clients(&[address], &description(), &[]).is_empty());
    }

    #[test]
    fn test_worker_rejects_bad_version() {
        let server = WorkerServer::bind("127.0.0.1:0").unwrap();
        let address = server.local_addr().unwrap().to_string();
        let worker = thread::spawn(move || server.run());

        let mut conn = Connection::connect(&address, CONNECT_TIMEOUT).unwrap();
        conn.send_action(Action::Handshake {
            version: "9.9".into(),
            githash: git_hash().into(),
        })
        .unwrap();
        match conn.receive_action() {
            Err(ProtocolError::Remote(message)) => assert_eq!(message, "Protocol version mismatch"),
            other => panic!("expected remote error, got {:?}", other),
        }
        drop(conn);

        assert_eq!(shutdown_clients(&[address]), 1);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_worker_reports_scene_errors() {
        let server = WorkerServer::bind("127.0.0.1:0").unwrap();
        let address = server.local_addr().unwrap().to_string();
        let worker = thread::spawn(move || server.run());

        let mut broken = description();
        broken.geometry.push(cray_core::GeometrySource::File {
            file: "missing.json".into(),
        });
        let mut client = RenderClient::connect(0, &address);
        assert!(matches!(client.sync(&broken, &[]), Err(ProtocolError::Remote(_))));
        client.drop_connection();

        assert_eq!(shutdown_clients(&[address]), 1);
        worker.join().unwrap().unwrap();
    }
}
