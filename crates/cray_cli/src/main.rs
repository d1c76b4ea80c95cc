//! `cray` - render a scene, or serve as a network render worker.
//!
//! ```text
//! cray <scene.json> [--threads N] [--nodes host[:port],...] [--output out.png]
//! cray --worker [port] [--threads N]
//! cray --shutdown --nodes host[:port],...
//! ```
//!
//! Set `RUST_LOG=debug` for per-message protocol traffic.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cray_core::{FileCache, Scene, SceneDescription};
use cray_renderer::protocol::{self, WorkerServer};
use cray_renderer::RenderSession;

#[derive(Debug, PartialEq)]
enum Command {
    Render {
        scene: PathBuf,
        threads: Option<usize>,
        nodes: Option<String>,
        output: Option<PathBuf>,
    },
    Worker {
        port: u16,
        threads: Option<usize>,
    },
    Shutdown {
        nodes: String,
    },
}

const USAGE: &str = "usage:
  cray <scene.json> [--threads N] [--nodes host[:port],...] [--output out.png]
  cray --worker [port] [--threads N]
  cray --shutdown --nodes host[:port],...";

fn parse_args(args: &[String]) -> Result<Command> {
    let mut scene = None;
    let mut threads = None;
    let mut nodes = None;
    let mut output = None;
    let mut worker = false;
    let mut port = None;
    let mut shutdown = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--worker" => worker = true,
            "--shutdown" => shutdown = true,
            "--threads" => {
                let value = iter.next().context("--threads needs a value")?;
                threads = Some(value.parse().with_context(|| format!("invalid thread count '{}'", value))?);
            }
            "--nodes" => nodes = Some(iter.next().context("--nodes needs a value")?.clone()),
            "--output" => output = Some(PathBuf::from(iter.next().context("--output needs a value")?)),
            "-h" | "--help" => bail!("{}", USAGE),
            other if other.starts_with("--") => bail!("unknown option '{}'\n{}", other, USAGE),
            other if worker && port.is_none() => {
                port = Some(other.parse().with_context(|| format!("invalid port '{}'", other))?);
            }
            other if scene.is_none() => scene = Some(PathBuf::from(other)),
            other => bail!("unexpected argument '{}'\n{}", other, USAGE),
        }
    }

    if shutdown {
        let nodes = nodes.context("--shutdown needs --nodes")?;
        return Ok(Command::Shutdown { nodes });
    }
    if worker {
        return Ok(Command::Worker {
            port: port.unwrap_or(protocol::DEFAULT_PORT),
            threads,
        });
    }
    match scene {
        Some(scene) => Ok(Command::Render {
            scene,
            threads,
            nodes,
            output,
        }),
        None => bail!("{}", USAGE),
    }
}

fn render(scene_path: &Path, threads: Option<usize>, nodes: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let mut description = SceneDescription::from_file(scene_path)
        .with_context(|| format!("Failed to read scene {}", scene_path.display()))?;
    if nodes.is_some() {
        description.renderer.nodes = nodes;
    }

    let base_dir = scene_path.parent().unwrap_or_else(|| Path::new("."));
    let mut cache = FileCache::with_base_dir(base_dir);
    let scene = Scene::from_description(&description, &mut cache).context("Failed to build scene")?;

    let node_list = description.renderer.node_list();
    let clients = protocol::sync_clients(&node_list, &description, &cache.encode());
    if !node_list.is_empty() && clients.is_empty() {
        log::warn!("No workers reachable, rendering locally");
    }

    let mut session = RenderSession::new(scene)?.with_clients(clients);
    if let Some(threads) = threads {
        session = session.with_local_threads(threads);
    }
    let save_on_abort = session.prefs().save_on_abort;
    let output = output.unwrap_or_else(|| PathBuf::from(&session.prefs().output_path));

    let outcome = session.render().context("Render failed")?;
    let meta = &outcome.metadata;
    log::info!(
        "{}x{}, {} samples, {} bounces in {:.2?}",
        meta.width,
        meta.height,
        meta.samples,
        meta.bounces,
        meta.elapsed
    );

    if !outcome.should_save(save_on_abort) {
        log::warn!("Render aborted, not saving");
        return Ok(());
    }
    outcome
        .image
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Wrote {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        Command::Render {
            scene,
            threads,
            nodes,
            output,
        } => render(&scene, threads, nodes, output),
        Command::Worker { port, threads } => {
            log::info!("Starting worker on port {}", port);
            let mut server = WorkerServer::bind(("0.0.0.0", port))?;
            if let Some(threads) = threads {
                server = server.with_thread_limit(threads);
            }
            server.run()?;
            Ok(())
        }
        Command::Shutdown { nodes } => {
            let list: Vec<String> = nodes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            protocol::shutdown_clients(&list);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_args() {
        let cmd = parse_args(&args(&["scenes/box.json", "--threads", "4", "--output", "box.png"])).unwrap();
        assert_eq!(
            cmd,
            Command::Render {
                scene: PathBuf::from("scenes/box.json"),
                threads: Some(4),
                nodes: None,
                output: Some(PathBuf::from("box.png")),
            }
        );
    }

    #[test]
    fn test_worker_args() {
        assert_eq!(
            parse_args(&args(&["--worker"])).unwrap(),
            Command::Worker { port: 2222, threads: None }
        );
        assert_eq!(
            parse_args(&args(&["--worker", "4000", "--threads", "2"])).unwrap(),
            Command::Worker {
                port: 4000,
                threads: Some(2)
            }
        );
    }

    #[test]
    fn test_shutdown_args() {
        assert_eq!(
            parse_args(&args(&["--shutdown", "--nodes", "a:1,b"])).unwrap(),
            Command::Shutdown { nodes: "a:1,b".into() }
        );
        assert!(parse_args(&args(&["--shutdown"])).is_err());
    }

    #[test]
    fn test_bad_args() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
        assert!(parse_args(&args(&["a.json", "b.json"])).is_err());
        assert!(parse_args(&args(&["--threads", "many", "a.json"])).is_err());
    }
}
