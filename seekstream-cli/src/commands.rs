//! CLI command implementation

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use seekstream_core::config::SeekstreamConfig;
use seekstream_core::player::{Player, VlcPlayer};
use seekstream_core::session::{SessionController, SessionRequest};
use seekstream_core::streaming::FileSelector;
use seekstream_core::torrent::{
    BackendProvider, MagnetLink, SimulatedBackendProvider, SimulatedTorrent,
};
use seekstream_core::SeekstreamError;
use seekstream_web::{AppState, run_server};
use tracing::{info, warn};

use crate::console::ConsoleUi;

/// Piece size of torrents built from `--simulate-dir`.
const SIMULATED_PIECE_SIZE: u64 = 256 * 1024;

/// Stream one file out of a torrent
#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Magnet link of the torrent
    pub magnet: String,

    /// Directory to download into
    #[arg(short = 'o', long, default_value = ".")]
    pub save_path: PathBuf,

    /// File to stream: index or name fragment. Prompts when omitted
    #[arg(long)]
    pub file: Option<String>,

    /// Also serve the file over HTTP range requests
    #[arg(long)]
    pub serve: bool,

    /// Port for --serve
    #[arg(long)]
    pub port: Option<u16>,

    /// Download without launching a player
    #[arg(long)]
    pub no_player: bool,

    /// Seed a simulated swarm from the files below this directory
    #[arg(long)]
    pub simulate_dir: Option<PathBuf>,
}

/// Opens a session for `args` and runs it until playback or download ends.
///
/// # Errors
/// - `SeekstreamError::Torrent` - Invalid magnet or backend failure
/// - `SeekstreamError::Selection` - Unusable `--file` value
/// - `SeekstreamError::Session` - Session failed or was interrupted
pub async fn stream(args: StreamArgs) -> anyhow::Result<()> {
    let mut config = SeekstreamConfig::from_env();
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let magnet = MagnetLink::parse(&args.magnet).map_err(SeekstreamError::from)?;
    let selector = args
        .file
        .as_deref()
        .map(str::parse::<FileSelector>)
        .transpose()
        .map_err(SeekstreamError::from)?;

    let Some(simulate_dir) = args.simulate_dir.as_deref() else {
        bail!("no torrent backend is bundled; pass --simulate-dir to stream from a simulated swarm");
    };
    let torrent = SimulatedTorrent::from_directory(simulate_dir, SIMULATED_PIECE_SIZE)
        .await
        .with_context(|| format!("cannot seed simulation from {}", simulate_dir.display()))?;
    let provider: Arc<dyn BackendProvider> =
        Arc::new(SimulatedBackendProvider::new(torrent, config.clone()));

    let controller = SessionController::new(config.clone(), Arc::new(ConsoleUi));
    let shutdown = controller.shutdown_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            shutdown.cancel();
        }
    });

    let request = SessionRequest {
        magnet,
        selector,
        save_path: args.save_path.clone(),
    };
    let backend = provider.create(&args.save_path);
    let vlc = VlcPlayer::default();
    let player: Option<&dyn Player> = if args.no_player { None } else { Some(&vlc) };

    if !args.serve {
        controller
            .run(backend, &request, player)
            .await
            .map_err(SeekstreamError::from)?;
        return Ok(());
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| SeekstreamError::Configuration {
            reason: format!("invalid listen address: {e}"),
        })?;
    let state = AppState::new(config, provider);
    let session = Arc::new(
        controller
            .open(backend, &request)
            .await
            .map_err(SeekstreamError::from)?,
    );
    state.register(Arc::clone(&session)).await;

    let shutdown = controller.shutdown_token().clone();
    let server = tokio::spawn(run_server(state.clone(), addr, async move {
        shutdown.cancelled().await;
    }));
    println!(
        "Serving http://{addr}/stream_file?file_path={}",
        session.file_path().display()
    );

    let outcome = controller.drive(&session, player).await;
    state.retire(session.file_path()).await;
    match &outcome {
        Ok(()) if session.is_fully_downloaded() => {
            println!("Download complete; still serving until Ctrl-C");
        }
        Ok(()) => {
            println!("Player exited before the download finished; stopping the server");
            controller.shutdown_token().cancel();
        }
        Err(e) => {
            warn!(error = %e, "Session ended early");
            controller.shutdown_token().cancel();
        }
    }

    server.await.context("server task failed")??;
    outcome.map_err(SeekstreamError::from)?;
    Ok(())
}
