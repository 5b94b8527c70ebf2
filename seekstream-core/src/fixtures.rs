//! Shared test fixtures for the workspace crates

use std::sync::Arc;

use tempfile::TempDir;

use crate::config::SeekstreamConfig;
use crate::torrent::{MagnetLink, SimulatedBackend, SimulatedBackendProvider, SimulatedTorrent};

/// Magnet whose info hash keys the demo torrent's resume state.
pub const DEMO_MAGNET: &str =
    "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=Demo";

/// Piece size of [`demo_torrent`].
pub const DEMO_PIECE_SIZE: u64 = 100;

/// Three-file synthetic torrent with 100-byte pieces.
///
/// | index | path                | offset | size | pieces |
/// |-------|---------------------|--------|------|--------|
/// | 0     | Demo/readme.txt     | 0      | 50   | 0      |
/// | 1     | Demo/movie.mkv      | 50     | 1000 | 0..=10 |
/// | 2     | Demo/movie.en.srt   | 1050   | 120  | 10..=11|
pub fn demo_torrent() -> SimulatedTorrent {
    SimulatedTorrent::synthetic(
        "Demo",
        DEMO_PIECE_SIZE,
        &[
            ("Demo/readme.txt", 50),
            ("Demo/movie.mkv", 1000),
            ("Demo/movie.en.srt", 120),
        ],
    )
}

pub fn demo_magnet() -> MagnetLink {
    MagnetLink::parse(DEMO_MAGNET).expect("demo magnet is well formed")
}

/// Temporary save directory plus a backend downloading into it.
pub struct DemoSwarm {
    pub dir: TempDir,
    pub config: SeekstreamConfig,
    pub backend: Arc<SimulatedBackend>,
}

impl DemoSwarm {
    /// Swarm over [`demo_torrent`] with `config`.
    pub fn with_config(config: SeekstreamConfig) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let backend = Arc::new(SimulatedBackend::new(demo_torrent(), dir.path(), &config));
        Ok(Self {
            dir,
            config,
            backend,
        })
    }

    /// Deterministic swarm: pieces arrive only when a test completes them.
    pub fn deterministic() -> std::io::Result<Self> {
        Self::with_config(SeekstreamConfig::for_testing())
    }

    pub fn provider(&self) -> SimulatedBackendProvider {
        SimulatedBackendProvider::new(demo_torrent(), self.config.clone())
    }
}
