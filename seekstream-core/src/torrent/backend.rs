//! Torrent backend capability interface
//!
//! Any download engine that exposes piece-level control can sit behind this
//! trait. The streaming core never assumes anything about the protocol
//! implementation underneath.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{FileSpan, MagnetLink, PieceIndex, TorrentError, TorrentMetadata};

/// Piece-level control over one torrent, owned by a single streaming session.
///
/// Mutating calls are cheap and non-blocking. Callers that need consistent
/// multi-piece updates serialize them on their side; the scheduler does so
/// through its own critical section.
#[async_trait]
pub trait TorrentBackend: Send + Sync {
    /// Registers the torrent, loading any resume state keyed by its info hash.
    ///
    /// # Errors
    /// - `TorrentError::Io` - Resume directory could not be prepared
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<(), TorrentError>;

    /// Resolves once metadata has arrived from the swarm.
    ///
    /// Callers bound this with their own timeout.
    ///
    /// # Errors
    /// - `TorrentError::MagnetNotAdded` - No magnet registered yet
    async fn fetch_metadata(&self) -> Result<TorrentMetadata, TorrentError>;

    /// Gives `index` priority 1 and every other file priority 0.
    ///
    /// # Errors
    /// - `TorrentError::MetadataUnavailable` - Metadata not fetched yet
    /// - `TorrentError::InvalidFileIndex` - Index outside the file list
    fn select_file(&self, index: usize) -> Result<FileSpan, TorrentError>;

    /// Whether a piece is fully downloaded and verified.
    fn have(&self, piece: PieceIndex) -> bool;

    /// Sets a relative urgency hint; lower deadlines are fetched sooner.
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Piece outside the torrent
    fn set_piece_deadline(&self, piece: PieceIndex, deadline_ms: u32) -> Result<(), TorrentError>;

    /// Drops any deadline on a piece, returning it to file-priority ordering.
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Piece outside the torrent
    fn reset_piece_deadline(&self, piece: PieceIndex) -> Result<(), TorrentError>;

    /// Bytes of the given file that are on disk and verified.
    fn file_progress(&self, index: usize) -> u64;

    /// Current download rate in bytes per second.
    fn download_rate(&self) -> u64;

    /// Generation counter bumped every time a piece completes.
    ///
    /// Waiters re-check `have` after each change instead of polling.
    fn subscribe_pieces(&self) -> watch::Receiver<u64>;

    /// Persists resume state keyed by info hash and releases the torrent.
    ///
    /// # Errors
    /// - `TorrentError::ResumeState` - Resume state could not be written
    async fn close(&self) -> Result<(), TorrentError>;
}

/// Creates a fresh backend handle for each streaming session.
pub trait BackendProvider: Send + Sync {
    /// Returns a backend that stores downloaded data under `save_path`.
    fn create(&self, save_path: &Path) -> Arc<dyn TorrentBackend>;
}
