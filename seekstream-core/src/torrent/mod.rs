//! Torrent backend boundary: the capability set the streaming core consumes
//!
//! The peer-wire download machinery lives behind [`TorrentBackend`]. This
//! module owns the identifiers and metadata shared across that boundary,
//! magnet parsing, resume state, and the in-process simulated backend.

pub mod backend;
pub mod magnet;
pub mod resume;
pub mod simulated;
pub mod types;

use std::fmt;

pub use backend::{BackendProvider, TorrentBackend};
pub use magnet::MagnetLink;
pub use resume::ResumeState;
pub use simulated::{SimulatedBackend, SimulatedBackendProvider, SimulatedTorrent};
pub use types::{FileSpan, TorrentFile, TorrentMetadata};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary. Used as the resume-state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40 character hex string.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMagnet` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, TorrentError> {
        let mut hash = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut hash).map_err(|e| TorrentError::InvalidMagnet {
            reason: format!("info hash {hex_str:?}: {e}"),
        })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Zero-based index of a piece within a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by a torrent backend.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("No magnet has been added to this backend")]
    MagnetNotAdded,

    #[error("Torrent metadata is not available yet")]
    MetadataUnavailable,

    #[error("File index {index} out of range ({file_count} files)")]
    InvalidFileIndex { index: usize, file_count: usize },

    #[error("Piece {index} out of range ({piece_count} pieces)")]
    InvalidPieceIndex { index: PieceIndex, piece_count: u32 },

    #[error("Resume state error: {reason}")]
    ResumeState { reason: String },

    #[error("Backend has been closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
