//! Streaming core: piece scheduling, progress sampling and range serving
//!
//! Everything here sits above a [`TorrentBackend`](crate::torrent::TorrentBackend)
//! and only talks to it through piece-level control. The scheduler decides
//! piece urgency, readers block on the backend's completion signal, and the
//! range server frames the bytes for HTTP.

pub mod progress;
pub mod provider;
pub mod range;
pub mod resolver;
pub mod scheduler;
pub mod server;
pub mod window;

use std::time::Duration;

pub use progress::{DownloadStats, ProgressTracker, format_size, percent};
pub use provider::{LocalFileProvider, PieceProvider, ReadError, TorrentFileReader};
pub use range::{ByteRange, RangeParseError, parse_range_header};
pub use resolver::{FileSelector, SelectionError, resolve};
pub use scheduler::{ActiveFile, StreamScheduler, deadline_schedule};
pub use server::RangeStreamServer;
use thiserror::Error;
pub use window::{StreamWindow, compute_window};

use crate::torrent::{PieceIndex, TorrentError};

/// Failures while scheduling pieces or waiting on them.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("metadata not received within {timeout:?}")]
    MetadataTimeout { timeout: Duration },

    #[error("piece {piece} not received within {timeout:?}")]
    PieceTimeout { piece: PieceIndex, timeout: Duration },

    #[error("wait cancelled")]
    Cancelled,

    #[error("no file selected")]
    NoActiveFile,

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("backend error: {0}")]
    Backend(#[from] TorrentError),
}
