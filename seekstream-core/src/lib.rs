//! Seekstream Core - watch torrent media while it downloads
//!
//! Schedules piece downloads so a chosen file's header arrives first and the
//! rest follows in playback order, tracks download progress, and serves
//! byte ranges of the partially downloaded file without ever handing out
//! bytes that have not arrived.

pub mod config;
pub mod player;
pub mod session;
pub mod streaming;
pub mod torrent;
pub mod tracing_setup;
pub mod ui;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

// Re-export main types for convenient access
pub use config::SeekstreamConfig;
pub use player::{Player, PlayerLaunchError, VlcPlayer};
pub use session::{SessionController, SessionError, SessionPhase, SessionRequest, StreamSession};
pub use streaming::{
    DownloadStats, FileSelector, RangeParseError, RangeStreamServer, ReadError, SelectionError,
    StreamError, StreamScheduler,
};
pub use torrent::{BackendProvider, MagnetLink, TorrentBackend, TorrentError};
pub use ui::{LogUi, StreamUi};

/// Errors that can bubble up from any Seekstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SeekstreamError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("File selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Player error: {0}")]
    Player(#[from] PlayerLaunchError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeekstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SeekstreamError::Torrent(TorrentError::InvalidMagnet { reason }) => {
                format!("Invalid magnet link: {reason}")
            }
            SeekstreamError::Torrent(_) => "Download error occurred".to_string(),
            SeekstreamError::Selection(e) => e.to_string(),
            SeekstreamError::Streaming(e) => Self::stream_message(e),
            SeekstreamError::Session(e) => match e {
                SessionError::Selection(e) => e.to_string(),
                SessionError::Stream(e) => Self::stream_message(e),
                SessionError::Player(e) => e.to_string(),
                SessionError::Torrent(TorrentError::InvalidMagnet { reason }) => {
                    format!("Invalid magnet link: {reason}")
                }
                _ => "Streaming session failed".to_string(),
            },
            SeekstreamError::Player(e) => e.to_string(),
            SeekstreamError::Configuration { reason } => format!("Configuration error: {reason}"),
            SeekstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SeekstreamError::Selection(_)
                | SeekstreamError::Configuration { .. }
                | SeekstreamError::Torrent(TorrentError::InvalidMagnet { .. })
                | SeekstreamError::Session(SessionError::Selection(_))
                | SeekstreamError::Session(SessionError::Stream(StreamError::Selection(_)))
                | SeekstreamError::Session(SessionError::Torrent(TorrentError::InvalidMagnet { .. }))
        )
    }

    fn stream_message(error: &StreamError) -> String {
        match error {
            StreamError::MetadataTimeout { .. } => {
                "Timed out waiting for torrent metadata, the swarm may have no peers".to_string()
            }
            StreamError::PieceTimeout { .. } => {
                "Timed out waiting for data, download is too slow to stream".to_string()
            }
            StreamError::Cancelled => "Streaming cancelled".to_string(),
            StreamError::Selection(e) => e.to_string(),
            _ => "Streaming error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SeekstreamError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_user_errors() {
        let invalid = SeekstreamError::from(TorrentError::InvalidMagnet {
            reason: "missing btih".to_string(),
        });
        assert!(invalid.is_user_error());
        assert_eq!(invalid.user_message(), "Invalid magnet link: missing btih");

        let not_found = SeekstreamError::Session(SessionError::Selection(
            SelectionError::NotFound {
                fragment: "mkv".to_string(),
            },
        ));
        assert!(not_found.is_user_error());
        assert!(not_found.user_message().contains("mkv"));
    }

    #[test]
    fn test_timeouts_are_not_user_errors() {
        let timeout = SeekstreamError::from(StreamError::MetadataTimeout {
            timeout: Duration::from_secs(1),
        });
        assert!(!timeout.is_user_error());
        assert!(timeout.user_message().contains("metadata"));
    }
}
