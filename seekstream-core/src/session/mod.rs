//! Streaming session lifecycle
//!
//! A session walks `Idle → MetadataFetching → FileSelected → HeaderBuffering
//! → Streaming` and ends in `Completed` or `Aborted`. The controller drives
//! the transitions; every terminal transition closes the session's backend
//! so resume state is flushed.

pub mod controller;
pub mod stream;

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

pub use controller::{SessionController, SessionRequest};
pub use stream::StreamSession;

use crate::player::PlayerLaunchError;
use crate::streaming::{SelectionError, StreamError};
use crate::torrent::TorrentError;

/// Where a streaming session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    MetadataFetching,
    FileSelected,
    HeaderBuffering,
    Streaming,
    Completed,
    Aborted,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Aborted)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Any live phase may abort; terminal phases never move again.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;

        match (self, next) {
            (Completed | Aborted, _) => false,
            (_, Aborted) => true,
            (Idle, MetadataFetching)
            | (MetadataFetching, FileSelected)
            | (FileSelected, HeaderBuffering)
            | (HeaderBuffering, Streaming)
            | (Streaming, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::MetadataFetching => "metadata_fetching",
            SessionPhase::FileSelected => "file_selected",
            SessionPhase::HeaderBuffering => "header_buffering",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Completed => "completed",
            SessionPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Failures that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Torrent(#[from] TorrentError),

    #[error(transparent)]
    Player(#[from] PlayerLaunchError),
}

impl SessionError {
    /// Unwraps selector errors nested inside scheduler errors.
    pub fn selection(&self) -> Option<&SelectionError> {
        match self {
            SessionError::Selection(e) | SessionError::Stream(StreamError::Selection(e)) => {
                Some(e)
            }
            _ => None,
        }
    }
}

/// Moves `phase` to `next` if the lifecycle allows it.
pub(crate) fn advance(
    phase: &watch::Sender<SessionPhase>,
    next: SessionPhase,
) -> Result<(), SessionError> {
    let mut outcome = Ok(());
    phase.send_if_modified(|current| {
        if current.can_transition_to(next) {
            *current = next;
            true
        } else {
            outcome = Err(SessionError::InvalidTransition {
                from: *current,
                to: next,
            });
            false
        }
    });
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use SessionPhase::*;

        let path = [Idle, MetadataFetching, FileSelected, HeaderBuffering, Streaming, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_abort_and_terminal_rules() {
        use SessionPhase::*;

        for phase in [Idle, MetadataFetching, FileSelected, HeaderBuffering, Streaming] {
            assert!(phase.can_transition_to(Aborted));
            assert!(!phase.is_terminal());
        }
        assert!(!Completed.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(Completed));
        assert!(!Idle.can_transition_to(Streaming));
        assert!(!HeaderBuffering.can_transition_to(Completed));
    }

    #[test]
    fn test_advance_rejects_skipped_phase() {
        let (phase, rx) = watch::channel(SessionPhase::Idle);
        advance(&phase, SessionPhase::MetadataFetching).unwrap();
        assert!(matches!(
            advance(&phase, SessionPhase::Streaming),
            Err(SessionError::InvalidTransition {
                from: SessionPhase::MetadataFetching,
                to: SessionPhase::Streaming,
            })
        ));
        assert_eq!(*rx.borrow(), SessionPhase::MetadataFetching);
    }

    #[test]
    fn test_advance_from_terminal_phase_reports_error() {
        let (phase, rx) = watch::channel(SessionPhase::Aborted);
        assert!(matches!(
            advance(&phase, SessionPhase::Aborted),
            Err(SessionError::InvalidTransition {
                from: SessionPhase::Aborted,
                to: SessionPhase::Aborted,
            })
        ));
        assert_eq!(*rx.borrow(), SessionPhase::Aborted);
    }
}
