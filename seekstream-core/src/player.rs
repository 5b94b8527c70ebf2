//! External media player processes

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::info;

/// Player launch failures. Fatal to the playback attempt only.
#[derive(Debug, Error)]
pub enum PlayerLaunchError {
    #[error("player binary {program:?} not found, make sure it is installed and in PATH")]
    NotFound { program: String },

    #[error("failed to start player {program:?}: {reason}")]
    Spawn { program: String, reason: String },
}

/// Something that can play a file path.
pub trait Player: Send + Sync {
    /// Starts playback of `path`.
    ///
    /// # Errors
    /// - `PlayerLaunchError::NotFound` - Binary missing
    /// - `PlayerLaunchError::Spawn` - Binary present but could not start
    fn launch(&self, path: &Path) -> Result<PlayerProcess, PlayerLaunchError>;
}

/// Handle to a running player.
pub struct PlayerProcess {
    child: Child,
}

impl PlayerProcess {
    /// Resolves when the player exits.
    ///
    /// # Errors
    /// - `std::io::Error` - Exit status could not be collected
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stops the player if still running.
    ///
    /// # Errors
    /// - `std::io::Error` - Kill signal could not be delivered
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

/// Plays files with VLC, exiting when playback ends.
#[derive(Debug, Clone)]
pub struct VlcPlayer {
    program: String,
    args: Vec<String>,
}

impl Default for VlcPlayer {
    fn default() -> Self {
        Self {
            program: "vlc".to_string(),
            args: vec!["--play-and-exit".to_string()],
        }
    }
}

impl VlcPlayer {
    /// Uses a different binary and leading arguments, e.g. `cvlc` or `mpv`.
    pub fn with_program(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Player for VlcPlayer {
    fn launch(&self, path: &Path) -> Result<PlayerProcess, PlayerLaunchError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PlayerLaunchError::NotFound {
                    program: self.program.clone(),
                },
                _ => PlayerLaunchError::Spawn {
                    program: self.program.clone(),
                    reason: e.to_string(),
                },
            })?;

        info!(program = %self.program, path = %path.display(), "Player started");
        Ok(PlayerProcess { child })
    }
}
