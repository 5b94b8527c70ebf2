//! Per-torrent resume state persisted between sessions

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InfoHash, TorrentError};

/// Pieces already verified on disk for one torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    pub info_hash: String,
    pub piece_size: u64,
    pub completed_pieces: Vec<u32>,
    pub saved_at: DateTime<Utc>,
}

impl ResumeState {
    /// Location of the resume blob: `<resume_dir>/<info_hash>.fastresume`.
    pub fn path_for(resume_dir: &Path, info_hash: InfoHash) -> PathBuf {
        resume_dir.join(format!("{info_hash}.fastresume"))
    }

    /// Reads resume state, returning `None` when no blob exists.
    ///
    /// # Errors
    /// - `TorrentError::ResumeState` - Blob exists but cannot be decoded
    /// - `TorrentError::Io` - Blob exists but cannot be read
    pub async fn load(path: &Path) -> Result<Option<Self>, TorrentError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| TorrentError::ResumeState {
                reason: format!("{}: {e}", path.display()),
            })
    }

    /// Writes resume state, replacing any previous blob.
    ///
    /// # Errors
    /// - `TorrentError::ResumeState` - State cannot be encoded
    /// - `TorrentError::Io` - Blob cannot be written
    pub async fn save(&self, path: &Path) -> Result<(), TorrentError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let encoded = serde_json::to_vec_pretty(self).map_err(|e| TorrentError::ResumeState {
            reason: e.to_string(),
        })?;
        tokio::fs::write(path, encoded).await?;
        Ok(())
    }
}
