//! File-like reads over partially downloaded data
//!
//! A [`PieceProvider`] hides piece arrival order behind a linear byte
//! interface. The torrent-backed reader blocks on exactly the pieces a read
//! covers, so it never hands out bytes that have not landed on disk.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::StreamError;
use super::scheduler::{ActiveFile, StreamScheduler};
use super::window::pieces_for_range;

/// Linear async reads over one file.
#[async_trait::async_trait]
pub trait PieceProvider: Send + Sync {
    /// Reads exactly `length` bytes at `offset`, waiting for data if needed.
    ///
    /// # Errors
    /// - `ReadError::InvalidRange` - Read extends past the end of the file
    /// - `ReadError::Unavailable` - Covering piece timed out or the session ended
    /// - `ReadError::Io` - Underlying file could not be read
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, ReadError>;

    /// Total size of the file in bytes.
    fn size(&self) -> u64;
}

/// Errors from reading a file through a [`PieceProvider`].
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("invalid range: offset {offset} + length {length} exceeds file size {file_size}")]
    InvalidRange {
        offset: u64,
        length: usize,
        file_size: u64,
    },

    #[error("data unavailable: {0}")]
    Unavailable(#[from] StreamError),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

fn check_bounds(offset: u64, length: usize, file_size: u64) -> Result<(), ReadError> {
    match offset.checked_add(length as u64) {
        Some(end) if end <= file_size => Ok(()),
        _ => Err(ReadError::InvalidRange {
            offset,
            length,
            file_size,
        }),
    }
}

async fn read_exact_at(path: &Path, offset: u64, length: usize) -> Result<Bytes, ReadError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; length];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Reads the active file of a streaming session from its save path.
pub struct TorrentFileReader {
    scheduler: Arc<StreamScheduler>,
    path: PathBuf,
    file: ActiveFile,
    piece_timeout: Duration,
}

impl TorrentFileReader {
    pub fn new(
        scheduler: Arc<StreamScheduler>,
        path: PathBuf,
        file: ActiveFile,
        piece_timeout: Duration,
    ) -> Self {
        Self {
            scheduler,
            path,
            file,
            piece_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl PieceProvider for TorrentFileReader {
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, ReadError> {
        check_bounds(offset, length, self.file.span.size)?;
        if length == 0 {
            return Ok(Bytes::new());
        }

        let end = offset + length as u64;
        for piece in pieces_for_range(self.file.span, offset, end, self.scheduler.piece_size()) {
            self.scheduler.ensure_scheduled(piece).await?;
            self.scheduler
                .wait_for_piece(piece, self.piece_timeout)
                .await?;
        }

        read_exact_at(&self.path, offset, length).await
    }

    fn size(&self) -> u64 {
        self.file.span.size
    }
}

/// Reads a file that is already complete on disk.
pub struct LocalFileProvider {
    path: PathBuf,
    size: u64,
}

impl LocalFileProvider {
    /// # Errors
    /// - `std::io::Error` - Path missing or not readable
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }
}

#[async_trait::async_trait]
impl PieceProvider for LocalFileProvider {
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, ReadError> {
        check_bounds(offset, length, self.size)?;
        read_exact_at(&self.path, offset, length).await
    }

    fn size(&self) -> u64 {
        self.size
    }
}
