//! In-process simulated swarm
//!
//! Serves a torrent whose content comes from local files (or a synthetic
//! byte pattern) and "downloads" it into the save path piece by piece,
//! honoring file priorities and piece deadlines the way a real engine
//! would. Used by tests and by the CLI's simulation mode.

use std::collections::{HashMap, VecDeque};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{BackendProvider, TorrentBackend};
use super::resume::ResumeState;
use super::{
    FileSpan, InfoHash, MagnetLink, PieceIndex, TorrentError, TorrentFile, TorrentMetadata,
};
use crate::config::{SeekstreamConfig, SimulationConfig};

/// Window over which the reported download rate is averaged.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Byte found at `offset` of a synthetic torrent.
pub fn synthetic_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

#[derive(Debug, Clone)]
enum ContentSource {
    Synthetic,
    Directory(PathBuf),
}

/// Torrent layout plus where the simulated seeders read its bytes from.
#[derive(Debug, Clone)]
pub struct SimulatedTorrent {
    pub metadata: TorrentMetadata,
    source: ContentSource,
}

impl SimulatedTorrent {
    /// Builds a torrent whose bytes follow [`synthetic_byte`].
    pub fn synthetic(name: &str, piece_size: u64, files: &[(&str, u64)]) -> Self {
        let files = files
            .iter()
            .enumerate()
            .map(|(index, (path, size))| TorrentFile {
                index,
                path: path.to_string(),
                size: *size,
            })
            .collect();

        Self {
            metadata: TorrentMetadata {
                name: name.to_string(),
                piece_size,
                files,
            },
            source: ContentSource::Synthetic,
        }
    }

    /// Builds a torrent from every regular file below `dir`, in path order.
    ///
    /// # Errors
    /// - `TorrentError::Io` - Directory cannot be walked
    /// - `TorrentError::InvalidMagnet` - Zero piece size
    pub async fn from_directory(dir: &Path, piece_size: u64) -> Result<Self, TorrentError> {
        if piece_size == 0 {
            return Err(TorrentError::InvalidMagnet {
                reason: "piece size must be positive".to_string(),
            });
        }

        let mut found = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    let size = entry.metadata().await?.len();
                    found.push((entry.path(), size));
                }
            }
        }

        let mut relative: Vec<(String, u64)> = found
            .into_iter()
            .filter_map(|(path, size)| {
                let rel = path.strip_prefix(dir).ok()?;
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some((parts.join("/"), size))
            })
            .collect();
        relative.sort();

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "torrent".to_string());

        let files = relative
            .into_iter()
            .enumerate()
            .map(|(index, (path, size))| TorrentFile { index, path, size })
            .collect();

        Ok(Self {
            metadata: TorrentMetadata {
                name,
                piece_size,
                files,
            },
            source: ContentSource::Directory(dir.to_path_buf()),
        })
    }

    async fn read_source(
        &self,
        file: &TorrentFile,
        local_offset: u64,
        length: usize,
        global_offset: u64,
    ) -> Result<Vec<u8>, TorrentError> {
        match &self.source {
            ContentSource::Synthetic => Ok((0..length as u64)
                .map(|i| synthetic_byte(global_offset + i))
                .collect()),
            ContentSource::Directory(root) => {
                let mut handle = tokio::fs::File::open(root.join(&file.path)).await?;
                handle.seek(SeekFrom::Start(local_offset)).await?;
                let mut buf = vec![0u8; length];
                handle.read_exact(&mut buf).await?;
                Ok(buf)
            }
        }
    }
}

/// Mutable swarm state guarded by a single lock.
struct SwarmState {
    info_hash: Option<InfoHash>,
    metadata_available: bool,
    have: Vec<bool>,
    deadlines: HashMap<u32, u32>,
    file_priorities: Vec<u8>,
    recent: VecDeque<(Instant, u64)>,
    closed: bool,
}

struct Inner {
    torrent: SimulatedTorrent,
    save_path: PathBuf,
    resume_dir: PathBuf,
    config: SimulationConfig,
    state: Mutex<SwarmState>,
    pieces_tx: watch::Sender<u64>,
    metadata_tx: watch::Sender<bool>,
    shutdown: CancellationToken,
}

/// Simulated backend for one session.
pub struct SimulatedBackend {
    inner: Arc<Inner>,
}

impl SimulatedBackend {
    /// Creates a backend that downloads `torrent` into `save_path`.
    pub fn new(torrent: SimulatedTorrent, save_path: &Path, config: &SeekstreamConfig) -> Self {
        let piece_count = torrent.metadata.piece_count() as usize;
        let file_count = torrent.metadata.files.len();
        let (pieces_tx, _) = watch::channel(0);
        let (metadata_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                save_path: save_path.to_path_buf(),
                resume_dir: save_path.join(config.streaming.resume_dir_name),
                config: config.simulation.clone(),
                state: Mutex::new(SwarmState {
                    info_hash: None,
                    metadata_available: false,
                    have: vec![false; piece_count],
                    deadlines: HashMap::new(),
                    file_priorities: vec![1; file_count],
                    recent: VecDeque::new(),
                    closed: false,
                }),
                torrent,
                pieces_tx,
                metadata_tx,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Downloads a single piece immediately, regardless of priorities.
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Piece outside the torrent
    /// - `TorrentError::Io` - Piece data could not be written
    pub async fn complete_piece(&self, piece: PieceIndex) -> Result<(), TorrentError> {
        self.inner.complete_piece(piece).await
    }

    /// Downloads every piece in the inclusive range.
    ///
    /// # Errors
    /// See [`SimulatedBackend::complete_piece`].
    pub async fn complete_pieces(&self, first: u32, last: u32) -> Result<(), TorrentError> {
        for piece in first..=last {
            self.inner.complete_piece(PieceIndex(piece)).await?;
        }
        Ok(())
    }

    /// Deadline currently attached to a piece, if any.
    pub fn piece_deadline(&self, piece: PieceIndex) -> Option<u32> {
        self.inner.state.lock().deadlines.get(&piece.0).copied()
    }

    /// Current per-file priorities.
    pub fn file_priorities(&self) -> Vec<u8> {
        self.inner.state.lock().file_priorities.clone()
    }

    /// Pieces the swarm would hand out next, most urgent first.
    pub fn next_pieces(&self, count: usize) -> Vec<PieceIndex> {
        self.inner.next_pieces(count)
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    fn spawn_swarm(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if !inner.config.metadata_delay.is_zero() {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(inner.config.metadata_delay) => {}
                }
                inner.publish_metadata();
            }

            if !inner.config.auto_download {
                return;
            }

            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(inner.config.piece_interval) => {}
                }

                for piece in inner.next_pieces(inner.config.pieces_per_tick) {
                    if let Err(e) = inner.complete_piece(piece).await {
                        warn!(piece = %piece, error = %e, "Simulated piece download failed");
                    }
                }
            }
            debug!("Simulated swarm stopped");
        });
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    fn metadata(&self) -> &TorrentMetadata {
        &self.torrent.metadata
    }

    fn publish_metadata(&self) {
        self.state.lock().metadata_available = true;
        self.metadata_tx.send_replace(true);
        debug!(name = %self.metadata().name, "Simulated metadata available");
    }

    fn piece_bounds(&self, piece: u32) -> (u64, u64) {
        let meta = self.metadata();
        let start = piece as u64 * meta.piece_size;
        let end = (start + meta.piece_size).min(meta.total_size());
        (start, end)
    }

    fn file_bounds(&self) -> Vec<(u64, u64)> {
        let mut offset = 0;
        self.metadata()
            .files
            .iter()
            .map(|f| {
                let bounds = (offset, offset + f.size);
                offset += f.size;
                bounds
            })
            .collect()
    }

    fn check_piece(&self, piece: PieceIndex) -> Result<(), TorrentError> {
        let piece_count = self.metadata().piece_count();
        if piece.0 >= piece_count {
            return Err(TorrentError::InvalidPieceIndex {
                index: piece,
                piece_count,
            });
        }
        Ok(())
    }

    fn next_pieces(&self, count: usize) -> Vec<PieceIndex> {
        let state = self.state.lock();
        if !state.metadata_available || state.closed {
            return Vec::new();
        }

        let wanted_files: Vec<(u64, u64)> = self
            .file_bounds()
            .into_iter()
            .zip(&state.file_priorities)
            .filter(|((start, end), priority)| **priority > 0 && end > start)
            .map(|(bounds, _)| bounds)
            .collect();

        let mut candidates: Vec<(Option<u32>, u32)> = (0..state.have.len() as u32)
            .filter(|&p| !state.have[p as usize])
            .filter_map(|p| {
                let deadline = state.deadlines.get(&p).copied();
                let (start, end) = self.piece_bounds(p);
                let wanted = wanted_files.iter().any(|&(fs, fe)| start < fe && fs < end);
                (deadline.is_some() || wanted).then_some((deadline, p))
            })
            .collect();

        // Deadlined pieces first in deadline order, then the rest in index order
        candidates.sort_by_key(|&(deadline, p)| (deadline.is_none(), deadline, p));
        candidates
            .into_iter()
            .take(count)
            .map(|(_, p)| PieceIndex(p))
            .collect()
    }

    async fn complete_piece(&self, piece: PieceIndex) -> Result<(), TorrentError> {
        self.check_piece(piece)?;
        if self.state.lock().have[piece.0 as usize] {
            return Ok(());
        }

        let (piece_start, piece_end) = self.piece_bounds(piece.0);
        for (file, (file_start, file_end)) in self.metadata().files.iter().zip(self.file_bounds()) {
            let start = piece_start.max(file_start);
            let end = piece_end.min(file_end);
            if start >= end {
                continue;
            }

            let local_offset = start - file_start;
            let data = self
                .torrent
                .read_source(file, local_offset, (end - start) as usize, start)
                .await?;
            self.write_segment(file, local_offset, &data).await?;
        }

        let completed = {
            let mut state = self.state.lock();
            state.have[piece.0 as usize] = true;
            state.deadlines.remove(&piece.0);
            let now = Instant::now();
            state.recent.push_back((now, piece_end - piece_start));
            while state
                .recent
                .front()
                .is_some_and(|(at, _)| now.duration_since(*at) > RATE_WINDOW)
            {
                state.recent.pop_front();
            }
            state.have.iter().filter(|&&h| h).count()
        };

        self.pieces_tx.send_modify(|generation| *generation += 1);
        debug!(piece = %piece, completed, "Piece downloaded");
        Ok(())
    }

    async fn write_segment(
        &self,
        file: &TorrentFile,
        local_offset: u64,
        data: &[u8],
    ) -> Result<(), TorrentError> {
        let path = self.save_path.join(&file.path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;
        // Sparse allocation of the full file on first touch
        if handle.metadata().await?.len() < file.size {
            handle.set_len(file.size).await?;
        }
        handle.seek(SeekFrom::Start(local_offset)).await?;
        handle.write_all(data).await?;
        handle.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl TorrentBackend for SimulatedBackend {
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<(), TorrentError> {
        tokio::fs::create_dir_all(&self.inner.resume_dir).await?;

        let resume_path = ResumeState::path_for(&self.inner.resume_dir, magnet.info_hash);
        let resumed = match ResumeState::load(&resume_path).await {
            Ok(Some(resume)) if resume.piece_size == self.inner.metadata().piece_size => {
                resume.completed_pieces
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable resume state, starting fresh");
                Vec::new()
            }
        };

        {
            let mut state = self.inner.state.lock();
            state.info_hash = Some(magnet.info_hash);
            for piece in &resumed {
                if let Some(slot) = state.have.get_mut(*piece as usize) {
                    *slot = true;
                }
            }
        }
        if !resumed.is_empty() {
            info!(pieces = resumed.len(), "Loaded resume state");
            self.inner.pieces_tx.send_modify(|generation| *generation += 1);
        }

        if self.inner.config.metadata_delay.is_zero() {
            self.inner.publish_metadata();
        }
        self.spawn_swarm();
        Ok(())
    }

    async fn fetch_metadata(&self) -> Result<TorrentMetadata, TorrentError> {
        if self.inner.state.lock().info_hash.is_none() {
            return Err(TorrentError::MagnetNotAdded);
        }

        let mut ready = self.inner.metadata_tx.subscribe();
        ready
            .wait_for(|available| *available)
            .await
            .map_err(|_| TorrentError::Closed)?;
        Ok(self.inner.metadata().clone())
    }

    fn select_file(&self, index: usize) -> Result<FileSpan, TorrentError> {
        let meta = self.inner.metadata();
        let mut state = self.inner.state.lock();
        if !state.metadata_available {
            return Err(TorrentError::MetadataUnavailable);
        }

        let file_count = meta.files.len();
        let offset = meta
            .file_offset(index)
            .ok_or(TorrentError::InvalidFileIndex { index, file_count })?;

        state.file_priorities = (0..file_count).map(|i| u8::from(i == index)).collect();
        Ok(FileSpan {
            offset,
            size: meta.files[index].size,
        })
    }

    fn have(&self, piece: PieceIndex) -> bool {
        self.inner
            .state
            .lock()
            .have
            .get(piece.0 as usize)
            .copied()
            .unwrap_or(false)
    }

    fn set_piece_deadline(&self, piece: PieceIndex, deadline_ms: u32) -> Result<(), TorrentError> {
        self.inner.check_piece(piece)?;
        let mut state = self.inner.state.lock();
        if !state.have[piece.0 as usize] {
            state.deadlines.insert(piece.0, deadline_ms);
        }
        Ok(())
    }

    fn reset_piece_deadline(&self, piece: PieceIndex) -> Result<(), TorrentError> {
        self.inner.check_piece(piece)?;
        self.inner.state.lock().deadlines.remove(&piece.0);
        Ok(())
    }

    fn file_progress(&self, index: usize) -> u64 {
        let Some(&(file_start, file_end)) = self.inner.file_bounds().get(index) else {
            return 0;
        };
        let piece_size = self.inner.metadata().piece_size;
        if file_end == file_start {
            return 0;
        }

        let first = (file_start / piece_size) as u32;
        let last = ((file_end - 1) / piece_size) as u32;
        let state = self.inner.state.lock();
        (first..=last)
            .filter(|&p| state.have[p as usize])
            .map(|p| {
                let (start, end) = self.inner.piece_bounds(p);
                end.min(file_end) - start.max(file_start)
            })
            .sum()
    }

    fn download_rate(&self) -> u64 {
        let state = self.inner.state.lock();
        let now = Instant::now();
        state
            .recent
            .iter()
            .filter(|(at, _)| now.duration_since(*at) <= RATE_WINDOW)
            .map(|(_, bytes)| bytes)
            .sum()
    }

    fn subscribe_pieces(&self) -> watch::Receiver<u64> {
        self.inner.pieces_tx.subscribe()
    }

    async fn close(&self) -> Result<(), TorrentError> {
        self.inner.shutdown.cancel();

        let resume = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.info_hash.map(|hash| ResumeState {
                info_hash: hash.to_string(),
                piece_size: self.inner.metadata().piece_size,
                completed_pieces: state
                    .have
                    .iter()
                    .enumerate()
                    .filter(|(_, h)| **h)
                    .map(|(i, _)| i as u32)
                    .collect(),
                saved_at: chrono::Utc::now(),
            })
        };

        if let Some(resume) = resume {
            let hash = InfoHash::from_hex(&resume.info_hash)?;
            let path = ResumeState::path_for(&self.inner.resume_dir, hash);
            resume.save(&path).await?;
            info!(path = %path.display(), pieces = resume.completed_pieces.len(), "Saved resume state");
        }
        Ok(())
    }
}

/// Hands out a fresh [`SimulatedBackend`] per session.
pub struct SimulatedBackendProvider {
    torrent: SimulatedTorrent,
    config: SeekstreamConfig,
}

impl SimulatedBackendProvider {
    pub fn new(torrent: SimulatedTorrent, config: SeekstreamConfig) -> Self {
        Self { torrent, config }
    }
}

impl BackendProvider for SimulatedBackendProvider {
    fn create(&self, save_path: &Path) -> Arc<dyn TorrentBackend> {
        Arc::new(SimulatedBackend::new(
            self.torrent.clone(),
            save_path,
            &self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGNET: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=Demo";

    fn torrent() -> SimulatedTorrent {
        // 100-byte pieces; file 1 spans pieces 0..=10
        SimulatedTorrent::synthetic("Demo", 100, &[("Demo/a.txt", 50), ("Demo/b.mkv", 1000)])
    }

    async fn added(dir: &Path) -> SimulatedBackend {
        let backend = SimulatedBackend::new(torrent(), dir, &SeekstreamConfig::for_testing());
        backend
            .add_magnet(&MagnetLink::parse(MAGNET).unwrap())
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_select_file_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let backend = added(dir.path()).await;
        backend.fetch_metadata().await.unwrap();

        let span = backend.select_file(1).unwrap();
        assert_eq!(span, FileSpan { offset: 50, size: 1000 });
        assert_eq!(backend.file_priorities(), vec![0, 1]);
        assert!(matches!(
            backend.select_file(2),
            Err(TorrentError::InvalidFileIndex { index: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_metadata_requires_magnet() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimulatedBackend::new(torrent(), dir.path(), &SeekstreamConfig::for_testing());
        assert!(matches!(
            backend.fetch_metadata().await,
            Err(TorrentError::MagnetNotAdded)
        ));
    }

    #[tokio::test]
    async fn test_completed_piece_lands_on_disk_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = added(dir.path()).await;
        let mut pieces = backend.subscribe_pieces();

        backend.complete_piece(PieceIndex(0)).await.unwrap();
        assert!(backend.have(PieceIndex(0)));
        assert!(pieces.has_changed().unwrap());

        let a = std::fs::read(dir.path().join("Demo/a.txt")).unwrap();
        assert_eq!(a.len(), 50);
        assert_eq!(a[49], synthetic_byte(49));

        let b = std::fs::read(dir.path().join("Demo/b.mkv")).unwrap();
        assert_eq!(b.len(), 1000);
        assert_eq!(b[0], synthetic_byte(50));
        assert_eq!(b[49], synthetic_byte(99));
        // Not downloaded yet: sparse zeroes
        assert_eq!(b[50], 0);
    }

    #[tokio::test]
    async fn test_file_progress_counts_overlap_only() {
        let dir = tempfile::tempdir().unwrap();
        let backend = added(dir.path()).await;

        backend.complete_piece(PieceIndex(0)).await.unwrap();
        assert_eq!(backend.file_progress(0), 50);
        assert_eq!(backend.file_progress(1), 50);

        backend.complete_piece(PieceIndex(10)).await.unwrap();
        assert_eq!(backend.file_progress(1), 100);
    }

    #[tokio::test]
    async fn test_next_pieces_prefers_deadlines() {
        let dir = tempfile::tempdir().unwrap();
        let backend = added(dir.path()).await;
        backend.select_file(1).unwrap();

        backend.set_piece_deadline(PieceIndex(7), 0).unwrap();
        backend.set_piece_deadline(PieceIndex(3), 1000).unwrap();

        let next = backend.next_pieces(3);
        assert_eq!(next, vec![PieceIndex(7), PieceIndex(3), PieceIndex(0)]);
    }

    #[tokio::test]
    async fn test_close_persists_resume_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = added(dir.path()).await;
            backend.complete_pieces(0, 2).await.unwrap();
            backend.close().await.unwrap();
            assert!(backend.is_closed());
        }

        let backend = added(dir.path()).await;
        assert!(backend.have(PieceIndex(1)));
        assert!(!backend.have(PieceIndex(3)));
    }

    #[tokio::test]
    async fn test_auto_download_fills_selected_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SeekstreamConfig::for_testing();
        config.simulation.auto_download = true;
        config.simulation.pieces_per_tick = 4;

        let backend = SimulatedBackend::new(torrent(), dir.path(), &config);
        backend
            .add_magnet(&MagnetLink::parse(MAGNET).unwrap())
            .await
            .unwrap();
        backend.select_file(1).unwrap();

        let mut pieces = backend.subscribe_pieces();
        tokio::time::timeout(Duration::from_secs(5), async {
            while backend.file_progress(1) < 1000 {
                pieces.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(backend.file_progress(1), 1000);
    }
}
