//! Stream Scheduler: piece urgency for playback order
//!
//! Turns a selected file into a deadline schedule the backend understands.
//! The first piece of the window gets deadline 0 and is waited on before
//! playback starts; every later piece gets a strictly larger deadline, so a
//! deadline-aware backend fetches bytes in roughly increasing-offset order.
//!
//! All priority and deadline mutations for the torrent go through one async
//! mutex. Waits never hold it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::window::{StreamWindow, compute_window};
use super::{SelectionError, StreamError};
use crate::config::StreamingConfig;
use crate::torrent::{FileSpan, PieceIndex, TorrentBackend, TorrentError};

/// File currently being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveFile {
    pub index: usize,
    pub span: FileSpan,
    /// `None` for empty files, which need no scheduling.
    pub window: Option<StreamWindow>,
}

#[derive(Debug, Default)]
struct ScheduleState {
    active: Option<ActiveFile>,
    /// First piece of the most recently applied schedule.
    anchor: Option<PieceIndex>,
    /// Bumped on every applied schedule.
    generation: u64,
}

/// Deadlines for every piece after the window's first, in index order.
///
/// Piece at rank `r` (1-based past the first) gets `r * interval_ms`.
/// Saturates at `u32::MAX` for windows beyond ~4 million pieces at the
/// default interval.
pub fn deadline_schedule(window: StreamWindow, interval_ms: u32) -> Vec<(PieceIndex, u32)> {
    window
        .pieces()
        .skip(1)
        .zip(1u32..)
        .map(|(piece, rank)| (piece, rank.saturating_mul(interval_ms)))
        .collect()
}

/// Session-owned piece scheduler for one torrent.
pub struct StreamScheduler {
    backend: Arc<dyn TorrentBackend>,
    piece_size: u64,
    deadline_interval_ms: u32,
    seek_readahead_pieces: u32,
    header_timeout: Duration,
    state: Mutex<ScheduleState>,
    cancel: CancellationToken,
}

impl StreamScheduler {
    /// Creates a scheduler over `backend`. Cancelling `cancel` unblocks all
    /// in-flight waits with [`StreamError::Cancelled`].
    pub fn new(
        backend: Arc<dyn TorrentBackend>,
        piece_size: u64,
        config: &StreamingConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            piece_size,
            deadline_interval_ms: config.deadline_interval_ms,
            seek_readahead_pieces: config.seek_readahead_pieces,
            header_timeout: config.header_timeout,
            state: Mutex::new(ScheduleState::default()),
            cancel,
        }
    }

    pub fn backend(&self) -> &Arc<dyn TorrentBackend> {
        &self.backend
    }

    pub fn piece_size(&self) -> u64 {
        self.piece_size
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn active_file(&self) -> Option<ActiveFile> {
        self.state.lock().await.active
    }

    /// First piece of the schedule currently applied.
    pub async fn anchor(&self) -> Option<PieceIndex> {
        self.state.lock().await.anchor
    }

    /// Makes `index` the only wanted file and computes its window.
    ///
    /// Any previously selected file loses its piece deadlines before this
    /// returns, so its pieces stop competing with the new file's header.
    ///
    /// # Errors
    /// - `StreamError::Selection` - Index outside the file list
    /// - `StreamError::Backend` - Backend rejected the selection
    pub async fn select_file(&self, index: usize) -> Result<ActiveFile, StreamError> {
        let mut state = self.state.lock().await;

        let span = self.backend.select_file(index).map_err(|e| match e {
            TorrentError::InvalidFileIndex { index, file_count } => {
                StreamError::Selection(SelectionError::OutOfRange {
                    index: index as i64,
                    file_count,
                })
            }
            other => StreamError::Backend(other),
        })?;

        // The previous file stays active until its deadlines are gone
        if let Some(prior) = state.active {
            if let Some(window) = prior.window {
                self.clear_deadlines(window.pieces())?;
                debug!(file_index = prior.index, "Deprioritized previous file");
            }
        }

        let window = compute_window(index, span.offset, span.size, self.piece_size);
        let active = ActiveFile {
            index,
            span,
            window,
        };
        state.active = Some(active);
        state.anchor = window.map(|w| w.first_piece);

        match window {
            Some(w) => info!(
                file_index = index,
                offset = span.offset,
                size = span.size,
                first_piece = %w.first_piece,
                last_piece = %w.last_piece,
                "File selected"
            ),
            None => info!(file_index = index, "Empty file selected, nothing to schedule"),
        }
        Ok(active)
    }

    /// Marks the window's first piece most urgent and blocks until it arrives.
    ///
    /// # Errors
    /// - `StreamError::PieceTimeout` - Header piece missed the header timeout
    /// - `StreamError::Cancelled` - Session cancelled while waiting
    pub async fn prime_header(&self, window: StreamWindow) -> Result<(), StreamError> {
        {
            let mut state = self.state.lock().await;
            self.backend.set_piece_deadline(window.first_piece, 0)?;
            state.anchor = Some(window.first_piece);
            state.generation += 1;
        }
        debug!(piece = %window.first_piece, "Waiting for header piece");

        self.wait_for_piece(window.first_piece, self.header_timeout)
            .await
    }

    /// Assigns strictly increasing deadlines to the rest of the window.
    ///
    /// # Errors
    /// - `StreamError::Backend` - Backend rejected a deadline
    pub async fn schedule_remainder(&self, window: StreamWindow) -> Result<(), StreamError> {
        let mut state = self.state.lock().await;
        let schedule = deadline_schedule(window, self.deadline_interval_ms);
        for &(piece, deadline) in &schedule {
            self.backend.set_piece_deadline(piece, deadline)?;
        }
        state.generation += 1;
        debug!(pieces = schedule.len(), "Scheduled remainder");
        Ok(())
    }

    /// Re-anchors the schedule at a file-relative byte offset.
    ///
    /// Missing pieces before the new anchor lose their deadlines; downloaded
    /// pieces are left alone. Offsets past the end clamp to the last byte.
    /// Returns the generation of the applied schedule; concurrent calls are
    /// applied in lock order and the highest generation wins.
    ///
    /// # Errors
    /// - `StreamError::NoActiveFile` - Nothing selected or the file is empty
    /// - `StreamError::Backend` - Backend rejected a deadline
    pub async fn reprioritize_for_seek(&self, file_offset: u64) -> Result<u64, StreamError> {
        let mut state = self.state.lock().await;
        let active = state.active.ok_or(StreamError::NoActiveFile)?;
        let window = active.window.ok_or(StreamError::NoActiveFile)?;

        let clamped = file_offset.min(active.span.size - 1);
        let piece = PieceIndex(((active.span.offset + clamped) / self.piece_size) as u32);
        Ok(self.reanchor(&mut state, window, piece)?)
    }

    /// Makes sure a piece a reader needs is scheduled, re-anchoring when the
    /// read lands outside the current schedule's readahead.
    ///
    /// # Errors
    /// - `StreamError::Backend` - Backend rejected a deadline
    pub async fn ensure_scheduled(&self, piece: PieceIndex) -> Result<(), StreamError> {
        if self.backend.have(piece) {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let Some(window) = state.active.and_then(|a| a.window) else {
            self.backend.set_piece_deadline(piece, 0)?;
            return Ok(());
        };
        if !window.contains(piece) {
            self.backend.set_piece_deadline(piece, 0)?;
            return Ok(());
        }

        let anchor = state.anchor.unwrap_or(window.first_piece);
        let behind = piece < anchor;
        let beyond = piece.0 > anchor.0.saturating_add(self.seek_readahead_pieces);
        if behind || beyond {
            debug!(piece = %piece, anchor = %anchor, "Read outside schedule, re-anchoring");
            self.reanchor(&mut state, window, piece)?;
        }
        Ok(())
    }

    /// Blocks until `piece` is downloaded, the timeout expires, or the
    /// session is cancelled.
    ///
    /// # Errors
    /// - `StreamError::PieceTimeout` - Piece missed the timeout
    /// - `StreamError::Cancelled` - Session cancelled
    /// - `StreamError::Backend` - Backend went away while waiting
    pub async fn wait_for_piece(
        &self,
        piece: PieceIndex,
        timeout: Duration,
    ) -> Result<(), StreamError> {
        // Subscribe before the first check so a completion between the two is not lost
        let mut completions = self.backend.subscribe_pieces();
        let wait = async {
            loop {
                if self.backend.have(piece) {
                    return Ok(());
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
                    changed = completions.changed() => {
                        if changed.is_err() {
                            return Err(StreamError::Backend(TorrentError::Closed));
                        }
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::PieceTimeout { piece, timeout }),
        }
    }

    fn reanchor(
        &self,
        state: &mut ScheduleState,
        window: StreamWindow,
        anchor: PieceIndex,
    ) -> Result<u64, TorrentError> {
        let Some(anchored) = window.anchored_at(anchor) else {
            return Ok(state.generation);
        };

        self.clear_deadlines((window.first_piece.0..anchor.0).map(PieceIndex))?;
        self.backend.set_piece_deadline(anchor, 0)?;
        for (piece, deadline) in deadline_schedule(anchored, self.deadline_interval_ms) {
            self.backend.set_piece_deadline(piece, deadline)?;
        }

        state.anchor = Some(anchor);
        state.generation += 1;
        debug!(anchor = %anchor, generation = state.generation, "Schedule re-anchored");
        Ok(state.generation)
    }

    fn clear_deadlines(
        &self,
        pieces: impl Iterator<Item = PieceIndex>,
    ) -> Result<(), TorrentError> {
        for piece in pieces {
            if !self.backend.have(piece) {
                self.backend.reset_piece_deadline(piece)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use proptest::prelude::*;

    use super::*;
    use crate::config::SeekstreamConfig;
    use crate::torrent::{MagnetLink, SimulatedBackend, SimulatedTorrent};

    const MAGNET: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=Demo";

    async fn setup(dir: &Path, config: &SeekstreamConfig) -> (Arc<SimulatedBackend>, StreamScheduler) {
        // 100-byte pieces: a.txt in piece 0, b.mkv across pieces 0..=10
        let torrent =
            SimulatedTorrent::synthetic("Demo", 100, &[("Demo/a.txt", 50), ("Demo/b.mkv", 1000)]);
        let backend = Arc::new(SimulatedBackend::new(torrent, dir, config));
        backend
            .add_magnet(&MagnetLink::parse(MAGNET).unwrap())
            .await
            .unwrap();
        backend.fetch_metadata().await.unwrap();

        let scheduler = StreamScheduler::new(
            backend.clone(),
            100,
            &config.streaming,
            CancellationToken::new(),
        );
        (backend, scheduler)
    }

    #[tokio::test]
    async fn test_select_file_computes_window() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, scheduler) = setup(dir.path(), &SeekstreamConfig::for_testing()).await;

        let active = scheduler.select_file(1).await.unwrap();
        let window = active.window.unwrap();
        assert_eq!(window.first_piece, PieceIndex(0));
        assert_eq!(window.last_piece, PieceIndex(10));
        assert_eq!(backend.file_priorities(), vec![0, 1]);

        assert!(matches!(
            scheduler.select_file(5).await,
            Err(StreamError::Selection(SelectionError::OutOfRange { index: 5, file_count: 2 }))
        ));
    }

    #[tokio::test]
    async fn test_prime_header_blocks_until_piece_arrives() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, scheduler) = setup(dir.path(), &SeekstreamConfig::for_testing()).await;
        let window = scheduler.select_file(1).await.unwrap().window.unwrap();

        let feeder = {
            let backend = backend.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                backend.complete_piece(PieceIndex(0)).await.unwrap();
            })
        };

        scheduler.prime_header(window).await.unwrap();
        assert!(backend.have(PieceIndex(0)));
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn test_prime_header_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SeekstreamConfig::for_testing();
        config.streaming.header_timeout = Duration::from_millis(20);
        let (backend, scheduler) = setup(dir.path(), &config).await;
        let window = scheduler.select_file(1).await.unwrap().window.unwrap();

        let result = scheduler.prime_header(window).await;
        assert!(matches!(
            result,
            Err(StreamError::PieceTimeout { piece: PieceIndex(0), .. })
        ));
        // The deadline request survives the timeout
        assert_eq!(backend.piece_deadline(PieceIndex(0)), Some(0));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_wait() {
        let dir = tempfile::tempdir().unwrap();
        let (_backend, scheduler) = setup(dir.path(), &SeekstreamConfig::for_testing()).await;
        scheduler.select_file(1).await.unwrap();

        let token = scheduler.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = scheduler
            .wait_for_piece(PieceIndex(4), Duration::from_secs(30))
            .await;
        assert!(matches!(result, Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn test_schedule_remainder_is_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, scheduler) = setup(dir.path(), &SeekstreamConfig::for_testing()).await;
        let window = scheduler.select_file(1).await.unwrap().window.unwrap();
        backend.complete_piece(PieceIndex(0)).await.unwrap();

        scheduler.schedule_remainder(window).await.unwrap();

        let deadlines: Vec<u32> = (1..=10)
            .map(|p| backend.piece_deadline(PieceIndex(p)).unwrap())
            .collect();
        assert!(deadlines.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(deadlines[0], 1000);
    }

    #[tokio::test]
    async fn test_file_switch_clears_previous_deadlines() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, scheduler) = setup(dir.path(), &SeekstreamConfig::for_testing()).await;
        let window = scheduler.select_file(1).await.unwrap().window.unwrap();
        backend.complete_piece(PieceIndex(0)).await.unwrap();
        scheduler.schedule_remainder(window).await.unwrap();
        assert!(backend.piece_deadline(PieceIndex(5)).is_some());

        scheduler.select_file(0).await.unwrap();
        for piece in window.pieces() {
            assert_eq!(backend.piece_deadline(piece), None, "piece {piece}");
        }
        assert_eq!(backend.file_priorities(), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_previous_file_active() {
        let dir = tempfile::tempdir().unwrap();
        let config = SeekstreamConfig::for_testing();
        let (backend, _) = setup(dir.path(), &config).await;
        // A smaller piece size than the torrent's pushes the window past the
        // last real piece, so clearing it fails partway through
        let scheduler =
            StreamScheduler::new(backend.clone(), 10, &config.streaming, CancellationToken::new());
        let first = scheduler.select_file(1).await.unwrap();
        assert!(first.window.unwrap().last_piece.0 >= 11);

        let result = scheduler.select_file(0).await;
        assert!(matches!(
            result,
            Err(StreamError::Backend(TorrentError::InvalidPieceIndex { .. }))
        ));
        assert_eq!(scheduler.active_file().await, Some(first));
        assert_eq!(scheduler.anchor().await, Some(first.window.unwrap().first_piece));
    }

    #[tokio::test]
    async fn test_seek_leaves_downloaded_pieces_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, scheduler) = setup(dir.path(), &SeekstreamConfig::for_testing()).await;
        scheduler.select_file(1).await.unwrap();
        backend.complete_pieces(5, 6).await.unwrap();

        // Offset 600 of b.mkv is torrent byte 650, piece 6
        scheduler.reprioritize_for_seek(600).await.unwrap();
        assert_eq!(scheduler.anchor().await, Some(PieceIndex(6)));
        assert_eq!(backend.piece_deadline(PieceIndex(5)), None);
        assert_eq!(backend.piece_deadline(PieceIndex(6)), None);
        assert_eq!(backend.piece_deadline(PieceIndex(7)), Some(1000));
        assert_eq!(backend.next_pieces(1), vec![PieceIndex(7)]);
    }

    #[tokio::test]
    async fn test_ensure_scheduled_reanchors_far_reads() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SeekstreamConfig::for_testing();
        config.streaming.seek_readahead_pieces = 2;
        let (backend, scheduler) = setup(dir.path(), &config).await;
        scheduler.select_file(1).await.unwrap();

        scheduler.ensure_scheduled(PieceIndex(2)).await.unwrap();
        assert_eq!(scheduler.anchor().await, Some(PieceIndex(0)));

        scheduler.ensure_scheduled(PieceIndex(9)).await.unwrap();
        assert_eq!(scheduler.anchor().await, Some(PieceIndex(9)));
        assert_eq!(backend.piece_deadline(PieceIndex(9)), Some(0));
        assert_eq!(backend.piece_deadline(PieceIndex(3)), None);

        // Reading back behind the anchor moves it again
        scheduler.ensure_scheduled(PieceIndex(1)).await.unwrap();
        assert_eq!(scheduler.anchor().await, Some(PieceIndex(1)));
        assert_eq!(backend.piece_deadline(PieceIndex(2)), Some(1000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_seeks_settle_on_last_applied() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, scheduler) = setup(dir.path(), &SeekstreamConfig::for_testing()).await;
        let scheduler = Arc::new(scheduler);
        scheduler.select_file(1).await.unwrap();

        let tasks: Vec<_> = (0..32u64)
            .map(|i| {
                let scheduler = scheduler.clone();
                let offset = (i * 37) % 1000;
                tokio::spawn(async move {
                    let generation = scheduler.reprioritize_for_seek(offset).await.unwrap();
                    (generation, offset)
                })
            })
            .collect();

        let mut applied = Vec::new();
        for task in tasks {
            applied.push(task.await.unwrap());
        }
        let (_, last_offset) = applied.iter().max_by_key(|(generation, _)| *generation).unwrap();
        let anchor = ((50 + last_offset) / 100) as u32;

        assert_eq!(scheduler.anchor().await, Some(PieceIndex(anchor)));
        for piece in 0..=10u32 {
            let expected = (piece >= anchor).then(|| (piece - anchor) * 1000);
            assert_eq!(backend.piece_deadline(PieceIndex(piece)), expected, "piece {piece}");
        }
    }

    proptest! {
        #[test]
        fn remainder_deadlines_strictly_increase(
            first in 0u32..10_000,
            len in 1u32..2_000,
            interval in 1u32..10_000,
        ) {
            let window = StreamWindow {
                file_index: 0,
                first_piece: PieceIndex(first),
                last_piece: PieceIndex(first + len - 1),
            };
            let schedule = deadline_schedule(window, interval);
            prop_assert_eq!(schedule.len() as u32, len - 1);
            prop_assert!(schedule.windows(2).all(|pair| pair[0].0 < pair[1].0 && pair[0].1 < pair[1].1));
            if let Some(&(piece, deadline)) = schedule.first() {
                prop_assert_eq!(piece, PieceIndex(first + 1));
                prop_assert!(deadline > 0);
            }
        }
    }
}
