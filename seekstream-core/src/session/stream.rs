//! A session that has reached the streaming phase

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use super::{SessionError, SessionPhase, advance};
use crate::streaming::{
    ActiveFile, DownloadStats, ProgressTracker, StreamError, StreamScheduler, TorrentFileReader,
};
use crate::torrent::{TorrentBackend, TorrentFile, TorrentMetadata};
use crate::ui::StreamUi;

/// One selected file being streamed from one torrent.
///
/// Owns the session's backend handle and scheduler. Readers created through
/// [`StreamSession::reader`] share the scheduler, so their seeks serialize
/// with the session's own scheduling.
pub struct StreamSession {
    id: Uuid,
    metadata: TorrentMetadata,
    file: ActiveFile,
    file_path: PathBuf,
    backend: Arc<dyn TorrentBackend>,
    scheduler: Arc<StreamScheduler>,
    tracker: ProgressTracker,
    piece_timeout: Duration,
    phase: watch::Sender<SessionPhase>,
    closed: AtomicBool,
    /// Whether the file was whole when the backend was released
    complete_on_release: AtomicBool,
}

impl StreamSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Uuid,
        metadata: TorrentMetadata,
        file: ActiveFile,
        file_path: PathBuf,
        backend: Arc<dyn TorrentBackend>,
        scheduler: Arc<StreamScheduler>,
        piece_timeout: Duration,
        phase: watch::Sender<SessionPhase>,
    ) -> Self {
        Self {
            id,
            metadata,
            file,
            file_path,
            tracker: ProgressTracker::new(Arc::clone(&backend)),
            backend,
            scheduler,
            piece_timeout,
            phase,
            closed: AtomicBool::new(false),
            complete_on_release: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn metadata(&self) -> &TorrentMetadata {
        &self.metadata
    }

    pub fn active_file(&self) -> ActiveFile {
        self.file
    }

    /// Metadata entry of the streamed file.
    pub fn file_entry(&self) -> Option<&TorrentFile> {
        self.metadata.files.get(self.file.index)
    }

    /// Absolute on-disk path of the streamed file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn file_size(&self) -> u64 {
        self.file.span.size
    }

    pub fn scheduler(&self) -> &Arc<StreamScheduler> {
        &self.scheduler
    }

    pub fn stats(&self) -> DownloadStats {
        self.tracker.sample(self.file.index, self.file.span.size)
    }

    /// Whether every byte of the file is on disk. Once the session has
    /// ended this is the answer recorded when the backend was released.
    pub fn is_fully_downloaded(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return self.complete_on_release.load(Ordering::SeqCst);
        }
        self.backend_reports_complete()
    }

    fn backend_reports_complete(&self) -> bool {
        self.backend.file_progress(self.file.index) >= self.file.span.size
    }

    /// Piece-gated reader over the streamed file.
    pub fn reader(&self) -> TorrentFileReader {
        TorrentFileReader::new(
            Arc::clone(&self.scheduler),
            self.file_path.clone(),
            self.file,
            self.piece_timeout,
        )
    }

    /// Samples progress on `interval` until the file is fully downloaded,
    /// then completes the session.
    ///
    /// # Errors
    /// - `StreamError::Cancelled` - Session cancelled before completion
    pub async fn monitor_until_downloaded(
        &self,
        interval: Duration,
        ui: &dyn StreamUi,
    ) -> Result<(), SessionError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.scheduler.cancel_token().cancelled() => {
                    return Err(StreamError::Cancelled.into());
                }
                _ = ticker.tick() => {
                    let stats = self.stats();
                    ui.show_progress(&stats);
                    if stats.downloaded >= stats.total {
                        break;
                    }
                }
            }
        }
        self.complete().await
    }

    /// Marks the session completed and releases the backend.
    ///
    /// # Errors
    /// - `SessionError::InvalidTransition` - Session is not streaming
    /// - `SessionError::Torrent` - Resume state could not be flushed
    pub async fn complete(&self) -> Result<(), SessionError> {
        advance(&self.phase, SessionPhase::Completed)?;
        info!(session = %self.id, "Session completed");
        self.release().await
    }

    /// Aborts the session, unblocking every in-flight wait. No-op once the
    /// session has already ended.
    ///
    /// # Errors
    /// - `SessionError::Torrent` - Resume state could not be flushed
    pub async fn abort(&self) -> Result<(), SessionError> {
        if self.phase().is_terminal() {
            return Ok(());
        }
        advance(&self.phase, SessionPhase::Aborted)?;
        warn!(session = %self.id, "Session aborted");
        self.release().await
    }

    async fn release(&self) -> Result<(), SessionError> {
        self.scheduler.cancel_token().cancel();
        if !self.closed.load(Ordering::SeqCst) {
            self.complete_on_release
                .store(self.backend_reports_complete(), Ordering::SeqCst);
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.close().await?;
        Ok(())
    }
}
