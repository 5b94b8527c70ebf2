//! Session Controller: sequences backend, scheduler, player and UI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::stream::StreamSession;
use super::{SessionError, SessionPhase, advance};
use crate::config::SeekstreamConfig;
use crate::player::Player;
use crate::streaming::{FileSelector, StreamError, StreamScheduler, resolve};
use crate::torrent::{MagnetLink, TorrentBackend};
use crate::ui::StreamUi;

/// What to stream and where to put it.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub magnet: MagnetLink,
    /// `None` asks the UI to prompt for a file.
    pub selector: Option<FileSelector>,
    pub save_path: PathBuf,
}

/// Drives streaming sessions against session-owned backends.
pub struct SessionController {
    config: SeekstreamConfig,
    ui: Arc<dyn StreamUi>,
    shutdown: CancellationToken,
}

impl SessionController {
    pub fn new(config: SeekstreamConfig, ui: Arc<dyn StreamUi>) -> Self {
        Self {
            config,
            ui,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token whose cancellation aborts every session this controller opened.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Runs a session up to the streaming phase.
    ///
    /// Fetches metadata, resolves and selects the file, waits for its header
    /// piece and schedules the remainder. On failure the session is aborted
    /// and the backend closed before the error is returned.
    ///
    /// # Errors
    /// - `StreamError::MetadataTimeout` - Metadata never arrived
    /// - `SessionError::Selection` - File could not be resolved
    /// - `StreamError::PieceTimeout` - Header piece never arrived
    /// - `StreamError::Cancelled` - Controller shut down meanwhile
    pub async fn open(
        &self,
        backend: Arc<dyn TorrentBackend>,
        request: &SessionRequest,
    ) -> Result<StreamSession, SessionError> {
        let id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        let (phase, _) = watch::channel(SessionPhase::Idle);
        info!(session = %id, magnet = %request.magnet.info_hash, "Opening session");

        match self
            .establish(id, Arc::clone(&backend), request, &phase, &cancel)
            .await
        {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(phase_error) = advance(&phase, SessionPhase::Aborted) {
                    warn!(session = %id, error = %phase_error, "Failed to mark session aborted");
                }
                cancel.cancel();
                self.ui.report_error(&e.to_string());
                if let Err(close_error) = backend.close().await {
                    warn!(session = %id, error = %close_error, "Failed to close backend");
                }
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        id: Uuid,
        backend: Arc<dyn TorrentBackend>,
        request: &SessionRequest,
        phase: &watch::Sender<SessionPhase>,
        cancel: &CancellationToken,
    ) -> Result<StreamSession, SessionError> {
        let streaming = &self.config.streaming;

        advance(phase, SessionPhase::MetadataFetching)?;
        backend.add_magnet(&request.magnet).await?;
        self.ui.show_fetching_metadata();

        let timeout = streaming.metadata_timeout;
        let metadata = tokio::select! {
            _ = cancel.cancelled() => return Err(StreamError::Cancelled.into()),
            fetched = tokio::time::timeout(timeout, backend.fetch_metadata()) => {
                fetched.map_err(|_| StreamError::MetadataTimeout { timeout })??
            }
        };
        self.ui.show_metadata(&metadata.name);

        let selector = match &request.selector {
            Some(selector) => selector.clone(),
            None => {
                self.ui.list_files(&metadata.files);
                self.ui.prompt_file_choice(&metadata.files).await?
            }
        };
        let index = resolve(&metadata.files, &selector)?;

        let scheduler = Arc::new(StreamScheduler::new(
            Arc::clone(&backend),
            metadata.piece_size,
            streaming,
            cancel.clone(),
        ));
        let file = scheduler.select_file(index).await?;
        advance(phase, SessionPhase::FileSelected)?;

        let relative_path = metadata.files[index].path.clone();
        let file_path = absolute_file_path(&request.save_path, &relative_path);
        self.ui
            .show_selected_file(index, &relative_path, &file_path);

        advance(phase, SessionPhase::HeaderBuffering)?;
        self.ui.buffering_header();
        if let Some(window) = file.window {
            scheduler.prime_header(window).await?;
        }

        advance(phase, SessionPhase::Streaming)?;
        if let Some(window) = file.window {
            scheduler.schedule_remainder(window).await?;
        }
        info!(session = %id, file_index = index, path = %file_path.display(), "Streaming");

        Ok(StreamSession::new(
            id,
            metadata,
            file,
            file_path,
            backend,
            scheduler,
            streaming.piece_timeout,
            phase.clone(),
        ))
    }

    /// Runs a whole console session: open, play, monitor, close.
    ///
    /// With a player, the session completes when the player exits. Without
    /// one, or when the player cannot start, it completes once the file is
    /// fully downloaded. Cancelling the shutdown token aborts it.
    ///
    /// # Errors
    /// - Any error from [`SessionController::open`]
    /// - `StreamError::Cancelled` - Shut down before completion
    pub async fn run(
        &self,
        backend: Arc<dyn TorrentBackend>,
        request: &SessionRequest,
        player: Option<&dyn Player>,
    ) -> Result<(), SessionError> {
        let session = self.open(backend, request).await?;
        self.drive(&session, player).await
    }

    /// Plays an opened session to its end.
    ///
    /// Used directly when the session must be shared (for example with the
    /// HTTP surface) before playback starts. The session is aborted if
    /// playback or monitoring fails.
    ///
    /// # Errors
    /// - `StreamError::Cancelled` - Shut down before completion
    /// - `TorrentError` - Backend failed while monitoring or closing
    pub async fn drive(
        &self,
        session: &StreamSession,
        player: Option<&dyn Player>,
    ) -> Result<(), SessionError> {
        let outcome = self.play(session, player).await;
        self.ui.finish();

        match outcome {
            Ok(()) => Ok(()),
            Err(e) => {
                self.ui.report_error(&e.to_string());
                if let Err(abort_error) = session.abort().await {
                    warn!(session = %session.id(), error = %abort_error, "Failed to abort session");
                }
                Err(e)
            }
        }
    }

    async fn play(
        &self,
        session: &StreamSession,
        player: Option<&dyn Player>,
    ) -> Result<(), SessionError> {
        let interval = self.config.streaming.progress_interval;

        let process = match player {
            Some(player) => {
                self.ui.show_launching_player();
                match player.launch(session.file_path()) {
                    Ok(process) => Some(process),
                    Err(e) => {
                        // Playback failed; keep downloading
                        self.ui.report_error(&e.to_string());
                        None
                    }
                }
            }
            None => None,
        };

        let Some(mut process) = process else {
            return session
                .monitor_until_downloaded(interval, self.ui.as_ref())
                .await;
        };

        let cancel = session.scheduler().cancel_token().clone();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = process.kill().await {
                        warn!(error = %e, "Failed to stop player");
                    }
                    return Err(StreamError::Cancelled.into());
                }
                status = process.wait() => {
                    match status {
                        Ok(status) if !status.success() => warn!(%status, "Player exited with failure"),
                        Ok(_) => info!("Player exited"),
                        Err(e) => warn!(error = %e, "Lost track of player process"),
                    }
                    break;
                }
                _ = ticker.tick() => self.ui.show_progress(&session.stats()),
            }
        }

        session.complete().await
    }
}

fn absolute_file_path(save_path: &Path, relative_path: &str) -> PathBuf {
    let joined = save_path.join(relative_path);
    std::path::absolute(&joined).unwrap_or(joined)
}
