//! HTTP server for Seekstream
//!
//! Exposes range streaming of partially downloaded files plus a small JSON
//! API for opening sessions and reading their progress.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use seekstream_core::config::SeekstreamConfig;
use seekstream_core::session::{SessionController, SessionPhase, StreamSession};
use seekstream_core::streaming::DownloadStats;
use seekstream_core::torrent::BackendProvider;
use seekstream_core::ui::LogUi;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::handlers::{download_file, health, progress, stream_file};

/// Final state of a session that has ended.
#[derive(Debug, Clone, Copy)]
pub struct FinishedSession {
    pub phase: SessionPhase,
    pub stats: DownloadStats,
    /// Every byte of the file reached disk
    pub complete: bool,
}

impl FinishedSession {
    fn of(session: &StreamSession) -> Self {
        Self {
            phase: session.phase(),
            stats: session.stats(),
            complete: session.is_fully_downloaded(),
        }
    }
}

/// What the server knows about the file at a path.
#[derive(Clone)]
pub enum SessionSlot {
    /// Session still downloading; reads go through its piece-gated reader.
    Live(Arc<StreamSession>),
    /// Ended session, kept without its backend so an incomplete file is
    /// never served from its sparse holes.
    Finished(FinishedSession),
}

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SeekstreamConfig>,
    pub provider: Arc<dyn BackendProvider>,
    pub controller: Arc<SessionController>,
    sessions: Arc<RwLock<HashMap<PathBuf, SessionSlot>>>,
}

impl AppState {
    /// State whose sessions report through tracing.
    pub fn new(config: SeekstreamConfig, provider: Arc<dyn BackendProvider>) -> Self {
        let controller = SessionController::new(config.clone(), Arc::new(LogUi));
        Self {
            config: Arc::new(config),
            provider,
            controller: Arc::new(controller),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Makes a session's file servable, replacing whatever was known about
    /// the same path. A replaced live session is aborted.
    pub async fn register(&self, session: Arc<StreamSession>) {
        let path = session.file_path().to_path_buf();
        let previous = self
            .sessions
            .write()
            .await
            .insert(path.clone(), SessionSlot::Live(session));
        if let Some(SessionSlot::Live(previous)) = previous {
            info!(path = %path.display(), "Replacing existing session");
            if let Err(e) = previous.abort().await {
                warn!(error = %e, "Failed to abort replaced session");
            }
        }
    }

    /// What is known about the file at `path`. Live sessions that have
    /// ended are retired on the way.
    pub async fn lookup(&self, path: &Path) -> Option<SessionSlot> {
        let key = absolute_path(path);
        let slot = self.sessions.read().await.get(&key).cloned();
        match slot {
            Some(SessionSlot::Live(session)) if session.phase().is_terminal() => {
                self.retire(&key).await
            }
            other => other,
        }
    }

    /// Replaces an ended live session at `path` with its final state,
    /// dropping its backend and scheduler.
    pub async fn retire(&self, path: &Path) -> Option<SessionSlot> {
        let key = absolute_path(path);
        let mut sessions = self.sessions.write().await;
        let slot = sessions.get_mut(&key)?;
        if let SessionSlot::Live(session) = slot {
            if session.phase().is_terminal() {
                let finished = FinishedSession::of(session);
                debug!(
                    path = %key.display(),
                    phase = %finished.phase,
                    complete = finished.complete,
                    "Retired session"
                );
                *slot = SessionSlot::Finished(finished);
            }
        }
        Some(slot.clone())
    }

    /// Aborts every live session, flushing their resume state.
    pub async fn shutdown_sessions(&self) {
        let live: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter_map(|slot| match slot {
                SessionSlot::Live(session) => Some(Arc::clone(session)),
                SessionSlot::Finished(_) => None,
            })
            .collect();
        for session in live {
            if let Err(e) = session.abort().await {
                warn!(session = %session.id(), error = %e, "Failed to abort session");
            }
            self.retire(session.file_path()).await;
        }
    }
}

/// Resolves `path` against the working directory without touching the disk.
pub(crate) fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Builds the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/stream_file", get(stream_file))
        .route("/download_file", post(download_file))
        .route("/progress", get(progress))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API on `addr` until `shutdown` resolves, then aborts all sessions.
///
/// # Errors
/// - `std::io::Error` - Address could not be bound or the server failed
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Seekstream server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    state.shutdown_sessions().await;
    info!("Seekstream server stopped");
    Ok(())
}
