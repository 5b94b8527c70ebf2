//! JSON API handlers for sessions

use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use seekstream_core::SeekstreamError;
use seekstream_core::session::{SessionPhase, SessionRequest};
use seekstream_core::streaming::{DownloadStats, FileSelector};
use seekstream_core::torrent::MagnetLink;
use seekstream_core::ui::LogUi;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::error::ApiError;
use super::streaming::FilePathQuery;
use crate::server::{AppState, SessionSlot};

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub magnet_link: String,
    /// Integer index or file-name fragment
    pub file_choice: Value,
    /// Defaults to the server's working directory
    #[serde(default)]
    pub save_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub file_path: String,
    pub file_index: usize,
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub phase: SessionPhase,
    #[serde(flatten)]
    pub stats: DownloadStats,
}

/// `POST /download_file`
///
/// Opens a session and returns once the file's header piece is on disk, so
/// the returned path is immediately streamable. The rest downloads in the
/// background.
pub async fn download_file(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest {
        reason: e.body_text(),
    })?;
    let magnet = MagnetLink::parse(&request.magnet_link).map_err(SeekstreamError::from)?;
    let selector = FileSelector::from_json(&request.file_choice).map_err(SeekstreamError::from)?;
    let save_path = PathBuf::from(request.save_path.as_deref().unwrap_or("."));

    let backend = state.provider.create(&save_path);
    let session = state
        .controller
        .open(
            backend,
            &SessionRequest {
                magnet,
                selector: Some(selector),
                save_path,
            },
        )
        .await?;
    let session = Arc::new(session);

    let response = DownloadResponse {
        file_path: session.file_path().display().to_string(),
        file_index: session.active_file().index,
        file_size: session.file_size(),
    };
    info!(path = %response.file_path, index = response.file_index, "Session ready for streaming");

    state.register(Arc::clone(&session)).await;
    let interval = state.config.streaming.progress_interval;
    tokio::spawn(async move {
        if let Err(e) = session.monitor_until_downloaded(interval, &LogUi).await {
            warn!(session = %session.id(), error = %e, "Background download ended early");
            if let Err(e) = session.abort().await {
                warn!(session = %session.id(), error = %e, "Failed to abort session");
            }
        }
        state.retire(session.file_path()).await;
    });

    Ok(Json(response))
}

/// `GET /progress?file_path=...`
pub async fn progress(
    State(state): State<AppState>,
    Query(query): Query<FilePathQuery>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let slot = state
        .lookup(&PathBuf::from(&query.file_path))
        .await
        .ok_or_else(|| ApiError::NotFound {
            what: format!("session for {}", query.file_path),
        })?;

    let (phase, stats) = match slot {
        SessionSlot::Live(session) => (session.phase(), session.stats()),
        SessionSlot::Finished(finished) => (finished.phase, finished.stats),
    };
    Ok(Json(ProgressResponse { phase, stats }))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
