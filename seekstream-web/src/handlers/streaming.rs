//! Range streaming endpoint

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use seekstream_core::streaming::{LocalFileProvider, PieceProvider, RangeStreamServer};
use serde::Deserialize;
use tracing::debug;

use super::error::ApiError;
use crate::server::{AppState, SessionSlot, absolute_path};

#[derive(Debug, Deserialize)]
pub struct FilePathQuery {
    pub file_path: String,
}

/// `GET /stream_file?file_path=...`
///
/// Files owned by a live session are served through its piece-gated reader,
/// so reads block until the bytes arrive. A session that ended before its
/// file was fully downloaded answers 503 rather than exposing the holes.
/// Anything else must already be complete on disk.
pub async fn stream_file(
    State(state): State<AppState>,
    Query(query): Query<FilePathQuery>,
    headers: HeaderMap,
) -> Response {
    let path = absolute_path(&PathBuf::from(&query.file_path));

    let provider: Arc<dyn PieceProvider> = match state.lookup(&path).await {
        Some(SessionSlot::Live(session)) => {
            debug!(path = %path.display(), session = %session.id(), "Serving from session");
            Arc::new(session.reader())
        }
        Some(SessionSlot::Finished(finished)) if !finished.complete => {
            debug!(
                path = %path.display(),
                phase = %finished.phase,
                "Session ended with file incomplete"
            );
            return ApiError::Incomplete {
                what: query.file_path.clone(),
            }
            .into_response();
        }
        _ => match LocalFileProvider::open(&path).await {
            Ok(provider) => Arc::new(provider),
            Err(_) => return not_found(&query.file_path),
        },
    };

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();

    RangeStreamServer::new(provider, content_type, state.config.streaming.chunk_size)
        .respond_to_header(headers.get(header::RANGE))
}

fn not_found(file_path: &str) -> Response {
    ApiError::NotFound {
        what: format!("file {file_path}"),
    }
    .into_response()
}
