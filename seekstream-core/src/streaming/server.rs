//! Range Streaming Server: HTTP framing for partially downloaded files
//!
//! Produces 200/206/416 responses whose bodies are pulled chunk by chunk from
//! a [`PieceProvider`]. Each chunk waits for its covering pieces; a failed
//! read ends the body with an error instead of short or zeroed data. When the
//! client goes away the body stream is dropped, which drops any pending
//! wait and the chunk's file handle with it.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, stream};
use tracing::{debug, warn};

use super::provider::PieceProvider;
use super::range::parse_range_header;

/// Serves byte ranges of one file.
pub struct RangeStreamServer {
    provider: Arc<dyn PieceProvider>,
    content_type: String,
    chunk_size: usize,
}

impl RangeStreamServer {
    pub fn new(provider: Arc<dyn PieceProvider>, content_type: String, chunk_size: usize) -> Self {
        Self {
            provider,
            content_type,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Builds the response for an optional `Range` header value.
    pub fn respond(&self, range_header: Option<&str>) -> Response {
        let size = self.provider.size();

        let range = match parse_range_header(range_header, size) {
            Ok(range) => range,
            Err(e) => {
                debug!(error = %e, size, "Rejecting range request");
                return Self::not_satisfiable(size);
            }
        };

        let (status, start, length) = match range {
            Some(r) => (StatusCode::PARTIAL_CONTENT, r.start, r.len()),
            None => (StatusCode::OK, 0, size),
        };

        let body = Body::from_stream(Self::chunk_stream(
            Arc::clone(&self.provider),
            start,
            length,
            self.chunk_size,
        ));

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, &self.content_type)
            .header(header::CONTENT_LENGTH, length.to_string())
            .header(header::ACCEPT_RANGES, "bytes");
        if let Some(range) = range {
            builder = builder.header(header::CONTENT_RANGE, range.content_range(size));
        }

        builder
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }

    /// Builds the response for a raw `Range` header.
    ///
    /// A value that does not decode as visible ASCII is malformed and gets
    /// 416, same as any other unparsable range.
    pub fn respond_to_header(&self, range_header: Option<&HeaderValue>) -> Response {
        match range_header.map(HeaderValue::to_str).transpose() {
            Ok(range) => self.respond(range),
            Err(_) => {
                let size = self.provider.size();
                debug!(size, "Rejecting undecodable range header");
                Self::not_satisfiable(size)
            }
        }
    }

    fn not_satisfiable(size: u64) -> Response {
        let content_range = HeaderValue::from_str(&format!("bytes */{size}"))
            .unwrap_or_else(|_| HeaderValue::from_static("bytes */0"));
        (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, content_range)],
        )
            .into_response()
    }

    fn chunk_stream(
        provider: Arc<dyn PieceProvider>,
        start: u64,
        length: u64,
        chunk_size: usize,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        let end = start + length;
        stream::unfold(Some(start), move |position| {
            let provider = Arc::clone(&provider);
            async move {
                let offset = position?;
                if offset >= end {
                    return None;
                }

                let want = (chunk_size as u64).min(end - offset) as usize;
                match provider.read_at(offset, want).await {
                    Ok(bytes) => {
                        let next = offset + bytes.len() as u64;
                        Some((Ok(bytes), Some(next)))
                    }
                    Err(e) => {
                        warn!(offset, error = %e, "Aborting response body");
                        Some((Err(std::io::Error::other(e.to_string())), None))
                    }
                }
            }
        })
    }
}
