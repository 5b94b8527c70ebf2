//! HTTP request handlers organized by functionality

pub mod api;
pub mod error;
pub mod streaming;

pub use api::{DownloadRequest, DownloadResponse, ProgressResponse, download_file, health, progress};
pub use error::ApiError;
pub use streaming::{FilePathQuery, stream_file};
