//! Front-end capability set consumed by the session controller

use std::path::Path;

use async_trait::async_trait;
use tracing::{error, info};

use crate::streaming::{DownloadStats, FileSelector, SelectionError, format_size};
use crate::torrent::TorrentFile;

/// What a front end must offer to drive a streaming session.
///
/// Console, graphical and HTTP front ends each implement this; the core
/// never depends on a concrete one.
#[async_trait]
pub trait StreamUi: Send + Sync {
    fn show_fetching_metadata(&self);

    fn show_metadata(&self, name: &str);

    fn list_files(&self, files: &[TorrentFile]);

    /// Asks the user which file to stream.
    ///
    /// # Errors
    /// - `SelectionError::InvalidSelector` - Input is not a usable selector
    async fn prompt_file_choice(&self, files: &[TorrentFile]) -> Result<FileSelector, SelectionError>;

    fn show_selected_file(&self, index: usize, relative_path: &str, absolute_path: &Path);

    fn buffering_header(&self);

    fn show_launching_player(&self);

    fn show_progress(&self, stats: &DownloadStats);

    fn report_error(&self, message: &str);

    /// Called once the session has ended.
    fn finish(&self);
}

/// Non-interactive front end that reports through tracing.
///
/// Used for sessions opened over HTTP, where the file choice always arrives
/// with the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUi;

#[async_trait]
impl StreamUi for LogUi {
    fn show_fetching_metadata(&self) {
        info!("Fetching metadata");
    }

    fn show_metadata(&self, name: &str) {
        info!(name, "Metadata received");
    }

    fn list_files(&self, files: &[TorrentFile]) {
        for file in files {
            info!(index = file.index, path = %file.path, size = %format_size(file.size), "File");
        }
    }

    async fn prompt_file_choice(&self, _files: &[TorrentFile]) -> Result<FileSelector, SelectionError> {
        Err(SelectionError::InvalidSelector)
    }

    fn show_selected_file(&self, index: usize, relative_path: &str, absolute_path: &Path) {
        info!(
            index,
            path = relative_path,
            streaming_from = %absolute_path.display(),
            "File selected"
        );
    }

    fn buffering_header(&self) {
        info!("Buffering header");
    }

    fn show_launching_player(&self) {
        info!("Launching player");
    }

    fn show_progress(&self, stats: &DownloadStats) {
        info!(
            downloaded = %format_size(stats.downloaded),
            total = %format_size(stats.total),
            percent = format_args!("{:.1}", stats.percent),
            rate = %format_size(stats.rate),
            "Progress"
        );
    }

    fn report_error(&self, message: &str) {
        error!("{message}");
    }

    fn finish(&self) {
        info!("Session finished");
    }
}
