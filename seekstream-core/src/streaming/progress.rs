//! Progress Tracker: download statistics for the active file

use std::sync::Arc;

use serde::Serialize;

use crate::torrent::TorrentBackend;

/// Snapshot of a file's download state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DownloadStats {
    pub downloaded: u64,
    pub total: u64,
    pub percent: f64,
    /// Bytes per second
    pub rate: u64,
}

/// Share of `total` that is downloaded, in `[0, 100]`. Zero when `total` is zero.
pub fn percent(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded.min(total) as f64 / total as f64) * 100.0
}

/// Formats a byte count with binary units, e.g. `1.5KB`, `700.0MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "K", "M", "G", "T", "P", "E", "Z"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}YB")
}

/// Samples backend counters on demand.
///
/// Holds no timer; the caller owns the sampling cadence.
#[derive(Clone)]
pub struct ProgressTracker {
    backend: Arc<dyn TorrentBackend>,
}

impl ProgressTracker {
    pub fn new(backend: Arc<dyn TorrentBackend>) -> Self {
        Self { backend }
    }

    pub fn sample(&self, file_index: usize, file_size: u64) -> DownloadStats {
        let downloaded = self.backend.file_progress(file_index).min(file_size);
        DownloadStats {
            downloaded,
            total: file_size,
            percent: percent(downloaded, file_size),
            rate: self.backend.download_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeekstreamConfig;
    use crate::torrent::{MagnetLink, PieceIndex, SimulatedBackend, SimulatedTorrent};

    #[test]
    fn test_percent_zero_guard() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(50, 200), 25.0);
        assert_eq!(percent(200, 200), 100.0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0B");
        assert_eq!(format_size(512), "512.0B");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0GB");
    }

    #[tokio::test]
    async fn test_sample_tracks_file_progress() {
        let dir = tempfile::tempdir().unwrap();
        let torrent = SimulatedTorrent::synthetic("Demo", 100, &[("Demo/movie.mkv", 400)]);
        let backend = Arc::new(SimulatedBackend::new(
            torrent,
            dir.path(),
            &SeekstreamConfig::for_testing(),
        ));
        backend
            .add_magnet(
                &MagnetLink::parse("magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a")
                    .unwrap(),
            )
            .await
            .unwrap();

        let tracker = ProgressTracker::new(backend.clone());
        let before = tracker.sample(0, 400);
        assert_eq!(before.downloaded, 0);
        assert_eq!(before.percent, 0.0);

        backend.complete_piece(PieceIndex(0)).await.unwrap();
        let after = tracker.sample(0, 400);
        assert_eq!(after.downloaded, 100);
        assert_eq!(after.percent, 25.0);
        assert!(after.rate >= 100);
    }
}
