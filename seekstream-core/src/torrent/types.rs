//! Torrent metadata as seen by the streaming layer

use serde::Serialize;

/// High-level metadata for a torrent.
///
/// Immutable once fetched. File indices are contiguous `0..files.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentMetadata {
    pub name: String,
    /// Bytes per piece; always positive
    pub piece_size: u64,
    pub files: Vec<TorrentFile>,
}

impl TorrentMetadata {
    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Number of pieces covering the whole torrent.
    pub fn piece_count(&self) -> u32 {
        self.total_size().div_ceil(self.piece_size) as u32
    }

    /// Byte offset of a file within the concatenated torrent layout.
    pub fn file_offset(&self, index: usize) -> Option<u64> {
        if index >= self.files.len() {
            return None;
        }
        Some(self.files[..index].iter().map(|f| f.size).sum())
    }
}

/// A single file within a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentFile {
    /// Stable for the torrent's lifetime
    pub index: usize,
    /// Relative path within the torrent layout, `/` separated
    pub path: String,
    pub size: u64,
}

/// Where a selected file lives inside the torrent byte space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSpan {
    pub offset: u64,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TorrentMetadata {
        TorrentMetadata {
            name: "show".to_string(),
            piece_size: 100,
            files: vec![
                TorrentFile {
                    index: 0,
                    path: "show/sample.txt".to_string(),
                    size: 50,
                },
                TorrentFile {
                    index: 1,
                    path: "show/episode.mkv".to_string(),
                    size: 1000,
                },
            ],
        }
    }

    #[test]
    fn test_file_offsets_are_cumulative() {
        let meta = metadata();
        assert_eq!(meta.file_offset(0), Some(0));
        assert_eq!(meta.file_offset(1), Some(50));
        assert_eq!(meta.file_offset(2), None);
    }

    #[test]
    fn test_piece_count_rounds_up() {
        assert_eq!(metadata().piece_count(), 11);
    }
}
