//! Piece windows covering a file's byte span

use crate::torrent::{FileSpan, PieceIndex};

/// Inclusive range of pieces covering one file.
///
/// `first_piece <= last_piece` always holds; empty files have no window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamWindow {
    pub file_index: usize,
    pub first_piece: PieceIndex,
    pub last_piece: PieceIndex,
}

impl StreamWindow {
    /// Number of pieces in the window.
    pub fn len(&self) -> u32 {
        self.last_piece.0 - self.first_piece.0 + 1
    }

    /// Always false; zero-length windows are never constructed.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, piece: PieceIndex) -> bool {
        self.first_piece <= piece && piece <= self.last_piece
    }

    /// Pieces in ascending index order.
    pub fn pieces(&self) -> impl Iterator<Item = PieceIndex> + use<> {
        (self.first_piece.0..=self.last_piece.0).map(PieceIndex)
    }

    /// Same window, starting at `anchor` instead of the file's first piece.
    ///
    /// Returns `None` when `anchor` is outside the window.
    pub fn anchored_at(&self, anchor: PieceIndex) -> Option<StreamWindow> {
        self.contains(anchor).then_some(StreamWindow {
            first_piece: anchor,
            ..*self
        })
    }
}

/// Computes the piece window for a file at `offset` of `size` bytes.
///
/// `first_piece = offset / piece_size`,
/// `last_piece = (offset + size - 1) / piece_size`. Returns `None` for empty
/// files or a zero piece size.
pub fn compute_window(
    file_index: usize,
    offset: u64,
    size: u64,
    piece_size: u64,
) -> Option<StreamWindow> {
    if size == 0 || piece_size == 0 {
        return None;
    }

    Some(StreamWindow {
        file_index,
        first_piece: PieceIndex((offset / piece_size) as u32),
        last_piece: PieceIndex(((offset + size - 1) / piece_size) as u32),
    })
}

/// Converts a byte range within a file into the pieces that hold it.
///
/// `start..end` is file-relative and must be non-empty.
pub fn pieces_for_range(
    span: FileSpan,
    start: u64,
    end: u64,
    piece_size: u64,
) -> impl Iterator<Item = PieceIndex> {
    let first = (span.offset + start) / piece_size;
    let last = (span.offset + end.max(start + 1) - 1) / piece_size;
    (first as u32..=last as u32).map(PieceIndex)
}
