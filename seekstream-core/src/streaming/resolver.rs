//! File Resolver: user selector to concrete file index

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::torrent::TorrentFile;

/// How a user picks a file out of a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelector {
    /// Position in the file list. Signed so negative input can be reported
    /// as out of range rather than rejected during parsing.
    Index(i64),
    /// Substring of the file's path.
    Name(String),
}

impl FileSelector {
    /// Interprets a JSON value: numbers select by index, strings by name.
    ///
    /// # Errors
    /// - `SelectionError::InvalidSelector` - Any other JSON type, or a non-integer number
    pub fn from_json(value: &Value) -> Result<Self, SelectionError> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(FileSelector::Index)
                .ok_or(SelectionError::InvalidSelector),
            Value::String(s) => Ok(FileSelector::Name(s.clone())),
            _ => Err(SelectionError::InvalidSelector),
        }
    }
}

impl FromStr for FileSelector {
    type Err = SelectionError;

    /// Integers select by index; anything else is a name fragment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SelectionError::InvalidSelector);
        }
        Ok(s.parse::<i64>()
            .map(FileSelector::Index)
            .unwrap_or_else(|_| FileSelector::Name(s.to_string())))
    }
}

impl fmt::Display for FileSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSelector::Index(i) => write!(f, "#{i}"),
            FileSelector::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// File resolution failures. Reported to the caller, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("file index {index} is out of range ({file_count} files)")]
    OutOfRange { index: i64, file_count: usize },

    #[error("no file found matching {fragment:?}")]
    NotFound { fragment: String },

    #[error("file choice must be an integer index or a name fragment")]
    InvalidSelector,
}

/// Maps a selector to a file index.
///
/// Name fragments match the first file, in stored order, whose path contains
/// the fragment. Matching is case sensitive.
///
/// # Errors
/// - `SelectionError::OutOfRange` - Index outside `0..files.len()`
/// - `SelectionError::NotFound` - No path contains the fragment
pub fn resolve(files: &[TorrentFile], selector: &FileSelector) -> Result<usize, SelectionError> {
    match selector {
        FileSelector::Index(index) => usize::try_from(*index)
            .ok()
            .filter(|&i| i < files.len())
            .ok_or(SelectionError::OutOfRange {
                index: *index,
                file_count: files.len(),
            }),
        FileSelector::Name(fragment) => files
            .iter()
            .find(|f| f.path.contains(fragment.as_str()))
            .map(|f| f.index)
            .ok_or_else(|| SelectionError::NotFound {
                fragment: fragment.clone(),
            }),
    }
}
