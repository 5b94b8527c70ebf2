//! `Range` request header parsing
//!
//! Only a single `bytes=start-end` or `bytes=start-` range is accepted.
//! Suffix ranges and multi-range requests are rejected rather than guessed at.

use thiserror::Error;

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; ranges hold at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a file of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Reasons a `Range` header cannot be served. All map to 416.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("malformed range header {header:?}")]
    Malformed { header: String },

    #[error("multi-range requests are not supported")]
    MultiRange,

    #[error("suffix ranges are not supported")]
    Suffix,

    #[error("range {start}-{end} not satisfiable for {size} bytes")]
    Unsatisfiable { start: u64, end: u64, size: u64 },
}

/// Parses an optional `Range` header against a file of `size` bytes.
///
/// Returns `Ok(None)` when no header was sent. A missing end means
/// `size - 1`. The result always satisfies `start <= end < size`.
///
/// # Errors
/// - `RangeParseError::Malformed` - Not `bytes=<start>-[<end>]`
/// - `RangeParseError::MultiRange` - More than one range requested
/// - `RangeParseError::Suffix` - `bytes=-N` form
/// - `RangeParseError::Unsatisfiable` - Range outside the file
pub fn parse_range_header(
    header: Option<&str>,
    size: u64,
) -> Result<Option<ByteRange>, RangeParseError> {
    let Some(header) = header else {
        return Ok(None);
    };
    let malformed = || RangeParseError::Malformed {
        header: header.to_string(),
    };

    let ranges = header.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    if ranges.contains(',') {
        return Err(RangeParseError::MultiRange);
    }

    let (start, end) = ranges.split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() {
        return Err(RangeParseError::Suffix);
    }

    let start: u64 = start.parse().map_err(|_| malformed())?;
    let end: u64 = if end.is_empty() {
        size.checked_sub(1).ok_or(RangeParseError::Unsatisfiable {
            start,
            end: start,
            size,
        })?
    } else {
        end.parse().map_err(|_| malformed())?
    };

    if start > end || end >= size {
        return Err(RangeParseError::Unsatisfiable { start, end, size });
    }
    Ok(Some(ByteRange { start, end }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_header() {
        assert_eq!(parse_range_header(None, 1000), Ok(None));
    }

    #[test]
    fn test_closed_and_open_ranges() {
        assert_eq!(
            parse_range_header(Some("bytes=0-99"), 1000),
            Ok(Some(ByteRange { start: 0, end: 99 }))
        );
        let open = parse_range_header(Some("bytes=900-"), 1000).unwrap().unwrap();
        assert_eq!(open, ByteRange { start: 900, end: 999 });
        assert_eq!(open.len(), 100);
        assert_eq!(open.content_range(1000), "bytes 900-999/1000");
    }

    #[test]
    fn test_unsatisfiable_ranges() {
        for header in ["bytes=2000-2010", "bytes=0-1000", "bytes=50-10", "bytes=1000-"] {
            assert!(
                matches!(
                    parse_range_header(Some(header), 1000),
                    Err(RangeParseError::Unsatisfiable { .. })
                ),
                "{header}"
            );
        }
        assert!(matches!(
            parse_range_header(Some("bytes=0-"), 0),
            Err(RangeParseError::Unsatisfiable { .. })
        ));
    }

    #[test]
    fn test_rejected_forms() {
        assert_eq!(
            parse_range_header(Some("bytes=0-1,5-9"), 1000),
            Err(RangeParseError::MultiRange)
        );
        assert_eq!(
            parse_range_header(Some("bytes=-100"), 1000),
            Err(RangeParseError::Suffix)
        );
        for header in ["items=0-1", "bytes=abc-", "bytes=10", "bytes=1-x"] {
            assert!(
                matches!(
                    parse_range_header(Some(header), 1000),
                    Err(RangeParseError::Malformed { .. })
                ),
                "{header}"
            );
        }
    }
}
