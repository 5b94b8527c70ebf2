//! Magnet link parsing

use super::{InfoHash, TorrentError};

const BTIH_PREFIX: &str = "xt=urn:btih:";

/// Magnet link components.
///
/// Parsed magnet URI containing the info hash plus optional display name
/// and tracker URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
    /// The URI as supplied, handed on to backends that want it verbatim
    pub uri: String,
}

impl MagnetLink {
    /// Parses a magnet URI.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMagnet` - Malformed URI or missing/invalid `btih` hash
    pub fn parse(uri: &str) -> Result<Self, TorrentError> {
        let uri = uri.trim();
        let magnet = magnet_url::Magnet::new(uri).map_err(|e| TorrentError::InvalidMagnet {
            reason: e.to_string(),
        })?;

        let info_hash = extract_info_hash(uri)?;

        Ok(Self {
            info_hash,
            display_name: magnet.display_name().map(|s| s.to_string()),
            trackers: magnet.trackers().to_vec(),
            uri: uri.to_string(),
        })
    }
}

/// Finds the `xt=urn:btih:` parameter in the query string.
fn extract_info_hash(uri: &str) -> Result<InfoHash, TorrentError> {
    let query = uri
        .split_once('?')
        .map(|(_, q)| q)
        .ok_or_else(|| TorrentError::InvalidMagnet {
            reason: "missing query string".to_string(),
        })?;

    let hash = query
        .split('&')
        .find_map(|param| param.strip_prefix(BTIH_PREFIX))
        .ok_or_else(|| TorrentError::InvalidMagnet {
            reason: "missing xt=urn:btih parameter".to_string(),
        })?;

    if hash.len() != 40 {
        return Err(TorrentError::InvalidMagnet {
            reason: format!("info hash must be 40 hex characters, got {}", hash.len()),
        });
    }

    InfoHash::from_hex(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_info_hash_from_query() {
        let hash = extract_info_hash(
            "magnet:?dn=Demo&xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&tr=udp://t",
        )
        .unwrap();
        assert_eq!(hash.to_string(), "c12fe1c06bba254a9dc9f519b335aa7c1367a88a");
    }

    #[test]
    fn test_missing_hash_is_rejected() {
        assert!(matches!(
            extract_info_hash("magnet:?dn=NoHash"),
            Err(TorrentError::InvalidMagnet { .. })
        ));
    }

    #[test]
    fn test_base32_hash_is_rejected() {
        let result = extract_info_hash("magnet:?xt=urn:btih:YNCKHTQCWBTRNJIV4WNAE52SJUQCZO5C");
        assert!(matches!(result, Err(TorrentError::InvalidMagnet { .. })));
    }

    #[test]
    fn test_garbage_uri_fails() {
        assert!(MagnetLink::parse("not a magnet").is_err());
    }
}
