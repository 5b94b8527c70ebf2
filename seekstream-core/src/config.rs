//! Centralized configuration for Seekstream.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Seekstream components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SeekstreamConfig {
    pub streaming: StreamingConfig,
    pub server: ServerConfig,
    pub simulation: SimulationConfig,
}

/// Piece scheduling and range serving configuration.
///
/// Controls how long waits may block, how deadlines are spaced across a
/// stream window, and how large each served body chunk is.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Upper bound for the backend to produce torrent metadata
    pub metadata_timeout: Duration,
    /// Upper bound for the first piece of a selected file to arrive
    pub header_timeout: Duration,
    /// Upper bound for any other piece a reader blocks on
    pub piece_timeout: Duration,
    /// Deadline spacing between consecutive pieces of the remainder schedule
    pub deadline_interval_ms: u32,
    /// Cadence at which the controller samples download progress
    pub progress_interval: Duration,
    /// Size of each body chunk read from disk when serving a range
    pub chunk_size: usize,
    /// Pieces past the schedule anchor a read may wait on before re-anchoring
    pub seek_readahead_pieces: u32,
    /// Directory under the save path holding per-torrent resume state
    pub resume_dir_name: &'static str,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(120),
            header_timeout: Duration::from_secs(300),
            piece_timeout: Duration::from_secs(60),
            deadline_interval_ms: 1000,
            progress_interval: Duration::from_secs(1),
            chunk_size: 8 * 1024, // 8 KiB
            seek_readahead_pieces: 8,
            resume_dir_name: ".resume",
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port to bind
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Simulated backend configuration for testing and development.
///
/// Controls how quickly the in-process swarm produces metadata and pieces.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Delay before metadata becomes available after a magnet is added
    pub metadata_delay: Duration,
    /// Interval between piece completion rounds
    pub piece_interval: Duration,
    /// Pieces completed per round
    pub pieces_per_tick: usize,
    /// Whether pieces arrive on their own or only when driven explicitly
    pub auto_download: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            metadata_delay: Duration::from_millis(500),
            piece_interval: Duration::from_millis(100),
            pieces_per_tick: 2,
            auto_download: true,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    ///
    /// Metadata is immediate and no piece arrives until a test completes it.
    pub fn deterministic_testing() -> Self {
        Self {
            metadata_delay: Duration::ZERO,
            piece_interval: Duration::from_millis(5),
            pieces_per_tick: 1,
            auto_download: false,
        }
    }
}

impl SeekstreamConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seconds) = env_parse::<u64>("SEEKSTREAM_METADATA_TIMEOUT") {
            config.streaming.metadata_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_parse::<u64>("SEEKSTREAM_HEADER_TIMEOUT") {
            config.streaming.header_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_parse::<u64>("SEEKSTREAM_PIECE_TIMEOUT") {
            config.streaming.piece_timeout = Duration::from_secs(seconds);
        }

        if let Some(size) = env_parse::<usize>("SEEKSTREAM_CHUNK_SIZE") {
            if size > 0 {
                config.streaming.chunk_size = size;
            }
        }

        if let Ok(host) = std::env::var("SEEKSTREAM_HOST") {
            config.server.host = host;
        }

        if let Some(port) = env_parse::<u16>("SEEKSTREAM_PORT") {
            config.server.port = port;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            streaming: StreamingConfig {
                metadata_timeout: Duration::from_secs(2),
                header_timeout: Duration::from_secs(2),
                piece_timeout: Duration::from_secs(2),
                progress_interval: Duration::from_millis(10),
                ..Default::default()
            },
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SeekstreamConfig::default();

        assert_eq!(config.streaming.chunk_size, 8192);
        assert_eq!(config.streaming.deadline_interval_ms, 1000);
        assert_eq!(config.streaming.progress_interval, Duration::from_secs(1));
        assert_eq!(config.streaming.resume_dir_name, ".resume");
        assert_eq!(config.server.port, 3000);
        assert!(config.simulation.auto_download);
    }

    #[test]
    fn test_testing_preset() {
        let config = SeekstreamConfig::for_testing();
        assert!(!config.simulation.auto_download);
        assert_eq!(config.simulation.metadata_delay, Duration::ZERO);
        assert!(config.streaming.piece_timeout <= Duration::from_secs(2));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("SEEKSTREAM_PIECE_TIMEOUT", "7");
            std::env::set_var("SEEKSTREAM_CHUNK_SIZE", "4096");
            std::env::set_var("SEEKSTREAM_PORT", "8088");
        }

        let config = SeekstreamConfig::from_env();

        assert_eq!(config.streaming.piece_timeout, Duration::from_secs(7));
        assert_eq!(config.streaming.chunk_size, 4096);
        assert_eq!(config.server.port, 8088);

        // Cleanup
        unsafe {
            std::env::remove_var("SEEKSTREAM_PIECE_TIMEOUT");
            std::env::remove_var("SEEKSTREAM_CHUNK_SIZE");
            std::env::remove_var("SEEKSTREAM_PORT");
        }
    }
}
