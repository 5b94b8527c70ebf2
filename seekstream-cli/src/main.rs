//! Seekstream CLI - Stream a torrent file while it downloads

mod commands;
mod console;

use std::path::Path;

use clap::Parser;
use seekstream_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "seekstream")]
#[command(about = "Stream media out of a torrent while it downloads")]
struct Cli {
    #[command(flatten)]
    stream: commands::StreamArgs,

    /// Console log level (the log file always records everything)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), Some(Path::new("logs")))?;

    commands::stream(cli.stream).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_full_command_line() {
        let cli = Cli::try_parse_from([
            "seekstream",
            "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a",
            "-o",
            "/tmp/out",
            "--file",
            "movie",
            "--serve",
            "--port",
            "8080",
            "--no-player",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.stream.save_path, Path::new("/tmp/out"));
        assert_eq!(cli.stream.file.as_deref(), Some("movie"));
        assert!(cli.stream.serve);
        assert_eq!(cli.stream.port, Some(8080));
        assert!(cli.stream.no_player);
        assert_eq!(cli.log_level, CliLogLevel::Debug);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["seekstream", "magnet:?xt=urn:btih:abc"]).unwrap();

        assert_eq!(cli.stream.save_path, Path::new("."));
        assert!(cli.stream.file.is_none());
        assert!(!cli.stream.serve);
        assert!(cli.stream.simulate_dir.is_none());
        assert_eq!(cli.log_level, CliLogLevel::Warn);
    }

    #[test]
    fn test_magnet_is_required() {
        assert!(Cli::try_parse_from(["seekstream"]).is_err());
    }
}
