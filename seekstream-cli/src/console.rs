//! Terminal front end

use std::io::{self, BufRead, Write};
use std::path::Path;

use async_trait::async_trait;
use seekstream_core::streaming::{DownloadStats, FileSelector, SelectionError, format_size};
use seekstream_core::torrent::TorrentFile;
use seekstream_core::ui::StreamUi;

/// Prints session events to stdout and reads the file choice from stdin.
#[derive(Debug, Default)]
pub struct ConsoleUi;

impl ConsoleUi {
    fn line(&self, text: &str) {
        println!("{text}");
    }
}

#[async_trait]
impl StreamUi for ConsoleUi {
    fn show_fetching_metadata(&self) {
        self.line("Fetching metadata...");
    }

    fn show_metadata(&self, name: &str) {
        self.line(&format!("Torrent: {name}"));
    }

    fn list_files(&self, files: &[TorrentFile]) {
        for file in files {
            self.line(&format!("[{}] {} ({})", file.index, file.path, format_size(file.size)));
        }
    }

    async fn prompt_file_choice(&self, _files: &[TorrentFile]) -> Result<FileSelector, SelectionError> {
        let input = tokio::task::spawn_blocking(|| {
            print!("Select file index to stream: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok::<_, io::Error>(line)
        })
        .await;

        match input {
            Ok(Ok(line)) => line
                .trim()
                .parse::<i64>()
                .map(FileSelector::Index)
                .map_err(|_| SelectionError::InvalidSelector),
            _ => Err(SelectionError::InvalidSelector),
        }
    }

    fn show_selected_file(&self, index: usize, relative_path: &str, absolute_path: &Path) {
        self.line(&format!("Selected [{index}] {relative_path}"));
        self.line(&format!("Streaming from {}", absolute_path.display()));
    }

    fn buffering_header(&self) {
        self.line("Buffering header");
    }

    fn show_launching_player(&self) {
        self.line("Launching player");
    }

    fn show_progress(&self, stats: &DownloadStats) {
        print!("\r{}", progress_line(stats));
        let _ = io::stdout().flush();
    }

    fn report_error(&self, message: &str) {
        eprintln!("\nError: {message}");
    }

    fn finish(&self) {
        self.line("\nDone");
    }
}

fn progress_line(stats: &DownloadStats) -> String {
    format!(
        "Downloaded {} / {} ({:.1}%), rate {}/s",
        format_size(stats.downloaded),
        format_size(stats.total),
        stats.percent,
        format_size(stats.rate)
    )
}
