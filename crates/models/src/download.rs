//! Streaming HTTP download of model files.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::ModelError;

/// Read buffer size for streamed downloads (1 MiB).
const CHUNK_SIZE: usize = 1024 * 1024;

/// Fetches a URL into a local file.
pub trait Downloader {
    /// Download `url` to `dest`, returning the number of bytes written.
    ///
    /// `label` names the file in progress output. On error `dest` may hold
    /// a partial file that the caller removes.
    fn download(&self, url: &str, dest: &Path, label: &str) -> Result<u64, ModelError>;
}

/// Calculate download progress as a percentage (0.0–100.0).
///
/// Returns `None` if the total size is unknown or zero.
pub fn download_progress_percent(downloaded: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(t) if t > 0 => {
            let pct = (downloaded as f64 / t as f64) * 100.0;
            Some(pct.min(100.0))
        }
        _ => None,
    }
}

/// [`Downloader`] backed by a blocking `reqwest` client.
///
/// Each transfer runs on its own worker thread which the caller joins, with
/// an `indicatif` progress bar on the terminal.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    /// Hide the progress bar (tests, non-interactive runs).
    pub quiet: bool,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path, label: &str) -> Result<u64, ModelError> {
        let url = url.to_string();
        let dest = dest.to_path_buf();
        let label = label.to_string();
        let quiet = self.quiet;

        let worker = std::thread::spawn(move || fetch_to_file(&url, &dest, &label, quiet));
        worker
            .join()
            .map_err(|_| ModelError::Download("download worker panicked".to_string()))?
    }
}

fn fetch_to_file(url: &str, dest: &Path, label: &str, quiet: bool) -> Result<u64, ModelError> {
    tracing::info!(url, dest = %dest.display(), "Starting download");

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelError::Download(e.to_string()))?;
    let total = response.content_length();

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        progress_bar(total, label)
    };

    let file = File::create(dest).map_err(ModelError::io(dest))?;
    let mut writer = BufWriter::new(file);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut downloaded = 0u64;

    loop {
        let n = response
            .read(&mut buf)
            .map_err(|e| ModelError::Download(e.to_string()))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(ModelError::io(dest))?;
        downloaded += n as u64;
        progress.set_position(downloaded);
    }
    writer.flush().map_err(ModelError::io(dest))?;
    progress.finish_and_clear();

    tracing::info!(
        url,
        bytes = downloaded,
        percent = download_progress_percent(downloaded, total),
        "Download finished",
    );
    Ok(downloaded)
}

fn progress_bar(total: Option<u64>, label: &str) -> ProgressBar {
    let bar = match total {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    let template = if total.is_some() {
        "{msg} [{bar:40}] {bytes}/{total_bytes} ({percent}%)"
    } else {
        "{msg} {spinner} {bytes}"
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(format!("Downloading {label}"));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- download_progress_percent --------------------------------------------

    #[test]
    fn progress_known_total() {
        let pct = download_progress_percent(50, Some(100));
        assert!((pct.unwrap() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_unknown_total() {
        assert!(download_progress_percent(50, None).is_none());
        assert!(download_progress_percent(50, Some(0)).is_none());
    }

    #[test]
    fn progress_capped_at_hundred() {
        let pct = download_progress_percent(150, Some(100)).unwrap();
        assert!((pct - 100.0).abs() < f64::EPSILON);
    }

    // -- HttpDownloader -------------------------------------------------------

    #[test]
    fn unreachable_host_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader { quiet: true };
        let result = downloader.download(
            "http://127.0.0.1:9/model.bin",
            &dir.path().join("out"),
            "model.bin",
        );
        assert!(matches!(result, Err(ModelError::Download(_))));
    }
}
