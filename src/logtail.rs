//! Tail view over the append-only `<port>.log` files written by the session
//! manager.
//!
//! Every request re-reads the whole file and slices from its current end, so
//! `offset` is relative to EOF at read time. A file that grows between two
//! polls shifts a non-zero-offset window; this is kept as observed behaviour
//! rather than replaced with a stable cursor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncReadExt;

pub const DEFAULT_LINES: i64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogWindow {
    pub port: u16,
    pub content: String,
    pub total_lines: usize,
    pub returned_lines: usize,
    pub file_size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl LogWindow {
    fn empty(port: u16) -> Self {
        Self {
            port,
            content: String::new(),
            total_lines: 0,
            returned_lines: 0,
            file_size: 0,
            last_modified: None,
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to read log {}: {source}", .path.display())]
pub struct LogTailError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Half-open `[start, end)` range of the last `lines` lines, skipping the
/// final `offset` lines. Out-of-range inputs are clamped into `0..=total`.
pub fn window_bounds(total: usize, lines: i64, offset: i64) -> (usize, usize) {
    let clamp = |n: i64| usize::try_from(n.max(0)).unwrap_or(usize::MAX).min(total);
    let lines = clamp(lines);
    let offset = clamp(offset);

    let end = total - offset;
    let start = end.saturating_sub(lines);
    (start, end)
}

pub struct LogTail {
    logs_dir: PathBuf,
}

impl LogTail {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    pub fn log_path(&self, port: u16) -> PathBuf {
        self.logs_dir.join(format!("{}.log", port))
    }

    /// Read a window from the agent's log. A missing file is an empty window.
    ///
    /// `file_size` and `last_modified` come from the same open handle as the
    /// content, but the read is not isolated from a concurrent appender.
    pub async fn read_window(&self, port: u16, lines: i64, offset: i64) -> Result<LogWindow, LogTailError> {
        let path = self.log_path(port);
        let (bytes, modified) = match read_whole(&path).await {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LogWindow::empty(port)),
            Err(source) => return Err(LogTailError { path, source }),
        };

        // A writer may have flushed half of a multi-byte character
        let text = String::from_utf8_lossy(&bytes);
        let all_lines: Vec<&str> = text.split_terminator('\n').collect();
        let (start, end) = window_bounds(all_lines.len(), lines, offset);
        let selected = &all_lines[start..end];

        Ok(LogWindow {
            port,
            content: selected.join("\n"),
            total_lines: all_lines.len(),
            returned_lines: selected.len(),
            file_size: bytes.len() as u64,
            last_modified: modified.map(DateTime::<Utc>::from),
        })
    }
}

async fn read_whole(path: &Path) -> std::io::Result<(Vec<u8>, Option<std::time::SystemTime>)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await?;
    let modified = file.metadata().await?.modified().ok();
    Ok((bytes, modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {}\n", i)).collect()
    }

    #[test]
    fn test_window_bounds_clamps() {
        assert_eq!(window_bounds(10, 3, 0), (7, 10));
        assert_eq!(window_bounds(10, 3, 2), (5, 8));
        assert_eq!(window_bounds(10, 50, 0), (0, 10));
        assert_eq!(window_bounds(10, 3, 10), (0, 0));
        assert_eq!(window_bounds(10, 3, 99), (0, 0));
        assert_eq!(window_bounds(10, -5, 0), (10, 10));
        assert_eq!(window_bounds(10, 3, -4), (7, 10));
        assert_eq!(window_bounds(0, 200, 0), (0, 0));
        assert_eq!(window_bounds(5, i64::MAX, i64::MIN), (0, 5));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_window() {
        let temp = TempDir::new().unwrap();
        let tail = LogTail::new(temp.path());

        let window = tail.read_window(7681, DEFAULT_LINES, 0).await.unwrap();
        assert_eq!(window, LogWindow::empty(7681));

        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["content"], "");
        assert_eq!(json["totalLines"], 0);
        assert_eq!(json["returnedLines"], 0);
        assert_eq!(json["fileSize"], 0);
        assert!(json["lastModified"].is_null());
    }

    #[tokio::test]
    async fn test_returns_last_lines_in_order() {
        let temp = TempDir::new().unwrap();
        let body = numbered(10);
        std::fs::write(temp.path().join("7681.log"), &body).unwrap();
        let tail = LogTail::new(temp.path());

        let window = tail.read_window(7681, 3, 0).await.unwrap();
        assert_eq!(window.content, "line 8\nline 9\nline 10");
        assert_eq!(window.total_lines, 10);
        assert_eq!(window.returned_lines, 3);
        assert_eq!(window.file_size, body.len() as u64);
        assert!(window.last_modified.is_some());

        let window = tail.read_window(7681, 50, 0).await.unwrap();
        assert_eq!(window.returned_lines, 10);
        assert!(window.content.starts_with("line 1\n"));
    }

    #[tokio::test]
    async fn test_offset_pages_backwards() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("7681.log"), numbered(10)).unwrap();
        let tail = LogTail::new(temp.path());

        let window = tail.read_window(7681, 2, 3).await.unwrap();
        assert_eq!(window.content, "line 6\nline 7");

        let window = tail.read_window(7681, 2, 10).await.unwrap();
        assert_eq!(window.content, "");
        assert_eq!(window.returned_lines, 0);
        assert_eq!(window.total_lines, 10);

        let window = tail.read_window(7681, 2, 50).await.unwrap();
        assert_eq!(window.content, "");
        assert_eq!(window.returned_lines, 0);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_and_bad_utf8() {
        let temp = TempDir::new().unwrap();
        let mut bytes = b"first\nsecond\npartial \xe2\x9c".to_vec();
        std::fs::write(temp.path().join("7681.log"), &bytes).unwrap();
        let tail = LogTail::new(temp.path());

        let window = tail.read_window(7681, 1, 0).await.unwrap();
        assert_eq!(window.total_lines, 3);
        assert!(window.content.starts_with("partial "));

        bytes.truncate(0);
        std::fs::write(temp.path().join("7681.log"), &bytes).unwrap();
        let window = tail.read_window(7681, 1, 0).await.unwrap();
        assert_eq!(window.total_lines, 0);
        assert_eq!(window.content, "");
        assert!(window.last_modified.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_notfound_error_propagates() {
        let temp = TempDir::new().unwrap();
        // A directory where the log file should be cannot be read as a file
        std::fs::create_dir(temp.path().join("7681.log")).unwrap();
        let tail = LogTail::new(temp.path());

        assert!(tail.read_window(7681, 10, 0).await.is_err());
    }
}
