//! File-based log source.
//!
//! Follows a single text file the way `tail -F` does, implemented as an async
//! poll loop:
//!
//! - a file that does not exist yet is retried every poll tick
//! - truncation (size below our offset) reseeks to the start
//! - rotation (inode change on Unix) reopens the new file from the start
//! - only newline-terminated lines are emitted; a partial last line waits
//!   for its newline on a later tick
//! - lines longer than 64 KiB are dropped
//!
//! Polling is used unconditionally; inotify is unreliable on the network and
//! container filesystems these logs often live on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{LogLine, CHANNEL_CAPACITY};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_LINE_LENGTH: usize = 64 * 1024;
/// Batch bound per poll tick so one busy file cannot monopolize the task.
const MAX_LINES_PER_READ: usize = 1000;

pub struct FileTailer {
    path: PathBuf,
    shutdown: watch::Receiver<bool>,
}

impl FileTailer {
    pub fn new(path: impl Into<PathBuf>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            path: path.into(),
            shutdown,
        }
    }

    /// Spawn the tail task and return its line channel. The channel closes
    /// when the source stops.
    pub fn start(self) -> mpsc::Receiver<LogLine> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let FileTailer { path, mut shutdown } = self;

        info!(path = %path.display(), "starting file tailer (waiting if not present)");

        tokio::spawn(async move {
            let source = path.display().to_string();
            let mut offset: u64 = 0;
            let mut inode: Option<u64> = None;
            let mut seen_missing = false;

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!(path = %path.display(), "file tailer stopping");
                            return;
                        }
                    }
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }

                let meta = match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta,
                    Err(_) => {
                        // Not present yet (or rotated away); keep retrying.
                        if !seen_missing {
                            debug!(path = %path.display(), "file not present, retrying");
                            seen_missing = true;
                        }
                        offset = 0;
                        inode = None;
                        continue;
                    }
                };
                seen_missing = false;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::MetadataExt;
                    let current_inode = meta.ino();
                    if let Some(last) = inode {
                        if last != current_inode {
                            info!(path = %path.display(), "rotation detected, reopening");
                            offset = 0;
                        }
                    }
                    inode = Some(current_inode);
                }

                if meta.len() < offset {
                    warn!(path = %path.display(), "truncation detected, reseeking");
                    offset = 0;
                }

                match read_new_lines(&path, offset).await {
                    Ok((lines, new_offset)) => {
                        offset = new_offset;
                        for content in lines {
                            if tx.send(LogLine::now(&source, content)).await.is_err() {
                                // Pipeline is gone; nothing left to do.
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "read error, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        rx
    }
}

/// Read complete lines from `offset`, returning them with the new offset.
/// A trailing line without its newline is left for the next call. Oversized
/// lines are consumed but not returned.
async fn read_new_lines(path: &Path, offset: u64) -> std::io::Result<(Vec<String>, u64)> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    reader.seek(std::io::SeekFrom::Start(offset)).await?;

    let mut lines = Vec::new();
    let mut current_offset = offset;
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = reader.read_line(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }

        if !buffer.ends_with('\n') {
            // Partial write in progress; pick it up once it completes.
            break;
        }

        current_offset += bytes_read as u64;

        if buffer.len() > MAX_LINE_LENGTH {
            warn!(path = %path.display(), length = buffer.len(), "dropping oversized line");
            continue;
        }

        let line = buffer.trim_end_matches(['\n', '\r']);
        if !line.is_empty() {
            lines.push(line.to_string());
        }

        if lines.len() >= MAX_LINES_PER_READ {
            break;
        }
    }

    Ok((lines, current_offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_reads_complete_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "line 1").unwrap();
        writeln!(file, "line 2").unwrap();
        file.flush().unwrap();

        let (lines, offset) = read_new_lines(file.path(), 0).await.unwrap();
        assert_eq!(lines, vec!["line 1", "line 2"]);
        assert_eq!(offset, 14);
    }

    #[tokio::test]
    async fn test_resumes_from_offset() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "old").unwrap();
        let first = 4u64;
        writeln!(file, "new 1").unwrap();
        writeln!(file, "new 2").unwrap();
        file.flush().unwrap();

        let (lines, _) = read_new_lines(file.path(), first).await.unwrap();
        assert_eq!(lines, vec!["new 1", "new 2"]);
    }

    #[tokio::test]
    async fn test_partial_line_held_back() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "complete").unwrap();
        write!(file, "partial").unwrap();
        file.flush().unwrap();

        let (lines, offset) = read_new_lines(file.path(), 0).await.unwrap();
        assert_eq!(lines, vec!["complete"]);

        // Complete the line; the next read picks it up from the offset.
        writeln!(file, " now done").unwrap();
        file.flush().unwrap();

        let (lines, _) = read_new_lines(file.path(), offset).await.unwrap();
        assert_eq!(lines, vec!["partial now done"]);
    }

    #[tokio::test]
    async fn test_skips_empty_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "b").unwrap();
        file.flush().unwrap();

        let (lines, _) = read_new_lines(file.path(), 0).await.unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let (lines, offset) = read_new_lines(file.path(), 0).await.unwrap();
        assert!(lines.is_empty());
        assert_eq!(offset, 0);
    }

    #[tokio::test]
    async fn test_crlf_stripped() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "windows line\r\n").unwrap();
        file.flush().unwrap();

        let (lines, _) = read_new_lines(file.path(), 0).await.unwrap();
        assert_eq!(lines, vec!["windows line"]);
    }

    #[tokio::test]
    async fn test_oversized_line_dropped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", "x".repeat(MAX_LINE_LENGTH + 10)).unwrap();
        writeln!(file, "normal").unwrap();
        file.flush().unwrap();

        let (lines, _) = read_new_lines(file.path(), 0).await.unwrap();
        assert_eq!(lines, vec!["normal"]);
    }

    #[tokio::test]
    async fn test_tailer_emits_lines_and_stops() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "host sshd[1]: test line").unwrap();
        file.flush().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tailer = FileTailer::new(file.path(), shutdown_rx);
        let mut rx = tailer.start();

        let line = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("tailer should emit within the poll interval")
            .expect("channel open");
        assert_eq!(line.content, "host sshd[1]: test line");
        assert_eq!(line.source, file.path().display().to_string());
        assert!(line.timestamp > 0);

        shutdown_tx.send(true).unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("channel should close after shutdown");
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_tailer_survives_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.log");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tailer = FileTailer::new(&path, shutdown_rx);
        let mut rx = tailer.start();

        // Create the file after the tailer is already polling.
        tokio::time::sleep(Duration::from_millis(700)).await;
        std::fs::write(&path, "appeared\n").unwrap();

        let line = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("tailer should pick up the late file")
            .expect("channel open");
        assert_eq!(line.content, "appeared");

        shutdown_tx.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_tailer_handles_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc.log");
        std::fs::write(&path, "first entry long enough\n").unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tailer = FileTailer::new(&path, shutdown_rx);
        let mut rx = tailer.start();

        let line = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.content, "first entry long enough");

        // Truncate and write a shorter line; the tailer must reseek.
        std::fs::write(&path, "after truncate\n").unwrap();

        let line = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("tailer should recover from truncation")
            .unwrap();
        assert_eq!(line.content, "after truncate");

        shutdown_tx.send(true).unwrap();
    }
}
