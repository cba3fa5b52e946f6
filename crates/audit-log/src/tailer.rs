use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::entry::AuditRecord;

/// Number of lines a [`LogTailer`] retains by default.
pub const DEFAULT_HISTORY_LINES: usize = 500;

/// Errors that can occur while tailing the audit log.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("failed to open audit log for reading: {0}")]
    Open(std::io::Error),

    #[error("failed to read audit log: {0}")]
    Read(std::io::Error),
}

/// Incrementally follows the shared audit log, keeping a bounded window of
/// the most recent lines.
///
/// Only complete, newline-terminated lines are consumed. A partially written
/// final line stays on disk until a later poll sees its terminator, so a
/// reader racing the writer never records half a record.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    capacity: usize,
    recent: VecDeque<String>,
}

impl LogTailer {
    /// Tail `path`, keeping the last [`DEFAULT_HISTORY_LINES`] lines.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_HISTORY_LINES)
    }

    /// Tail `path`, keeping at most `capacity` lines.
    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            path: path.into(),
            offset: 0,
            capacity,
            recent: VecDeque::with_capacity(capacity),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of the file consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> &VecDeque<String> {
        &self.recent
    }

    /// Retained lines decoded as records. Lines that do not parse are skipped.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.recent
            .iter()
            .filter_map(|line| AuditRecord::from_json_line(line).ok())
            .collect()
    }

    /// Read whatever was appended since the last poll.
    ///
    /// Returns the number of lines added to the window. A missing file is
    /// not an error. If the new complete lines are not valid UTF-8 they are
    /// left unconsumed, and every later poll stops at the same offset.
    pub async fn poll(&mut self) -> Result<usize, TailError> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(TailError::Open(err)),
        };

        let len = file.metadata().await.map_err(TailError::Read)?.len();
        if len < self.offset {
            tracing::info!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "audit log shrank; restarting from the beginning"
            );
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(0);
        }

        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(TailError::Read)?;
        let mut buf = Vec::with_capacity(usize::try_from(len - self.offset).unwrap_or(0));
        file.read_to_end(&mut buf).await.map_err(TailError::Read)?;

        Ok(self.ingest(&buf))
    }

    /// Consume the complete lines at the start of `buf`, which must begin at
    /// the current offset.
    fn ingest(&mut self, buf: &[u8]) -> usize {
        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return 0;
        };
        let complete = &buf[..=last_newline];

        let text = match std::str::from_utf8(complete) {
            Ok(text) => text,
            Err(err) => {
                // Only complete lines reach this point, so the bad bytes will
                // still be there next time: the tailer cannot move past them.
                tracing::warn!(
                    %err,
                    offset = self.offset,
                    bytes = complete.len(),
                    "audit log contains a line that is not valid UTF-8; tailer is stuck at this offset"
                );
                return 0;
            }
        };

        let mut added = 0;
        for line in text.split('\n').filter(|l| !l.is_empty()) {
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(line.to_string());
            added += 1;
        }

        self.offset += complete.len() as u64;
        added
    }
}
