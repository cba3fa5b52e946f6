use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::entry::AuditRecord;

/// Permissions for the directory holding the shared log.
pub const LOG_DIR_MODE: u32 = 0o700;

/// Permissions for the shared log file, applied when it is first created.
pub const LOG_FILE_MODE: u32 = 0o600;

/// Errors that can occur during audit log I/O.
#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("failed to create log directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open audit log file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to write to audit log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush audit log: {0}")]
    Flush(std::io::Error),
}

/// Destination for a drained batch of records.
///
/// [`LogBuffer`](crate::LogBuffer) hands every flush to one of these.
/// Implementations return how many records were actually persisted.
pub trait BatchWriter: Send + 'static {
    fn write_batch(
        &mut self,
        records: &[AuditRecord],
    ) -> impl Future<Output = Result<usize, AuditWriteError>> + Send;
}

/// Appends batches of [`AuditRecord`]s to a shared JSON-lines file.
///
/// The file is opened per batch rather than held open, so the writer never
/// pins a stale handle if the file is removed between flushes. Nothing
/// touches the disk until the first non-empty batch.
#[derive(Debug, Clone)]
pub struct LogWriter {
    path: PathBuf,
}

impl LogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file this writer appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialise `records` and append them to the file in a single write.
    ///
    /// A record that fails to serialise is skipped with a warning; the rest
    /// of the batch is still written. The parent directory is created with
    /// [`LOG_DIR_MODE`] and the file with [`LOG_FILE_MODE`] if missing.
    pub async fn append(&self, records: &[AuditRecord]) -> Result<usize, AuditWriteError> {
        let (payload, written) = encode_batch(records);
        if written == 0 {
            return Ok(0);
        }

        self.ensure_parent_dir().await?;

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(LOG_FILE_MODE);

        let mut file = options
            .open(&self.path)
            .await
            .map_err(AuditWriteError::OpenFile)?;

        file.write_all(&payload)
            .await
            .map_err(AuditWriteError::Write)?;
        file.flush().await.map_err(AuditWriteError::Flush)?;

        Ok(written)
    }

    async fn ensure_parent_dir(&self) -> Result<(), AuditWriteError> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() || tokio::fs::metadata(parent).await.is_ok() {
            return Ok(());
        }

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(LOG_DIR_MODE);

        builder
            .create(parent)
            .await
            .map_err(AuditWriteError::CreateDir)
    }
}

impl BatchWriter for LogWriter {
    fn write_batch(
        &mut self,
        records: &[AuditRecord],
    ) -> impl Future<Output = Result<usize, AuditWriteError>> + Send {
        self.append(records)
    }
}

/// Concatenate the JSON lines for `records`, dropping any that fail to
/// encode. Returns the payload and the number of records it contains.
fn encode_batch(records: &[AuditRecord]) -> (Vec<u8>, usize) {
    let mut payload = Vec::with_capacity(records.len() * 128);
    let mut written = 0;
    for record in records {
        match record.to_json_line() {
            Ok(line) => {
                payload.extend_from_slice(&line);
                written += 1;
            }
            Err(err) => {
                tracing::warn!(%err, uid = record.uid, "dropping unserializable audit record");
            }
        }
    }
    (payload, written)
}
