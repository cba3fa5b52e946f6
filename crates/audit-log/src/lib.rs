//! Buffered, append-only JSON-lines audit trail of flow verdicts.
//!
//! The writing side batches [`AuditRecord`]s in a [`LogBuffer`] and appends
//! them through a [`LogWriter`] to a shared file created with owner-only
//! permissions. The reading side follows that file with a [`LogTailer`],
//! which keeps a bounded window of the most recent lines. The two sides
//! share nothing but the file.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use audit_log::{AuditRecord, BufferOptions, LogBuffer, LogTailer, LogWriter};
//! use policy_engine::Verdict;
//!
//! # async fn example() {
//! let path = audit_log::default_log_path().expect("no data dir");
//! let (buffer, handle) = LogBuffer::start(LogWriter::new(&path), BufferOptions::default());
//!
//! buffer.append(AuditRecord::new(501, Some("curl".into()), Some("example.com".into()), Verdict::Allow));
//! buffer.shutdown(handle).await;
//!
//! let mut tailer = LogTailer::new(&path);
//! tailer.poll().await.unwrap();
//! # }
//! ```

pub mod buffer;
pub mod entry;
pub mod paths;
pub mod tailer;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use buffer::{BufferOptions, LogBuffer};
pub use entry::AuditRecord;
pub use paths::default_log_path;
pub use tailer::{LogTailer, TailError};
pub use writer::{AuditWriteError, BatchWriter, LogWriter};
