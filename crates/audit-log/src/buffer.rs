use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::entry::AuditRecord;
use crate::writer::BatchWriter;

/// Queue length that triggers an immediate flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;

/// Period of the background flush timer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Tuning knobs for [`LogBuffer`].
#[derive(Debug, Clone)]
pub struct BufferOptions {
    /// Flush as soon as this many records are queued.
    pub flush_threshold: usize,
    /// Flush whatever is queued at least this often.
    pub flush_interval: Duration,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

enum Command {
    Append(AuditRecord),
    Flush(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<usize>),
}

/// A cheap, cloneable handle for queueing [`AuditRecord`]s.
///
/// A single background task owns the queue and the writer, so appends,
/// threshold flushes, timer flushes and the shutdown flush are serialised
/// without any lock on the caller's side. [`append`](Self::append) never
/// blocks and may be called from plain threads as well as async tasks.
#[derive(Clone)]
pub struct LogBuffer {
    tx: mpsc::UnboundedSender<Command>,
}

impl LogBuffer {
    /// Spawn the buffer task and return a `(buffer, join_handle)` pair.
    ///
    /// Must be called from within a tokio runtime. The task flushes to
    /// `writer` when the queue reaches the threshold, on every timer tick,
    /// on [`flush`](Self::flush), and a final time on
    /// [`shutdown`](Self::shutdown) or when every handle has been dropped.
    pub fn start<W: BatchWriter>(writer: W, options: BufferOptions) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_buffer_loop(writer, rx, options));
        (Self { tx }, handle)
    }

    /// Queue a record.
    ///
    /// Never waits: records queue up behind an in-progress flush. Only once
    /// the task has shut down is a record dropped, with a warning.
    pub fn append(&self, record: AuditRecord) {
        if self.tx.send(Command::Append(record)).is_err() {
            tracing::warn!("audit buffer closed; audit record dropped");
        }
    }

    /// Flush everything appended before this call and return the number of
    /// records written. Returns 0 if the task is gone.
    pub async fn flush(&self) -> usize {
        self.request(Command::Flush).await
    }

    /// Drain every command already queued, run a final flush, and wait for
    /// the task to exit. Returns the number of records the final flush wrote.
    ///
    /// Records appended through other clones after this point are dropped.
    pub async fn shutdown(self, handle: JoinHandle<()>) -> usize {
        let written = self.request(Command::Shutdown).await;
        if let Err(err) = handle.await {
            tracing::error!(%err, "audit buffer task failed");
        }
        written
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<usize>) -> Command) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(make(reply_tx)).is_err() {
            tracing::warn!("audit buffer already stopped");
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }
}

/// State owned exclusively by the buffer task.
struct BufferState<W> {
    writer: W,
    queue: Vec<AuditRecord>,
    threshold: usize,
}

impl<W: BatchWriter> BufferState<W> {
    async fn push(&mut self, record: AuditRecord) {
        self.queue.push(record);
        if self.queue.len() >= self.threshold {
            self.flush("threshold").await;
        }
    }

    /// Drain the queue into the writer. On failure the batch is discarded;
    /// the next cycle starts clean.
    async fn flush(&mut self, trigger: &'static str) -> usize {
        if self.queue.is_empty() {
            return 0;
        }
        let batch = std::mem::replace(&mut self.queue, Vec::with_capacity(self.threshold));
        match self.writer.write_batch(&batch).await {
            Ok(written) => {
                tracing::debug!(trigger, written, "audit batch flushed");
                written
            }
            Err(err) => {
                tracing::error!(%err, trigger, dropped = batch.len(), "audit flush failed");
                0
            }
        }
    }
}

/// Core loop executed inside the buffer task.
async fn run_buffer_loop<W: BatchWriter>(
    writer: W,
    mut rx: mpsc::UnboundedReceiver<Command>,
    options: BufferOptions,
) {
    let threshold = options.flush_threshold.max(1);
    let mut state = BufferState {
        writer,
        queue: Vec::with_capacity(threshold),
        threshold,
    };

    let period = options.flush_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Append(record)) => state.push(record).await,
                Some(Command::Flush(reply)) => {
                    let written = state.flush("explicit").await;
                    let _ = reply.send(written);
                }
                Some(Command::Shutdown(reply)) => {
                    // Take whatever producers managed to queue before the
                    // shutdown request, then stop accepting more.
                    rx.close();
                    while let Ok(cmd) = rx.try_recv() {
                        match cmd {
                            Command::Append(record) => state.queue.push(record),
                            Command::Flush(r) | Command::Shutdown(r) => {
                                let _ = r.send(0);
                            }
                        }
                    }
                    let written = state.flush("shutdown").await;
                    tracing::debug!(written, "audit buffer shutting down");
                    let _ = reply.send(written);
                    return;
                }
                None => {
                    state.flush("shutdown").await;
                    tracing::debug!("all audit buffer handles dropped; shutting down");
                    return;
                }
            },
            _ = ticker.tick() => {
                state.flush("timer").await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use policy_engine::Verdict;

    use super::*;
    use crate::writer::{AuditWriteError, LogWriter};

    /// Records every batch it receives.
    #[derive(Clone, Default)]
    struct MemoryWriter {
        batches: Arc<Mutex<Vec<Vec<AuditRecord>>>>,
    }

    impl MemoryWriter {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    impl BatchWriter for MemoryWriter {
        async fn write_batch(&mut self, records: &[AuditRecord]) -> Result<usize, AuditWriteError> {
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(records.len())
        }
    }

    /// Fails every write.
    struct BrokenWriter;

    impl BatchWriter for BrokenWriter {
        async fn write_batch(&mut self, _: &[AuditRecord]) -> Result<usize, AuditWriteError> {
            Err(AuditWriteError::CreateDir(std::io::Error::other("read-only")))
        }
    }

    fn record(uid: u32) -> AuditRecord {
        AuditRecord::new(uid, None, Some("example.com".into()), Verdict::Allow)
    }

    fn options(threshold: usize) -> BufferOptions {
        BufferOptions {
            flush_threshold: threshold,
            flush_interval: Duration::from_secs(3600),
            ..BufferOptions::default()
        }
    }

    #[test]
    fn default_options() {
        let opts = BufferOptions::default();
        assert_eq!(opts.flush_threshold, 100);
        assert_eq!(opts.flush_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn threshold_triggers_exactly_one_flush() {
        let writer = MemoryWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), options(100));

        for uid in 0..100 {
            buffer.append(record(uid));
        }

        // Nothing left over for an explicit flush to write.
        assert_eq!(buffer.flush().await, 0);
        assert_eq!(writer.batch_sizes(), vec![100]);

        assert_eq!(buffer.shutdown(handle).await, 0);
        assert_eq!(writer.batch_sizes(), vec![100]);
    }

    #[tokio::test]
    async fn below_threshold_waits() {
        let writer = MemoryWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), options(100));

        for uid in 0..99 {
            buffer.append(record(uid));
        }
        tokio::task::yield_now().await;
        assert!(writer.batch_sizes().is_empty());

        assert_eq!(buffer.flush().await, 99);
        buffer.shutdown(handle).await;
        assert_eq!(writer.batch_sizes(), vec![99]);
    }

    #[tokio::test]
    async fn records_keep_append_order() {
        let writer = MemoryWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), options(3));

        for uid in 0..7 {
            buffer.append(record(uid));
        }
        buffer.shutdown(handle).await;

        let uids: Vec<u32> = writer
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|r| r.uid)
            .collect();
        assert_eq!(uids, (0..7).collect::<Vec<_>>());
        assert_eq!(writer.batch_sizes(), vec![3, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_small_queue() {
        let writer = MemoryWriter::default();
        let opts = BufferOptions {
            flush_interval: Duration::from_secs(5),
            ..BufferOptions::default()
        };
        let (buffer, handle) = LogBuffer::start(writer.clone(), opts);

        buffer.append(record(1));
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(writer.batch_sizes().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(writer.batch_sizes(), vec![1]);

        buffer.shutdown(handle).await;
        assert_eq!(writer.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn shutdown_flushes_residual_records() {
        let writer = MemoryWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), options(100));

        buffer.append(record(1));
        buffer.append(record(2));
        assert_eq!(buffer.shutdown(handle).await, 2);
        assert_eq!(writer.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn dropping_all_handles_flushes() {
        let writer = MemoryWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), options(100));

        let clone = buffer.clone();
        buffer.append(record(1));
        clone.append(record(2));
        drop(buffer);
        drop(clone);

        handle.await.unwrap();
        assert_eq!(writer.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn append_after_shutdown_is_dropped() {
        let writer = MemoryWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), options(100));
        let late = buffer.clone();

        buffer.shutdown(handle).await;
        late.append(record(9));
        assert_eq!(late.flush().await, 0);
        assert!(writer.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn write_failure_keeps_buffer_alive() {
        let (buffer, handle) = LogBuffer::start(BrokenWriter, options(2));

        buffer.append(record(1));
        buffer.append(record(2));
        buffer.append(record(3));
        assert_eq!(buffer.flush().await, 0);

        // Still accepting commands after failed flushes.
        buffer.append(record(4));
        assert_eq!(buffer.shutdown(handle).await, 0);
    }

    /// Takes a while per batch, like a slow disk.
    #[derive(Clone, Default)]
    struct SlowWriter {
        inner: MemoryWriter,
    }

    impl BatchWriter for SlowWriter {
        async fn write_batch(&mut self, records: &[AuditRecord]) -> Result<usize, AuditWriteError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.write_batch(records).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn burst_during_slow_flush_is_not_lost() {
        let writer = SlowWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), BufferOptions::default());

        // The first threshold flush keeps the task busy while the rest of
        // the burst piles up behind it.
        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for uid in 0..6000 {
                    buffer.append(record(uid));
                }
            })
        };
        producer.join().unwrap();

        buffer.shutdown(handle).await;
        let total: usize = writer.inner.batch_sizes().iter().sum();
        assert_eq!(total, 6000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_appends_from_threads_are_not_lost() {
        let writer = MemoryWriter::default();
        let (buffer, handle) = LogBuffer::start(writer.clone(), options(50));

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buffer.append(record(t * 1000 + i));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        buffer.shutdown(handle).await;
        let total: usize = writer.batch_sizes().iter().sum();
        assert_eq!(total, 1000);
    }

    #[tokio::test]
    async fn end_to_end_with_file_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.jsonl");
        let (buffer, handle) = LogBuffer::start(LogWriter::new(&path), options(100));

        buffer.append(record(501));
        buffer.append(AuditRecord::new(502, None, None, Verdict::Deny));
        buffer.shutdown(handle).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let records: Vec<AuditRecord> = contents
            .lines()
            .map(|l| AuditRecord::from_json_line(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].verdict, Verdict::Deny);
    }
}
