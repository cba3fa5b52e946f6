use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use audit_log::{AuditRecord, LogTailer};

/// Render one log line for display. Lines that are not audit records are
/// shown verbatim.
pub fn render_line(line: &str) -> String {
    match AuditRecord::from_json_line(line) {
        Ok(record) => format!(
            "{}  uid={:<6} {:<20} {:<40} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.uid,
            record.process_name.as_deref().unwrap_or("-"),
            record.remote_host.as_deref().unwrap_or("-"),
            record.verdict.as_str().to_uppercase(),
        ),
        Err(_) => line.to_string(),
    }
}

/// Poll `tailer` every `interval` and print new lines to `output` until
/// shutdown. The retained history is printed once on the first poll.
///
/// Polls run one at a time on this task; a slow poll delays the next tick
/// rather than overlapping it.
pub async fn run_watch<W>(
    tailer: &mut LogTailer,
    interval: Duration,
    mut output: W,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(path = %tailer.path().display(), "watching audit log");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let added = match tailer.poll().await {
                    Ok(added) => added,
                    Err(err) => {
                        warn!(%err, "audit log poll failed");
                        continue;
                    }
                };
                if added == 0 {
                    continue;
                }
                let lines = tailer.lines();
                let skip = lines.len().saturating_sub(added);
                for line in lines.iter().skip(skip) {
                    output
                        .write_all(format!("{}\n", render_line(line)).as_bytes())
                        .await
                        .context("failed to write to output")?;
                }
                output.flush().await.context("failed to flush output")?;
            }
            _ = shutdown_rx.recv() => {
                info!("watch received shutdown signal");
                return Ok(());
            }
        }
    }
}
