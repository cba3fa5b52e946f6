use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use audit_log::{AuditRecord, LogBuffer};
use policy_engine::{PolicyEngine, Verdict, UNKNOWN_UID};

/// One flow as reported by the interception layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEvent {
    /// Owning uid; absent when identity extraction failed.
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub process_name: Option<String>,
}

/// The answer written back for each flow.
#[derive(Debug, Serialize)]
struct VerdictReply {
    verdict: Verdict,
}

/// Evaluates flows and records every decision.
///
/// The verdict never depends on the audit path: appending to the buffer is
/// non-blocking and its failures are only logged.
pub struct FlowFilter {
    engine: Arc<PolicyEngine>,
    audit: LogBuffer,
}

impl FlowFilter {
    pub fn new(engine: Arc<PolicyEngine>, audit: LogBuffer) -> Self {
        Self { engine, audit }
    }

    /// Evaluate `flow` once, queue its audit record, and return the verdict.
    pub fn handle_flow(&self, flow: &FlowEvent) -> Verdict {
        let uid = flow.uid.unwrap_or(UNKNOWN_UID);
        let decision = self.engine.decide(uid, flow.hostname.as_deref());

        debug!(
            uid,
            process = flow.process_name.as_deref().unwrap_or("unknown"),
            host = flow.hostname.as_deref().unwrap_or("unknown"),
            verdict = %decision.verdict,
            reason = %decision.reason,
            "flow decision"
        );

        self.audit.append(AuditRecord::new(
            uid,
            flow.process_name.clone(),
            flow.hostname.clone(),
            decision.verdict,
        ));

        decision.verdict
    }
}

/// Answer flow events from `input` until EOF or shutdown.
///
/// Each line of `input` is a JSON [`FlowEvent`]; each answer is a JSON line
/// `{"verdict":"allow"|"deny"}` on `output`. Malformed lines are skipped
/// with a warning. Returns the number of flows handled.
pub async fn run_filter<R, W>(
    filter: &FlowFilter,
    input: R,
    mut output: W,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0u64;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read flow event")?,
            _ = shutdown_rx.recv() => {
                info!("filter received shutdown signal");
                break;
            }
        };

        let Some(line) = line else {
            info!("flow event stream closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let flow: FlowEvent = match serde_json::from_str(&line) {
            Ok(flow) => flow,
            Err(err) => {
                warn!(%err, "ignoring malformed flow event");
                continue;
            }
        };

        let verdict = filter.handle_flow(&flow);
        let mut reply = serde_json::to_vec(&VerdictReply { verdict })?;
        reply.push(b'\n');
        output
            .write_all(&reply)
            .await
            .context("failed to write verdict")?;
        output.flush().await.context("failed to flush verdict")?;
        handled += 1;
    }

    Ok(handled)
}
