mod cli;
mod config;
mod filter;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};

use audit_log::{LogBuffer, LogTailer, LogWriter};
use policy_engine::{PolicyEngine, UserRule};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::filter::FlowFilter;

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref log_file) = cli.log_file {
        cfg.logging.audit_log_path = Some(log_file.clone());
    }
    if let Command::Watch {
        history: Some(history),
    } = cli.command
    {
        cfg.viewer.history_lines = history;
    }

    // 3. Init tracing-subscriber with JSON format. Stdout carries verdicts and
    //    viewer output, so diagnostics go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let log_path = resolve_log_path(&cfg)?;

    info!(
        config_file = %cli.config.display(),
        audit_log = %log_path.display(),
        command = ?cli.command,
        "flowgate starting"
    );

    // 4. Shutdown signal (ctrl-c + SIGTERM).
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    spawn_signal_listener(shutdown_tx.clone());

    // 5. Run the selected side of the pipeline.
    match cli.command {
        Command::Filter => run_filter(&cfg, log_path, &shutdown_tx).await?,
        Command::Watch { .. } => run_watch(&cfg, log_path, &shutdown_tx).await?,
    }

    info!("flowgate shutting down");
    Ok(())
}

fn resolve_log_path(cfg: &Config) -> Result<PathBuf> {
    match cfg.logging.audit_log_path {
        Some(ref path) => Ok(path.clone()),
        None => audit_log::default_log_path()
            .context("no platform data directory; set logging.audit_log_path or --log-file"),
    }
}

/// Host side: evaluate flows from stdin and write the audit trail.
async fn run_filter(
    cfg: &Config,
    log_path: PathBuf,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<()> {
    // Rules are provided programmatically; with none configured every user
    // fails open.
    let rules: Vec<UserRule> = Vec::new();
    let engine = Arc::new(PolicyEngine::new(rules));
    info!(?engine, "policy engine ready");

    let (audit, audit_handle) = LogBuffer::start(LogWriter::new(log_path), cfg.audit.buffer_options());
    let flow_filter = FlowFilter::new(engine, audit.clone());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = filter::run_filter(
        &flow_filter,
        stdin,
        tokio::io::stdout(),
        shutdown_tx.subscribe(),
    )
    .await;

    // Final flush runs whether the loop ended cleanly or not.
    drop(flow_filter);
    let flushed = audit.shutdown(audit_handle).await;
    info!(flushed, "audit buffer drained");

    let handled = result?;
    info!(handled, "filter finished");
    Ok(())
}

/// Viewer side: tail the audit trail and print new decisions.
async fn run_watch(
    cfg: &Config,
    log_path: PathBuf,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<()> {
    let mut tailer = LogTailer::with_capacity(log_path, cfg.viewer.history_lines);
    let interval = Duration::from_secs(cfg.viewer.poll_interval_secs.max(1));

    watch::run_watch(
        &mut tailer,
        interval,
        tokio::io::stdout(),
        shutdown_tx.subscribe(),
    )
    .await
}

/// Spawn a task that waits for ctrl-c or SIGTERM and then broadcasts the
/// shutdown signal.
fn spawn_signal_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (ctrl-c)");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM");
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to register SIGTERM handler; only ctrl-c stops flowgate");
                    ctrl_c.await.ok();
                    info!("received SIGINT (ctrl-c)");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("received SIGINT (ctrl-c)");
        }

        let _ = shutdown_tx.send(());
    });
}
