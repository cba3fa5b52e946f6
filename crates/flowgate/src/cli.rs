use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flowgate", version, about = "Per-user outbound flow filter and audit log viewer")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "flowgate.yaml", global = true)]
    pub config: PathBuf,

    /// Path to the shared audit log (overrides config file setting)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read flow events as JSON lines on stdin, answer each with a verdict on
    /// stdout, and record every decision in the audit log
    Filter,

    /// Follow the audit log and print new decisions as they are written
    Watch {
        /// Number of historical lines to keep (overrides config file setting)
        #[arg(long)]
        history: Option<usize>,
    },
}
