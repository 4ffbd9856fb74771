//! CLI argument parsing for the ledger node binary.

use std::path::PathBuf;

use clap::Parser;

/// An ultra-lightweight replicated ledger node.
#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node")]
#[command(about = "Replicated ledger node")]
#[command(version)]
pub struct Cli {
    /// Path to the node's configuration file (JSON or TOML, dispatched by
    /// extension).
    #[arg(long, default_value = "./config.json")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
