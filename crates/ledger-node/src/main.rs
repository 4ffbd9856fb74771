//! Ledger node binary
//!
//! This is the main entry point for running a replicated ledger node.

mod cli;
mod config;
mod error;
mod genesis;
mod orchestrator;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use config::NodeConfig;
use orchestrator::Node;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("ledger node starting...");

    let config = NodeConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;
    tracing::info!("node {} loaded configuration, consensus = {:?}", config.id, config.consensus_algorithm);

    let (node, mut events) = Node::new(config)?;

    node.bootstrap(&mut events).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let shutdown_node = Arc::clone(&node);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        shutdown_node.stop().await;
        let _ = shutdown_tx.send(true);
    });

    node.run(events, shutdown_rx).await;

    tracing::info!("ledger node stopped");
    Ok(())
}
