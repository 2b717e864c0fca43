//! Daemon entry point, reusable from the multitool CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing::warn;

use slackline_common::Config;
use slackline_common::flags;
use slackline_slack::SlackClient;

use crate::RegistryDb;
use crate::RegistryServer;

/// Session registry daemon: the process-wide index of active sessions
/// and the single RPC endpoint wrappers and hooks talk to.
#[derive(Debug, Parser, Default)]
#[clap(author, version)]
pub struct Cli {
    /// Override the registry database path.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Override the RPC socket path.
    #[arg(long)]
    pub socket_path: Option<PathBuf>,

    /// Default channel session threads are created in.
    #[arg(long)]
    pub channel: Option<String>,

    /// Delete ended/crashed sessions older than this many hours.
    #[arg(long, default_value_t = 24)]
    pub cleanup_hours: i64,

    /// Seconds between cleanup sweeps.
    #[arg(long, default_value_t = 3600)]
    pub cleanup_interval: u64,
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.ensure_dirs()?;

    let db_path = cli
        .db_path
        .unwrap_or_else(|| config.registry_db_path.clone());
    let socket_path = cli
        .socket_path
        .unwrap_or_else(|| config.registry_socket_path());
    let default_channel = cli
        .channel
        .unwrap_or_else(|| flags::SLACK_CHANNEL.to_string());

    let db = RegistryDb::open(&db_path)?;
    info!("database initialized: {}", db_path.display());

    // Chat integration is optional; without a token the registry still
    // tracks sessions and everything chat-facing is skipped.
    let slack = flags::SLACK_BOT_TOKEN
        .map(|token| SlackClient::with_timeout(token, Duration::from_secs(3)));
    if slack.is_none() {
        warn!("SLACK_BOT_TOKEN not set, running without chat integration");
    }

    let server = Arc::new(RegistryServer::new(db, slack, default_channel, socket_path));

    let cleanup_server = Arc::clone(&server);
    let cleanup_hours = cli.cleanup_hours;
    let cleanup_interval = cli.cleanup_interval;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(cleanup_interval));
        tick.tick().await;
        loop {
            tick.tick().await;
            if let Err(e) = cleanup_server.run_cleanup(cleanup_hours).await {
                warn!("cleanup sweep failed: {e}");
            }
        }
    });

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
        shutdown.notify_waiters();
    });

    server.run().await?;
    Ok(())
}
