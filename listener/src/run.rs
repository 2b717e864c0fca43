//! Listener entry point, reusable from the multitool CLI.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

use slackline_common::Config;
use slackline_common::flags;
use slackline_registry::RegistryDb;
use slackline_slack::SlackClient;
use slackline_slack::SocketEvent;
use slackline_slack::run_socket_mode;

use crate::events;
use crate::handlers::Listener;

/// Chat event listener: routes workspace events to session sockets.
#[derive(Debug, Parser, Default)]
#[clap(author, version)]
pub struct Cli {}

pub async fn run_main(_cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.ensure_dirs()?;

    let bot_token =
        flags::SLACK_BOT_TOKEN.context("SLACK_BOT_TOKEN environment variable not set")?;
    let app_token = flags::SLACK_APP_TOKEN
        .context("SLACK_APP_TOKEN environment variable not set (event subscription)")?;

    let db = RegistryDb::open(&config.registry_db_path)?;
    info!("registry database: {}", config.registry_db_path.display());

    let slack = SlackClient::new(bot_token);
    let bot_user_id = match slack.auth_test().await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("auth.test failed, bot-authored reactions will not be filtered: {e}");
            None
        }
    };

    let listener = Arc::new(Listener::new(db, slack, config, bot_user_id));

    let (tx, mut rx) = mpsc::channel::<SocketEvent>(128);
    let app_client = SlackClient::new(app_token);
    let socket_task = tokio::spawn(run_socket_mode(app_client, tx));

    info!("listener running");
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let chat_event = match event {
                    SocketEvent::EventsApi(payload) => events::parse_event(&payload),
                    SocketEvent::Interactive(payload) => events::parse_interactive(&payload),
                };
                let Some(chat_event) = chat_event else { continue };
                // One task per event; a slow handler never stalls the
                // stream.
                let listener = Arc::clone(&listener);
                tokio::spawn(async move {
                    listener.handle_event(chat_event).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    socket_task.abort();
    Ok(())
}
