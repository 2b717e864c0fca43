//! Wrapper orchestration: registration, the proxy loops, heartbeat
//! and exit propagation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_common::Config;
use slackline_common::flags;
use slackline_linelog::LineLogger;
use slackline_protocol::SessionStatus;
use slackline_protocol::registry_rpc::RegisterParams;
use slackline_registry::RegistryClient;
use slackline_registry::RegistryDb;
use slackline_registry::SessionUpdate;
use slackline_slack::SlackClient;
use slackline_slack::client::PostMessage;

use crate::bridge::SessionBridge;
use crate::cli::Cli;
use crate::control;
use crate::files::SessionFiles;
use crate::pty::spawn_agent;
use crate::term::RawModeGuard;
use crate::term::terminal_size;

const HEARTBEAT: Duration = Duration::from_secs(5);

/// Run the wrapper to completion; the return value is the agent's exit
/// code, which the binary propagates.
pub async fn run_main(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::from_env()?;
    config.ensure_dirs()?;

    let wrapper_id = mint_wrapper_id();
    let socket_path = config.session_socket_path(&wrapper_id);
    let project = cli
        .project
        .clone()
        .or_else(project_from_cwd)
        .unwrap_or_else(|| "unknown".to_string());
    let terminal = cli
        .terminal
        .clone()
        .or_else(|| std::env::var("TERM_PROGRAM").ok())
        .unwrap_or_else(|| "tty".to_string());

    let line_logger = Arc::new(LineLogger::default());
    let mut files = SessionFiles::create(&config, &wrapper_id)?;
    let registry = RegistryClient::new(config.registry_socket_path());
    let db = RegistryDb::open(&config.registry_db_path)
        .inspect_err(|e| warn!("registry database unavailable: {e}"))
        .ok();

    register(&config, &registry, &cli, &wrapper_id, &project, &terminal, &socket_path).await;
    let mut bridge = SessionBridge::new(config.clone(), registry, wrapper_id.clone());

    // Agent under the PTY, sized to the user's terminal.
    let cwd = std::env::current_dir()?;
    let (mut pty, mut exit_rx) =
        spawn_agent(&flags::CLAUDE_BIN, &cli.agent_args, &cwd, terminal_size())?;

    // Remote input path: control socket -> PTY writer.
    let control_task = {
        let socket_path = socket_path.clone();
        let writer_tx = pty.writer_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = control::serve(socket_path, writer_tx).await {
                warn!("control socket server failed: {e}");
            }
        })
    };

    // Local input path: user stdin -> PTY writer.
    let _raw_mode = RawModeGuard::new();
    let stdin_writer = pty.writer_tx.clone();
    let stdin_task = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stdin_writer.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Window size changes propagate to the PTY.
    let mut winch =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())?;

    let mut stdout = tokio::io::stdout();
    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let exit_code = loop {
        tokio::select! {
            chunk = pty.output_rx.recv() => {
                match chunk {
                    Some(chunk) => {
                        stdout.write_all(&chunk).await?;
                        stdout.flush().await?;
                        line_logger.add_data(&chunk);
                        if let Err(e) = files.write_chunk(&chunk) {
                            warn!("buffer write failed: {e}");
                        }
                        bridge.on_output(&line_logger, &mut files).await;
                    }
                    None => {
                        // PTY closed; pick up the exit code.
                        break (&mut exit_rx).await.unwrap_or(-1);
                    }
                }
            }
            code = &mut exit_rx => {
                break code.unwrap_or(-1);
            }
            _ = winch.recv() => {
                pty.resize(terminal_size());
            }
            _ = heartbeat.tick() => {
                if let Err(e) = line_logger.save_to_file(&files.lines_path()) {
                    debug!("lines file write failed: {e}");
                }
                bridge.on_heartbeat(&mut files).await;
                // Keep last_activity fresh so cleanup never reaps a
                // live session.
                if let Some(db) = &db {
                    let _ = db.update_session(&wrapper_id, &SessionUpdate::default());
                }
            }
        }
    };

    // Pull any output still buffered at exit so the tail of the
    // session reaches the buffer files.
    while let Ok(chunk) = pty.output_rx.try_recv() {
        let _ = stdout.write_all(&chunk).await;
        line_logger.add_data(&chunk);
        let _ = files.write_chunk(&chunk);
    }
    let _ = stdout.flush().await;
    let _ = line_logger.save_to_file(&files.lines_path());

    control_task.abort();
    stdin_task.abort();

    let status = if exit_code == 0 {
        SessionStatus::Ended
    } else {
        SessionStatus::Crashed
    };
    finish(&db, &wrapper_id, bridge.agent_session_id(), status).await;
    let _ = std::fs::remove_file(&socket_path);

    Ok(exit_code)
}

fn mint_wrapper_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn project_from_cwd() -> Option<String> {
    std::env::current_dir()
        .ok()?
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

async fn register(
    config: &Config,
    registry: &RegistryClient,
    cli: &Cli,
    wrapper_id: &str,
    project: &str,
    terminal: &str,
    socket_path: &Path,
) {
    if !registry.available() {
        warn!("registry socket not present, running unregistered");
        return;
    }
    let params = RegisterParams {
        session_id: wrapper_id.to_string(),
        project: project.to_string(),
        project_dir: std::env::current_dir()
            .ok()
            .map(|d| d.to_string_lossy().into_owned()),
        terminal: terminal.to_string(),
        socket_path: socket_path.to_string_lossy().into_owned(),
        slack_user_id: cli.user.clone(),
        custom_channel: cli.channel.clone(),
        permissions_channel: cli.permissions_channel.clone(),
        description: cli.description.clone(),
        buffer_file_path: Some(
            config
                .buffer_file_path(wrapper_id)
                .to_string_lossy()
                .into_owned(),
        ),
    };
    match registry.register(params).await {
        Ok(response) if response.success => {
            info!("registered session {wrapper_id}");
        }
        Ok(response) => {
            warn!(
                "registration rejected: {}",
                response.error.unwrap_or_default()
            );
        }
        Err(e) => warn!("registration failed: {e}"),
    }
}

/// Final status update plus a best-effort chat post.
async fn finish(
    db: &Option<RegistryDb>,
    wrapper_id: &str,
    agent_session_id: Option<&str>,
    status: SessionStatus,
) {
    info!("session {wrapper_id} {status}");
    let mut thread: Option<(String, Option<String>)> = None;

    if let Some(db) = db {
        let update = SessionUpdate::status(status);
        let _ = db.update_session(wrapper_id, &update);
        if let Some(agent_id) = agent_session_id {
            let _ = db.update_session(agent_id, &update);
        }
        if let Ok(Some(session)) = db.get_session(wrapper_id)
            && let Some(channel) = session.channel
        {
            thread = Some((channel, session.thread_ts));
        }
    }

    let Some(token) = *flags::SLACK_BOT_TOKEN else {
        return;
    };
    let Some((channel, thread_ts)) = thread else {
        return;
    };
    let emoji = match status {
        SessionStatus::Crashed => "\u{1f4a5}",
        _ => "\u{1f51a}",
    };
    let slack = SlackClient::with_timeout(token, Duration::from_secs(3));
    if let Err(e) = slack
        .post_message(&PostMessage {
            channel,
            text: format!("{emoji} Session {status}"),
            thread_ts,
            blocks: None,
        })
        .await
    {
        debug!("session end post failed: {e}");
    }
}
