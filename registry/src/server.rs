//! The registry RPC server and its chat-side bootstrap.
//!
//! Transport: a Unix stream socket; one newline-terminated JSON request
//! per connection, one newline-terminated JSON response, then close.
//! Each accepted connection is handled on its own short-lived task so
//! one slow client cannot stall registration for everyone else.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use slackline_protocol::RegistryRequest;
use slackline_protocol::RegistryResponse;
use slackline_protocol::SessionRecord;
use slackline_protocol::SessionStatus;
use slackline_protocol::registry_rpc::MAX_REQUEST_BYTES;
use slackline_protocol::registry_rpc::RegisterExistingParams;
use slackline_protocol::registry_rpc::RegisterParams;
use slackline_slack::Block;
use slackline_slack::SlackClient;
use slackline_slack::Text;
use slackline_slack::client::PostMessage;

use crate::channels::ensure_channel_exists;
use crate::db::RegistryDb;
use crate::db::SessionUpdate;
use crate::db::new_session_record;
use crate::error::RegistryError;
use crate::error::Result;

pub struct RegistryServer {
    db: RegistryDb,
    slack: Option<SlackClient>,
    default_channel: String,
    socket_path: PathBuf,
    shutdown: Arc<Notify>,
}

impl RegistryServer {
    pub fn new(
        db: RegistryDb,
        slack: Option<SlackClient>,
        default_channel: impl Into<String>,
        socket_path: PathBuf,
    ) -> Self {
        Self {
            db,
            slack,
            default_channel: default_channel.into(),
            socket_path,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to stop a running server.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn db(&self) -> RegistryDb {
        self.db.clone()
    }

    /// Bind the socket (unlinking a stale file from a prior run) and
    /// serve until the shutdown handle fires.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        if self.socket_path.exists() {
            info!("removing stale socket {}", self.socket_path.display());
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!("registry listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    warn!("connection handler error: {e}");
                                }
                            });
                        }
                        Err(e) => error!("accept failed: {e}"),
                    }
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        info!("registry server stopped");
        Ok(())
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        {
            // Bound the request size before parsing anything.
            let mut limited = (&mut reader).take((MAX_REQUEST_BYTES + 1) as u64);
            limited.read_line(&mut line).await?;
        }
        if line.len() > MAX_REQUEST_BYTES {
            let response = RegistryResponse::err(RegistryError::RequestTooLarge.to_string());
            return self.respond(reader.into_inner(), &response).await;
        }
        let trimmed = line.trim_end_matches('\n');
        if trimmed.is_empty() {
            return Ok(());
        }

        let response = match RegistryRequest::parse(trimmed) {
            Ok(request) => {
                debug!("processing {}", command_name(&request));
                self.process(request).await
            }
            Err(e) => RegistryResponse::err(format!("Invalid JSON: {e}")),
        };
        self.respond(reader.into_inner(), &response).await
    }

    async fn respond(&self, mut stream: UnixStream, response: &RegistryResponse) -> Result<()> {
        let mut payload = serde_json::to_string(response)?;
        payload.push('\n');
        stream.write_all(payload.as_bytes()).await?;
        Ok(())
    }

    async fn process(&self, request: RegistryRequest) -> RegistryResponse {
        let result = match request {
            RegistryRequest::Register(params) => self.register(params, true).await,
            RegistryRequest::RegisterSimple(params) => self.register(params, false).await,
            RegistryRequest::RegisterExisting(params) => self.register_existing(params),
            RegistryRequest::Unregister { session_id } => {
                return match self.unregister(&session_id).await {
                    Ok(removed) => RegistryResponse {
                        success: removed,
                        ..Default::default()
                    },
                    Err(e) => RegistryResponse::err(e.to_string()),
                };
            }
            RegistryRequest::Get { session_id } => {
                if session_id.is_empty() {
                    return RegistryResponse::err("Missing session_id");
                }
                return match self.db.get_session(&session_id) {
                    Ok(Some(session)) => RegistryResponse::with_session(session),
                    Ok(None) => RegistryResponse::ok(),
                    Err(e) => RegistryResponse::err(e.to_string()),
                };
            }
            RegistryRequest::List { status } => {
                return match self.db.list_sessions(status) {
                    Ok(sessions) => RegistryResponse::with_sessions(sessions),
                    Err(e) => RegistryResponse::err(e.to_string()),
                };
            }
        };
        match result {
            Ok(session) => RegistryResponse::with_session(session),
            Err(e) => RegistryResponse::err(e.to_string()),
        }
    }

    /// Insert the row, then create the chat thread: in the background
    /// for `REGISTER` (wrapper startup latency is dominated only by the
    /// insert), synchronously for `REGISTER_SIMPLE` (callers need
    /// `thread_ts` immediately).
    async fn register(&self, params: RegisterParams, deferred: bool) -> Result<SessionRecord> {
        if let Some(field) = params.missing_fields().first().copied() {
            return Err(RegistryError::MissingField(field));
        }
        if self.db.get_session(&params.session_id)?.is_some() {
            return Err(RegistryError::DuplicateSession(params.session_id));
        }

        let mut record = new_session_record(
            &params.session_id,
            &params.project,
            &params.terminal,
            &params.socket_path,
        );
        record.project_dir = params.project_dir.clone();
        record.slack_user_id = params.slack_user_id.clone();
        record.buffer_file_path = params.buffer_file_path.clone();
        let mut record = self.db.create_session(&record)?;
        info!("registered session {}", record.session_id);

        if let Some(slack) = &self.slack {
            if deferred {
                let slack = slack.clone();
                let db = self.db.clone();
                let default_channel = self.default_channel.clone();
                let params = params.clone();
                tokio::spawn(async move {
                    match create_session_thread(&slack, &default_channel, &params).await {
                        Ok(update) => {
                            if let Err(e) = db.update_session(&params.session_id, &update) {
                                warn!("failed to store thread metadata: {e}");
                            }
                        }
                        Err(e) => warn!("deferred thread creation failed: {e}"),
                    }
                });
            } else {
                match create_session_thread(slack, &self.default_channel, &params).await {
                    Ok(update) => {
                        self.db.update_session(&params.session_id, &update)?;
                        record.thread_ts = update.thread_ts;
                        record.channel = update.channel;
                        record.permissions_channel = update.permissions_channel;
                    }
                    // Chat failures are advisory; the row exists and
                    // hooks will self-heal once metadata appears.
                    Err(e) => warn!("thread creation failed: {e}"),
                }
            }
        }

        Ok(record)
    }

    /// A second row sharing chat metadata with an existing one. Used to
    /// keep the agent's uuid pointing at the wrapper's thread; never
    /// posts anything.
    fn register_existing(&self, params: RegisterExistingParams) -> Result<SessionRecord> {
        if params.session_id.is_empty() {
            return Err(RegistryError::MissingField("session_id"));
        }
        if params.channel.is_none() {
            return Err(RegistryError::MissingField("channel"));
        }
        if self.db.get_session(&params.session_id)?.is_some() {
            return Err(RegistryError::DuplicateSession(params.session_id));
        }

        let mut record = new_session_record(
            &params.session_id,
            params.project.as_deref().unwrap_or("Unknown"),
            params.terminal.as_deref().unwrap_or("Unknown"),
            params.socket_path.as_deref().unwrap_or(""),
        );
        record.project_dir = params.project_dir;
        record.thread_ts = params.thread_ts;
        record.channel = params.channel;
        record.permissions_channel = params.permissions_channel;
        record.slack_user_id = params.slack_user_id;
        record.reply_to_ts = params.reply_to_ts;
        record.todo_message_ts = params.todo_message_ts;
        record.buffer_file_path = params.buffer_file_path;
        let record = self.db.create_session(&record)?;
        info!(
            "registered existing session {} -> channel {:?}, thread {:?}",
            record.session_id, record.channel, record.thread_ts
        );
        Ok(record)
    }

    async fn unregister(&self, session_id: &str) -> Result<bool> {
        if session_id.is_empty() {
            return Err(RegistryError::MissingField("session_id"));
        }
        let Some(session) = self.db.get_session(session_id)? else {
            return Ok(false);
        };
        if let Some(slack) = &self.slack {
            archive_session_thread(slack, &session).await;
        }
        self.db.delete_session(session_id)?;
        self.db.cleanup_dm_subscriptions_for_session(session_id)?;
        info!("unregistered session {session_id}");
        Ok(true)
    }

    /// Periodic sweep of stale terminal-state rows; archives their
    /// threads with a final status message.
    pub async fn run_cleanup(&self, older_than_hours: i64) -> Result<usize> {
        let removed = self.db.cleanup_old_sessions(older_than_hours)?;
        if let Some(slack) = &self.slack {
            for session in &removed {
                archive_session_thread(slack, session).await;
            }
        }
        if !removed.is_empty() {
            info!("cleaned up {} old sessions", removed.len());
        }
        Ok(removed.len())
    }
}

fn command_name(request: &RegistryRequest) -> &'static str {
    match request {
        RegistryRequest::Register(_) => "REGISTER",
        RegistryRequest::RegisterSimple(_) => "REGISTER_SIMPLE",
        RegistryRequest::RegisterExisting(_) => "REGISTER_EXISTING",
        RegistryRequest::Unregister { .. } => "UNREGISTER",
        RegistryRequest::Get { .. } => "GET",
        RegistryRequest::List { .. } => "LIST",
    }
}

/// Resolve the target channel and, unless the session runs in
/// channel mode, post the header-style parent message whose timestamp
/// becomes the session's thread id.
async fn create_session_thread(
    slack: &SlackClient,
    default_channel: &str,
    params: &RegisterParams,
) -> Result<SessionUpdate> {
    let target = params
        .custom_channel
        .as_deref()
        .unwrap_or(default_channel);
    // Announce channels created for a session override in the default
    // channel so they are discoverable.
    let notify = params.custom_channel.as_ref().map(|_| default_channel);
    let channel_id = ensure_channel_exists(slack, target, notify).await?;

    let permissions_channel = match &params.permissions_channel {
        Some(name) => match ensure_channel_exists(slack, name, None).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("could not ensure permissions channel: {e}");
                None
            }
        },
        None => None,
    };

    // Channel mode: top-level posts, no parent thread.
    if params.custom_channel.is_some() {
        return Ok(SessionUpdate {
            channel: Some(channel_id),
            permissions_channel,
            ..Default::default()
        });
    }

    let mut blocks = vec![Block::header(format!("\u{1f680} {}", params.project))];
    if let Some(description) = &params.description {
        blocks.push(Block::section(format!("_{description}_")));
    }
    let short_id: String = params.session_id.chars().take(12).collect();
    blocks.push(Block::fields(vec![
        Text::mrkdwn(format!("*Session:* `{short_id}...`")),
        Text::mrkdwn(format!("*Terminal:* {}", params.terminal)),
    ]));

    let mut text = format!("New Session: {}", params.project);
    if let Some(description) = &params.description {
        text.push_str(&format!(" - {description}"));
    }

    let posted = slack
        .post_message(&PostMessage {
            channel: channel_id,
            text,
            thread_ts: None,
            blocks: Some(blocks),
        })
        .await
        .map_err(|e| RegistryError::Channel(e.to_string()))?;

    let mut update = SessionUpdate::thread(posted.ts, posted.channel);
    update.permissions_channel = permissions_channel;
    Ok(update)
}

/// Best-effort terminal-status post into the session's thread.
async fn archive_session_thread(slack: &SlackClient, session: &SessionRecord) {
    let (Some(channel), Some(thread_ts)) = (&session.channel, &session.thread_ts) else {
        return;
    };
    let emoji = match session.status {
        SessionStatus::Crashed => "\u{1f4a5}",
        _ => "\u{2705}",
    };
    let text = format!(
        "{emoji} Session {} at {}",
        session.status,
        chrono::Utc::now().format("%H:%M:%S")
    );
    if let Err(e) = slack
        .post_message(&PostMessage {
            channel: channel.clone(),
            text,
            thread_ts: Some(thread_ts.clone()),
            blocks: None,
        })
        .await
    {
        warn!("failed to archive thread for {}: {e}", session.session_id);
    }
}
