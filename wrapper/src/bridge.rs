//! Session-identity bridging.
//!
//! `/compact` and `/resume` make the agent start writing under a new
//! session id. The bridge notices (via the line log's sticky flag),
//! discovers the successor id from the newest buffer file, and
//! re-registers it against the existing chat thread so remote users
//! keep seeing replies in the same place.

use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_common::Config;
use slackline_linelog::LineLogger;
use slackline_linelog::discovery::find_active_session;
use slackline_protocol::registry_rpc::RegisterExistingParams;
use slackline_registry::RegistryClient;

use crate::files::SessionFiles;

pub struct SessionBridge {
    config: Config,
    registry: RegistryClient,
    wrapper_id: String,
    agent_session_id: Option<String>,
    /// Set when a change fired but the successor's buffer file had not
    /// appeared yet; heartbeats keep retrying discovery without
    /// re-arming the flag.
    discovery_pending: bool,
}

impl SessionBridge {
    pub fn new(config: Config, registry: RegistryClient, wrapper_id: impl Into<String>) -> Self {
        Self {
            config,
            registry,
            wrapper_id: wrapper_id.into(),
            agent_session_id: None,
            discovery_pending: false,
        }
    }

    /// Latest known agent-minted session id, if discovered.
    pub fn agent_session_id(&self) -> Option<&str> {
        self.agent_session_id.as_deref()
    }

    pub fn discovery_pending(&self) -> bool {
        self.discovery_pending
    }

    /// Called on every PTY read. Consumes the sticky flag at most once
    /// per detected change.
    pub async fn on_output(&mut self, logger: &LineLogger, files: &mut SessionFiles) {
        if logger.acknowledge_session_change() {
            info!("session-change command detected");
            self.discover(files).await;
        }
    }

    /// Called on heartbeat ticks; retries a discovery that raced the
    /// successor's first buffer write.
    pub async fn on_heartbeat(&mut self, files: &mut SessionFiles) {
        if self.discovery_pending {
            self.discover(files).await;
        }
    }

    async fn discover(&mut self, files: &mut SessionFiles) {
        let Some(new_sid) = find_active_session(&self.config.log_dir) else {
            debug!("no buffer files yet, retrying on heartbeat");
            self.discovery_pending = true;
            return;
        };
        if new_sid == self.wrapper_id
            || self.agent_session_id.as_deref() == Some(new_sid.as_str())
        {
            debug!("newest buffer file still belongs to this session");
            self.discovery_pending = true;
            return;
        }
        self.discovery_pending = false;

        let previous_id = self
            .agent_session_id
            .clone()
            .unwrap_or_else(|| self.wrapper_id.clone());
        let previous = match self.registry.get(&previous_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!("previous session {previous_id} not registered, cannot preserve thread");
                return;
            }
            Err(e) => {
                warn!("registry lookup failed: {e}");
                return;
            }
        };

        let params = RegisterExistingParams {
            session_id: new_sid.clone(),
            project: Some(previous.project.clone()),
            project_dir: previous.project_dir.clone(),
            terminal: Some(previous.terminal.clone()),
            socket_path: Some(
                self.config
                    .session_socket_path(&self.wrapper_id)
                    .to_string_lossy()
                    .into_owned(),
            ),
            thread_ts: previous.thread_ts.clone(),
            channel: previous.channel.clone(),
            permissions_channel: previous.permissions_channel.clone(),
            slack_user_id: previous.slack_user_id.clone(),
            reply_to_ts: previous.reply_to_ts.clone(),
            todo_message_ts: previous.todo_message_ts.clone(),
            buffer_file_path: Some(
                self.config
                    .buffer_file_path(&new_sid)
                    .to_string_lossy()
                    .into_owned(),
            ),
        };
        match self.registry.register_existing(params).await {
            Ok(response) if response.success => {
                info!("session change: {previous_id} -> {new_sid}, thread preserved");
            }
            Ok(response) => {
                // Typically a duplicate row from a hook racing us; the
                // metadata is already in place then.
                debug!(
                    "register_existing rejected: {}",
                    response.error.unwrap_or_default()
                );
            }
            Err(e) => {
                warn!("register_existing failed: {e}");
                return;
            }
        }

        if let Err(e) = files.retarget(&new_sid) {
            warn!("failed to retarget buffer files: {e}");
        }
        self.agent_session_id = Some(new_sid);
    }
}
