//! Session routing: resolve a chat event to a control socket and
//! deliver the payload.
//!
//! Priority order: thread lookup, custom-channel lookup, the legacy
//! pre-registry socket, and finally a file drop the user can pick up
//! manually. Socket sends retry three times with a fixed backoff
//! ladder before falling through.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_common::Config;
use slackline_protocol::session::prefer_socket_owner;
use slackline_registry::RegistryDb;

/// How a payload ultimately reached the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    RegistrySocket,
    LegacySocket,
    File,
}

const BACKOFF: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(300),
    Duration::from_millis(900),
];

#[derive(Clone)]
pub struct Router {
    db: RegistryDb,
    config: Config,
}

impl Router {
    pub fn new(db: RegistryDb, config: Config) -> Self {
        Self { db, config }
    }

    /// Socket path for a thread, preferring the wrapper row (shortest
    /// session id) because only the wrapper owns the control socket.
    pub fn socket_for_thread(&self, thread_ts: &str) -> Option<PathBuf> {
        let rows = self.db.get_by_thread(thread_ts).ok()?;
        let owner = prefer_socket_owner(&rows)?;
        if owner.socket_path.is_empty() {
            return None;
        }
        debug!(
            "thread {thread_ts} -> session {} ({})",
            owner.session_id, owner.socket_path
        );
        Some(PathBuf::from(&owner.socket_path))
    }

    /// Socket path for a custom-channel session. Rows whose socket file
    /// is gone are stale and skipped.
    pub fn socket_for_channel(&self, channel: &str) -> Option<PathBuf> {
        let rows = self.db.get_by_channel(channel).ok()?;
        rows.iter()
            .map(|r| PathBuf::from(&r.socket_path))
            .find(|p| p.exists())
    }

    /// Session id of the thread owner, when one resolves.
    pub fn session_for_thread(&self, thread_ts: &str) -> Option<String> {
        let rows = self.db.get_by_thread(thread_ts).ok()?;
        prefer_socket_owner(&rows).map(|r| r.session_id.clone())
    }

    /// Deliver `text` to the session for `thread_ts`/`channel`, walking
    /// the fallback chain.
    pub async fn send_response(
        &self,
        text: &str,
        thread_ts: Option<&str>,
        channel: Option<&str>,
    ) -> SendMode {
        let mut socket = thread_ts.and_then(|ts| self.socket_for_thread(ts));
        let mut mode = SendMode::RegistrySocket;

        if socket.is_none()
            && let Some(channel) = channel
        {
            socket = self.socket_for_channel(channel);
        }
        if socket.is_none() {
            let legacy = self.config.legacy_socket_path();
            if legacy.exists() {
                socket = Some(legacy);
                mode = SendMode::LegacySocket;
            }
        }

        if let Some(path) = socket
            && send_with_retries(&path, text).await
        {
            return mode;
        }

        // Last resort: file drop for manual pickup.
        let drop_file = self.config.response_drop_file();
        if let Err(e) = std::fs::write(&drop_file, text) {
            warn!("file drop failed: {e}");
        } else {
            info!("wrote response to drop file {}", drop_file.display());
        }
        SendMode::File
    }
}

/// Newline-terminated send with the 0.1/0.3/0.9 s retry ladder.
async fn send_with_retries(path: &Path, text: &str) -> bool {
    for (attempt, delay) in BACKOFF.iter().enumerate() {
        match send_once(path, text).await {
            Ok(()) => return true,
            Err(e) => {
                debug!(
                    "socket send attempt {} to {} failed: {e}",
                    attempt + 1,
                    path.display()
                );
                if attempt + 1 < BACKOFF.len() {
                    tokio::time::sleep(*delay).await;
                }
            }
        }
    }
    warn!("socket send to {} failed after retries", path.display());
    false
}

async fn send_once(path: &Path, text: &str) -> std::io::Result<()> {
    let mut stream = UnixStream::connect(path).await?;
    stream.write_all(text.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;
    Ok(())
}
