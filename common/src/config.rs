//! Filesystem layout and environment overrides.
//!
//! Everything lives under a single per-user anchor, `~/.claude/slack`,
//! so that the registry daemon, per-session wrappers, the listener and
//! short-lived hooks all agree on where sockets, buffer files and
//! response files are without any coordination beyond the environment:
//!
//! ```text
//! ~/.claude/slack/registry.db
//! ~/.claude/slack/sockets/registry.sock
//! ~/.claude/slack/sockets/<sid>.sock
//! ~/.claude/slack/logs/claude_output_<sid>.txt
//! ~/.claude/slack/permission_responses/<sid>_<rid>.json
//! ~/.claude/slack/askuser_responses/<sid>_<rid>.json
//! ```

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine the user home directory")]
    NoHome,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolved filesystem layout. Construct once per process via
/// [`Config::from_env`] (or [`Config::with_root`] in tests) and pass it
/// around; individual components never consult the environment again.
#[derive(Debug, Clone)]
pub struct Config {
    /// Anchor directory, `~/.claude/slack` unless overridden.
    pub data_dir: PathBuf,
    /// Where Unix sockets live (`SLACK_SOCKET_DIR`).
    pub socket_dir: PathBuf,
    /// Where per-session buffer/line files and daemon logs live
    /// (`SLACK_LOG_DIR`).
    pub log_dir: PathBuf,
    /// SQLite session table (`REGISTRY_DB_PATH`).
    pub registry_db_path: PathBuf,
}

impl Config {
    /// Resolve the layout from the environment, falling back to the
    /// per-user anchor for anything not overridden.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = match std::env::var_os("CLAUDE_SLACK_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHome)?
                .join(".claude")
                .join("slack"),
        };
        let socket_dir = std::env::var_os("SLACK_SOCKET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("sockets"));
        let log_dir = std::env::var_os("SLACK_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));
        let registry_db_path = std::env::var_os("REGISTRY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("registry.db"));

        Ok(Self {
            data_dir,
            socket_dir,
            log_dir,
            registry_db_path,
        })
    }

    /// Layout rooted at an arbitrary directory. Used by tests so that
    /// every test gets an isolated tree without touching the
    /// environment.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            socket_dir: root.join("sockets"),
            log_dir: root.join("logs"),
            registry_db_path: root.join("registry.db"),
            data_dir: root,
        }
    }

    /// Create the directories that long-lived processes expect to
    /// exist. Idempotent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.socket_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(self.permission_response_dir())?;
        std::fs::create_dir_all(self.askuser_response_dir())?;
        Ok(())
    }

    pub fn registry_socket_path(&self) -> PathBuf {
        self.socket_dir.join("registry.sock")
    }

    /// Control socket owned by one wrapper.
    pub fn session_socket_path(&self, session_id: &str) -> PathBuf {
        self.socket_dir.join(format!("{session_id}.sock"))
    }

    /// Pre-registry socket retained for backward compatibility; the
    /// listener falls through to it when no session row matches.
    pub fn legacy_socket_path(&self) -> PathBuf {
        match std::env::var_os("SLACK_SOCKET_PATH") {
            Some(p) => PathBuf::from(p),
            None => self.socket_dir.join("claude_slack.sock"),
        }
    }

    /// Raw PTY output for one session.
    pub fn buffer_file_path(&self, session_id: &str) -> PathBuf {
        self.log_dir.join(format!("claude_output_{session_id}.txt"))
    }

    /// Sidecar metadata next to the raw buffer.
    pub fn buffer_meta_path(&self, session_id: &str) -> PathBuf {
        self.log_dir.join(format!("claude_output_{session_id}.meta"))
    }

    /// Numbered line-log dump for one session.
    pub fn lines_file_path(&self, session_id: &str) -> PathBuf {
        self.log_dir.join(format!("claude_lines_{session_id}.txt"))
    }

    pub fn permission_response_dir(&self) -> PathBuf {
        self.data_dir.join("permission_responses")
    }

    pub fn askuser_response_dir(&self) -> PathBuf {
        self.data_dir.join("askuser_responses")
    }

    /// Last-resort drop file when no socket is reachable.
    pub fn response_drop_file(&self) -> PathBuf {
        self.data_dir.join("slack_response.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn with_root_places_everything_under_the_root() {
        let cfg = Config::with_root("/tmp/slackline-test");
        assert_eq!(
            cfg.registry_socket_path(),
            PathBuf::from("/tmp/slackline-test/sockets/registry.sock")
        );
        assert_eq!(
            cfg.session_socket_path("abc12345"),
            PathBuf::from("/tmp/slackline-test/sockets/abc12345.sock")
        );
        assert_eq!(
            cfg.buffer_file_path("abc12345"),
            PathBuf::from("/tmp/slackline-test/logs/claude_output_abc12345.txt")
        );
        assert_eq!(
            cfg.lines_file_path("abc12345"),
            PathBuf::from("/tmp/slackline-test/logs/claude_lines_abc12345.txt")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg = Config::with_root(tmp.path());
        cfg.ensure_dirs().expect("first");
        cfg.ensure_dirs().expect("second");
        assert!(cfg.socket_dir.is_dir());
        assert!(cfg.permission_response_dir().is_dir());
    }
}
