//! The session table row and its satellites.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Lifecycle state of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Inactive,
    Ended,
    Crashed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
            SessionStatus::Inactive => "inactive",
            SessionStatus::Ended => "ended",
            SessionStatus::Crashed => "crashed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "idle" => Some(SessionStatus::Idle),
            "inactive" => Some(SessionStatus::Inactive),
            "ended" => Some(SessionStatus::Ended),
            "crashed" => Some(SessionStatus::Crashed),
            _ => None,
        }
    }

    /// Terminal states eligible for cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Crashed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered session. Two flavors of `session_id` coexist: the
/// 8-hex-char wrapper id minted at startup and the longer agent-minted
/// uuid discovered later. Both rows may point at the same chat thread;
/// the wrapper row is canonical for socket ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub project: String,
    #[serde(default)]
    pub project_dir: Option<String>,
    pub terminal: String,
    pub socket_path: String,
    /// Parent thread id; `None` means channel mode (top-level posts).
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub permissions_channel: Option<String>,
    #[serde(default)]
    pub slack_user_id: Option<String>,
    #[serde(default)]
    pub reply_to_ts: Option<String>,
    #[serde(default)]
    pub todo_message_ts: Option<String>,
    #[serde(default)]
    pub permission_message_ts: Option<String>,
    #[serde(default)]
    pub buffer_file_path: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// True for the short, wrapper-minted flavor of session id.
pub fn is_wrapper_id(session_id: &str) -> bool {
    session_id.len() == 8
}

/// Tie-break between rows sharing a thread id: the shortest session id
/// wins because only the wrapper row owns the control socket.
pub fn prefer_socket_owner(rows: &[SessionRecord]) -> Option<&SessionRecord> {
    rows.iter().min_by_key(|r| r.session_id.len())
}

/// Maps one chat user to the single session whose output they follow
/// in their DMs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DmSubscription {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub dm_channel_id: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user interaction mode; determines which system-prompt suffix a
/// forwarded message gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Plan,
    Research,
    #[default]
    Execute,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::Plan => "plan",
            InteractionMode::Research => "research",
            InteractionMode::Execute => "execute",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plan" => Some(InteractionMode::Plan),
            "research" => Some(InteractionMode::Research),
            "execute" => Some(InteractionMode::Execute),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(session_id: &str) -> SessionRecord {
        SessionRecord {
            session_id: session_id.to_string(),
            project: "demo".to_string(),
            project_dir: None,
            terminal: "tty".to_string(),
            socket_path: format!("/tmp/{session_id}.sock"),
            thread_ts: Some("111.222".to_string()),
            channel: Some("C1".to_string()),
            permissions_channel: None,
            slack_user_id: None,
            reply_to_ts: None,
            todo_message_ts: None,
            permission_message_ts: None,
            buffer_file_path: None,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            last_activity: Utc::now(),
        }
    }

    #[test]
    fn socket_owner_is_the_shortest_session_id() {
        let rows = vec![
            record("0c32e1a8-7c2f-44c5-b1d2-6a2fbb6d0a01"),
            record("0c32e1a8"),
            record("9f1b6f4e-aaaa-bbbb-cccc-dddddddddddd"),
        ];
        let owner = prefer_socket_owner(&rows).expect("owner");
        assert_eq!(owner.session_id, "0c32e1a8");
    }

    #[test]
    fn session_record_round_trips_through_json() {
        let mut original = record("abc12345");
        original.permissions_channel = Some("CPERM".to_string());
        original.todo_message_ts = Some("99.100".to_string());
        let json = serde_json::to_string(&original).expect("serialize");
        let parsed: SessionRecord = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, original);
    }

    #[test]
    fn session_record_tolerates_missing_optional_fields() {
        let raw = r#"{
            "session_id": "abc12345",
            "project": "demo",
            "terminal": "tty",
            "socket_path": "/tmp/abc12345.sock",
            "status": "active",
            "created_at": "2026-08-01T10:00:00Z",
            "last_activity": "2026-08-01T10:05:00Z"
        }"#;
        let parsed: SessionRecord = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.thread_ts, None);
        assert_eq!(parsed.channel, None);
        assert_eq!(parsed.status, SessionStatus::Active);
        assert!(parsed.created_at <= parsed.last_activity);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Idle,
            SessionStatus::Inactive,
            SessionStatus::Ended,
            SessionStatus::Crashed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("terminated"), None);
    }

    #[test]
    fn only_ended_and_crashed_are_terminal() {
        assert!(SessionStatus::Ended.is_terminal());
        assert!(SessionStatus::Crashed.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Inactive.is_terminal());
    }
}
