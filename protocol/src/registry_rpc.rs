//! Registry RPC wire protocol.
//!
//! One newline-terminated JSON request per connection, one
//! newline-terminated JSON response, then close:
//!
//! ```text
//! {"command": "REGISTER_SIMPLE", "data": {"session_id": "...", ...}}
//! {"success": true, "session": {...}}
//! ```

use serde::Deserialize;
use serde::Serialize;

use crate::session::SessionRecord;
use crate::session::SessionStatus;

/// Maximum accepted request size. Anything larger is rejected before
/// parsing.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegisterParams {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    pub terminal: String,
    #[serde(default)]
    pub socket_path: String,
    #[serde(default)]
    pub slack_user_id: Option<String>,
    /// Channel override; when present the session posts top-level
    /// messages there and gets no parent thread.
    #[serde(default)]
    pub custom_channel: Option<String>,
    #[serde(default)]
    pub permissions_channel: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub buffer_file_path: Option<String>,
}

impl RegisterParams {
    /// Names of required fields that are empty, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.session_id.is_empty() {
            missing.push("session_id");
        }
        if self.project.is_empty() {
            missing.push("project");
        }
        if self.terminal.is_empty() {
            missing.push("terminal");
        }
        if self.socket_path.is_empty() {
            missing.push("socket_path");
        }
        missing
    }
}

/// Parameters for `REGISTER_EXISTING`: a second row (typically the
/// agent's internal uuid) sharing chat metadata with an
/// already-registered wrapper row. No chat message is created.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegisterExistingParams {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub project_dir: Option<String>,
    #[serde(default)]
    pub terminal: Option<String>,
    #[serde(default)]
    pub socket_path: Option<String>,
    /// May be `None` in channel mode.
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
    pub buffer_file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", content = "data")]
pub enum RegistryRequest {
    /// Full registration; chat thread creation is deferred to a
    /// background task so startup latency is dominated only by the row
    /// insertion.
    #[serde(rename = "REGISTER")]
    Register(RegisterParams),

    /// Registration with synchronous chat thread creation; callers
    /// that need `thread_ts` immediately use this.
    #[serde(rename = "REGISTER_SIMPLE")]
    RegisterSimple(RegisterParams),

    #[serde(rename = "REGISTER_EXISTING")]
    RegisterExisting(RegisterExistingParams),

    #[serde(rename = "UNREGISTER")]
    Unregister {
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "GET")]
    Get {
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "LIST")]
    List {
        #[serde(default)]
        status: Option<SessionStatus>,
    },
}

impl RegistryRequest {
    /// Parse a raw request line. A missing `data` object is treated as
    /// empty, matching clients that omit it for `LIST`.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(line)?;
        if let Some(obj) = value.as_object_mut()
            && !obj.contains_key("data")
        {
            obj.insert("data".to_string(), serde_json::json!({}));
        }
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegistryResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionRecord>>,
}

impl RegistryResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_session(session: SessionRecord) -> Self {
        Self {
            success: true,
            session: Some(session),
            ..Default::default()
        }
    }

    pub fn with_sessions(sessions: Vec<SessionRecord>) -> Self {
        Self {
            success: true,
            sessions: Some(sessions),
            ..Default::default()
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}
