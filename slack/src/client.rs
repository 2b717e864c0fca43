//! Thin Slack Web API client.
//!
//! Every call is a JSON POST to `https://slack.com/api/<method>` with a
//! bearer token; Slack signals failure in-band with `{"ok": false,
//! "error": "<code>"}`, which is surfaced as [`SlackError::Api`] so
//! callers can translate provider codes into actionable guidance.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::blocks::Block;

pub type Result<T> = std::result::Result<T, SlackError>;

#[derive(thiserror::Error, Debug)]
pub enum SlackError {
    /// In-band API error code, e.g. `missing_scope` or `message_not_found`.
    #[error("slack api error: {0}")]
    Api(String),

    #[error("{0}")]
    Unusable(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SlackError {
    /// The provider error code, when this is an in-band API error.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            SlackError::Api(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PostedMessage {
    pub ts: String,
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_member: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct PostMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
}

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
}

const API_BASE: &str = "https://slack.com/api";

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_timeout(token, Duration::from_secs(10))
    }

    /// The registry registers sessions on the wrapper's startup path,
    /// so it uses a short timeout to keep chat hiccups from stalling
    /// registration.
    pub fn with_timeout(token: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            token: token.into(),
        }
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let url = format!("{API_BASE}/{method}");
        let body: Value = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(body)
        } else {
            let code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            debug!(method, %code, "slack api call failed");
            Err(SlackError::Api(code))
        }
    }

    /// Post a message, optionally as a thread reply and/or with blocks.
    pub async fn post_message(&self, message: &PostMessage) -> Result<PostedMessage> {
        let body = self.call("chat.postMessage", serde_json::to_value(message)?).await?;
        Ok(PostedMessage {
            ts: str_field(&body, "ts")?,
            channel: str_field(&body, "channel")?,
        })
    }

    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Option<Vec<Block>>,
    ) -> Result<()> {
        let mut payload = json!({"channel": channel, "ts": ts, "text": text});
        if let Some(blocks) = blocks {
            payload["blocks"] = serde_json::to_value(blocks)?;
        } else {
            // An explicit empty list clears any previous blocks.
            payload["blocks"] = json!([]);
        }
        self.call("chat.update", payload).await?;
        Ok(())
    }

    pub async fn delete_message(&self, channel: &str, ts: &str) -> Result<()> {
        self.call("chat.delete", json!({"channel": channel, "ts": ts}))
            .await?;
        Ok(())
    }

    pub async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<()> {
        self.call(
            "reactions.add",
            json!({"channel": channel, "timestamp": ts, "name": name}),
        )
        .await?;
        Ok(())
    }

    /// Fetch exactly the message at `ts`, used to resolve a reply's
    /// parent thread.
    pub async fn fetch_message(&self, channel: &str, ts: &str) -> Result<Option<Value>> {
        let body = self
            .call(
                "conversations.history",
                json!({
                    "channel": channel,
                    "latest": ts,
                    "inclusive": true,
                    "limit": 1,
                }),
            )
            .await?;
        Ok(body
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|m| m.first())
            .cloned())
    }

    /// One page of channels plus the next cursor, if any.
    pub async fn list_channels(
        &self,
        cursor: Option<&str>,
    ) -> Result<(Vec<ChannelInfo>, Option<String>)> {
        let mut payload = json!({
            "types": "public_channel,private_channel",
            "limit": 200,
        });
        if let Some(cursor) = cursor {
            payload["cursor"] = json!(cursor);
        }
        let body = self.call("conversations.list", payload).await?;
        let channels = body
            .get("channels")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let next = body
            .pointer("/response_metadata/next_cursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Ok((channels, next))
    }

    pub async fn join_channel(&self, channel: &str) -> Result<()> {
        self.call("conversations.join", json!({"channel": channel}))
            .await?;
        Ok(())
    }

    pub async fn create_channel(&self, name: &str) -> Result<ChannelInfo> {
        let body = self
            .call(
                "conversations.create",
                json!({"name": name, "is_private": false}),
            )
            .await?;
        let channel = body
            .get("channel")
            .cloned()
            .ok_or_else(|| SlackError::Api("invalid_response".to_string()))?;
        Ok(serde_json::from_value(channel)?)
    }

    /// DM channel id for a user.
    pub async fn open_dm(&self, user: &str) -> Result<String> {
        let body = self
            .call("conversations.open", json!({"users": user}))
            .await?;
        body.pointer("/channel/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SlackError::Api("invalid_response".to_string()))
    }

    /// The bot's own user id, used to ignore self-authored events.
    pub async fn auth_test(&self) -> Result<String> {
        let body = self.call("auth.test", json!({})).await?;
        str_field(&body, "user_id")
    }

    /// Open a Socket Mode connection; returns the wss URL. Requires the
    /// app-level token, not the bot token.
    pub async fn connections_open(&self) -> Result<String> {
        let body = self.call("apps.connections.open", json!({})).await?;
        str_field(&body, "url")
    }
}

fn str_field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SlackError::Api(format!("missing `{key}` in response")))
}

/// Translate channel-setup provider codes into error strings that name
/// the missing capability instead of leaking provider jargon.
pub fn describe_channel_error(channel_name: &str, err: &SlackError) -> String {
    match err.api_code() {
        Some("name_taken") => format!(
            "Channel '{channel_name}' exists but the bot cannot join it. \
             Invite the bot manually or grant the channels:join capability."
        ),
        Some(code) if code.contains("missing_scope") || code.contains("not_allowed") => format!(
            "Cannot set up channel '{channel_name}': the bot lacks the \
             channels:manage capability to create it (or channels:join to \
             join it). Grant the scope or create the channel manually and \
             invite the bot."
        ),
        Some("channel_not_found") => format!(
            "Channel '{channel_name}' not found and it cannot be created \
             without the channels:manage capability. Create it manually or \
             grant the scope."
        ),
        Some("invalid_name") => format!(
            "Invalid channel name '{channel_name}'. Channel names must be \
             lowercase, at most 80 characters, using only letters, numbers, \
             hyphens, and underscores."
        ),
        _ => format!("Failed to set up channel '{channel_name}': {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn post_message_omits_absent_thread_and_blocks() {
        let msg = PostMessage {
            channel: "C1".to_string(),
            text: "hi".to_string(),
            thread_ts: None,
            blocks: None,
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json, serde_json::json!({"channel": "C1", "text": "hi"}));
    }

    #[test]
    fn channel_errors_name_the_missing_capability() {
        let msg = describe_channel_error("ops", &SlackError::Api("missing_scope".to_string()));
        assert!(msg.contains("channels:manage"));
        assert!(!msg.contains("missing_scope"));

        let msg = describe_channel_error("ops", &SlackError::Api("name_taken".to_string()));
        assert!(msg.contains("channels:join"));
    }

    #[test]
    fn api_code_is_exposed_for_api_errors_only() {
        assert_eq!(
            SlackError::Api("message_not_found".to_string()).api_code(),
            Some("message_not_found")
        );
        assert_eq!(
            SlackError::Unusable("no token".to_string()).api_code(),
            None
        );
    }
}
