//! Typed views over the provider's event payloads.
//!
//! Chat events form a closed set of variants; the block-id prefix on
//! the parent message (`askuser_Q*` vs `permission_*`) is the
//! discriminator that later selects the downstream decoder.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub channel: String,
    pub channel_type: Option<String>,
    pub user: Option<String>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl MessageEvent {
    pub fn is_bot(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    pub fn is_dm(&self) -> bool {
        self.channel_type.as_deref() == Some("im")
    }

    /// Non-thread channel messages are forwarded only when they look
    /// like commands, so ambient channel chatter is not echoed into
    /// the agent.
    pub fn looks_like_command(&self) -> bool {
        let text = self.text.trim();
        text.starts_with('/')
            || text.starts_with('!')
            || (!text.is_empty() && text.chars().all(|c| c.is_ascii_digit()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MentionEvent {
    pub channel: String,
    pub user: Option<String>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

impl MentionEvent {
    /// Strip the leading `<@U...>` mention plus any separating
    /// punctuation.
    pub fn clean_text(&self) -> String {
        let text = match self.text.split_once('>') {
            Some((_, rest)) => rest,
            None => &self.text,
        };
        text.trim_start_matches([',', ':', ' ']).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub reaction: String,
    pub user: Option<String>,
    pub channel: String,
    pub message_ts: String,
}

/// One button click from an interactive payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockActionEvent {
    pub action_id: String,
    pub value: String,
    pub block_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub channel: String,
    pub message_ts: String,
    pub thread_ts: Option<String>,
    /// Blocks of the clicked message, for in-place updates.
    pub message_blocks: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Message(MessageEvent),
    AppMention(MentionEvent),
    ReactionAdded(ReactionEvent),
    BlockAction(BlockActionEvent),
}

/// Decode an Events API event object. Unknown event types yield `None`.
pub fn parse_event(event: &Value) -> Option<ChatEvent> {
    match event.get("type").and_then(Value::as_str)? {
        "message" => Some(ChatEvent::Message(MessageEvent {
            channel: str_of(event, "channel")?,
            channel_type: str_of(event, "channel_type"),
            user: str_of(event, "user"),
            text: str_of(event, "text").unwrap_or_default(),
            ts: str_of(event, "ts")?,
            thread_ts: str_of(event, "thread_ts"),
            bot_id: str_of(event, "bot_id"),
            subtype: str_of(event, "subtype"),
        })),
        "app_mention" => Some(ChatEvent::AppMention(MentionEvent {
            channel: str_of(event, "channel")?,
            user: str_of(event, "user"),
            text: str_of(event, "text").unwrap_or_default(),
            ts: str_of(event, "ts")?,
            thread_ts: str_of(event, "thread_ts"),
        })),
        "reaction_added" => Some(ChatEvent::ReactionAdded(ReactionEvent {
            reaction: str_of(event, "reaction")?,
            user: str_of(event, "user"),
            channel: event
                .pointer("/item/channel")
                .and_then(Value::as_str)?
                .to_string(),
            message_ts: event.pointer("/item/ts").and_then(Value::as_str)?.to_string(),
        })),
        _ => None,
    }
}

/// Decode an interactive payload (currently `block_actions` only).
pub fn parse_interactive(payload: &Value) -> Option<ChatEvent> {
    if payload.get("type").and_then(Value::as_str)? != "block_actions" {
        return None;
    }
    let action = payload.get("actions").and_then(Value::as_array)?.first()?;
    let message = payload.get("message")?;
    let message_ts = str_of(message, "ts")?;
    Some(ChatEvent::BlockAction(BlockActionEvent {
        action_id: str_of(action, "action_id")?,
        value: str_of(action, "value").unwrap_or_default(),
        block_id: str_of(action, "block_id"),
        user_id: payload.pointer("/user/id").and_then(Value::as_str).map(String::from),
        user_name: payload
            .pointer("/user/name")
            .and_then(Value::as_str)
            .map(String::from),
        channel: payload
            .pointer("/channel/id")
            .and_then(Value::as_str)?
            .to_string(),
        thread_ts: str_of(message, "thread_ts").or_else(|| Some(message_ts.clone())),
        message_ts,
        message_blocks: message.get("blocks").cloned().unwrap_or(Value::Null),
    }))
}

fn str_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_a_threaded_message() {
        let event = json!({
            "type": "message",
            "channel": "C1",
            "channel_type": "channel",
            "user": "U1",
            "text": "looks good",
            "ts": "3.4",
            "thread_ts": "1.2",
        });
        let Some(ChatEvent::Message(msg)) = parse_event(&event) else {
            panic!("expected message");
        };
        assert_eq!(msg.thread_ts.as_deref(), Some("1.2"));
        assert!(!msg.is_bot());
        assert!(!msg.is_dm());
    }

    #[test]
    fn bot_messages_are_flagged() {
        let event = json!({
            "type": "message",
            "channel": "C1",
            "text": "echo",
            "ts": "3.4",
            "bot_id": "B99",
        });
        let Some(ChatEvent::Message(msg)) = parse_event(&event) else {
            panic!("expected message");
        };
        assert!(msg.is_bot());
    }

    #[test]
    fn command_gating_accepts_slash_bang_and_digits() {
        let base = MessageEvent {
            channel: "C1".to_string(),
            channel_type: None,
            user: None,
            text: String::new(),
            ts: "1.1".to_string(),
            thread_ts: None,
            bot_id: None,
            subtype: None,
        };
        for (text, expect) in [
            ("/status", true),
            ("!rerun", true),
            ("2", true),
            ("42", true),
            ("hello there", false),
            ("what about 2", false),
        ] {
            let msg = MessageEvent {
                text: text.to_string(),
                ..base.clone()
            };
            assert_eq!(msg.looks_like_command(), expect, "text = {text:?}");
        }
    }

    #[test]
    fn mention_text_is_stripped_of_the_mention() {
        let mention = MentionEvent {
            channel: "C1".to_string(),
            user: Some("U1".to_string()),
            text: "<@U0BOT>, yes please".to_string(),
            ts: "1.1".to_string(),
            thread_ts: None,
        };
        assert_eq!(mention.clean_text(), "yes please");
    }

    #[test]
    fn parses_a_reaction_with_item_coordinates() {
        let event = json!({
            "type": "reaction_added",
            "reaction": "one",
            "user": "U1",
            "item": {"channel": "C1", "ts": "5.6"},
        });
        let Some(ChatEvent::ReactionAdded(reaction)) = parse_event(&event) else {
            panic!("expected reaction");
        };
        assert_eq!(reaction.reaction, "one");
        assert_eq!(reaction.message_ts, "5.6");
    }

    #[test]
    fn parses_a_block_action_click() {
        let payload = json!({
            "type": "block_actions",
            "user": {"id": "U1", "name": "dev"},
            "channel": {"id": "C1"},
            "message": {
                "ts": "7.8",
                "thread_ts": "1.2",
                "blocks": [{"type": "actions", "block_id": "permission_555"}],
            },
            "actions": [{
                "action_id": "permission_response_1",
                "block_id": "permission_555",
                "value": "1",
            }],
        });
        let Some(ChatEvent::BlockAction(click)) = parse_interactive(&payload) else {
            panic!("expected block action");
        };
        assert_eq!(click.action_id, "permission_response_1");
        assert_eq!(click.value, "1");
        assert_eq!(click.thread_ts.as_deref(), Some("1.2"));
        assert_eq!(click.block_id.as_deref(), Some("permission_555"));
    }

    #[test]
    fn top_level_click_falls_back_to_its_own_ts() {
        let payload = json!({
            "type": "block_actions",
            "channel": {"id": "C1"},
            "message": {"ts": "7.8"},
            "actions": [{"action_id": "permission_response_3", "value": "3"}],
        });
        let Some(ChatEvent::BlockAction(click)) = parse_interactive(&payload) else {
            panic!("expected block action");
        };
        assert_eq!(click.thread_ts.as_deref(), Some("7.8"));
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        assert_eq!(parse_event(&json!({"type": "team_join"})), None);
        assert_eq!(parse_interactive(&json!({"type": "view_submission"})), None);
    }
}
