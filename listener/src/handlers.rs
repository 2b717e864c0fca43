//! Event handlers. One handler task per event; a malformed event is
//! logged and dropped, never allowed to take the loop down.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_common::Config;
use slackline_protocol::interact::ASKUSER_BLOCK_PREFIX;
use slackline_protocol::interact::PERMISSION_ACTION_PREFIX;
use slackline_protocol::interact::PERMISSION_BLOCK_PREFIX;
use slackline_protocol::interact::emoji_to_option_index;
use slackline_protocol::interact::emoji_to_permission_digit;
use slackline_protocol::interact::parse_askuser_block_id;
use slackline_protocol::response_file::PermissionChoice;
use slackline_protocol::response_file::PermissionResponse;
use slackline_protocol::response_file::question_key;
use slackline_protocol::response_file::response_file_path;
use slackline_registry::RegistryDb;
use slackline_slack::Block;
use slackline_slack::SlackClient;
use slackline_slack::client::PostMessage;
use slackline_transcript::Role;
use slackline_transcript::Transcript;
use slackline_transcript::transcript_path;

use crate::dm::DmCommand;
use crate::dm::format_session_list;
use crate::dm::parse_dm_command;
use crate::events::BlockActionEvent;
use crate::events::ChatEvent;
use crate::events::MentionEvent;
use crate::events::MessageEvent;
use crate::events::ReactionEvent;
use crate::respond::accumulate_askuser_response;
use crate::respond::write_permission_response;
use crate::routing::Router;
use crate::routing::SendMode;

/// A deny click in thread mode awaits a feedback reply before the
/// decision is forwarded.
#[derive(Debug, Clone)]
struct PendingDeny {
    session_id: Option<String>,
    request_id: Option<String>,
    channel: String,
    message_ts: String,
}

pub struct Listener {
    db: RegistryDb,
    slack: SlackClient,
    router: Router,
    config: Config,
    bot_user_id: Option<String>,
    pending_deny: Mutex<HashMap<String, PendingDeny>>,
}

impl Listener {
    pub fn new(
        db: RegistryDb,
        slack: SlackClient,
        config: Config,
        bot_user_id: Option<String>,
    ) -> Self {
        let router = Router::new(db.clone(), config.clone());
        Self {
            db,
            slack,
            router,
            config,
            bot_user_id,
            pending_deny: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message(msg) => self.handle_message(msg).await,
            ChatEvent::AppMention(mention) => self.handle_mention(mention).await,
            ChatEvent::ReactionAdded(reaction) => self.handle_reaction(reaction).await,
            ChatEvent::BlockAction(click) => self.handle_block_action(click).await,
        }
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn handle_message(&self, msg: MessageEvent) {
        if msg.is_bot() || msg.text.trim().is_empty() {
            return;
        }

        if msg.is_dm() {
            if let Some(command) = parse_dm_command(&msg.text) {
                self.handle_dm_command(&msg, command).await;
                return;
            }
        } else if msg.thread_ts.is_none() && !msg.looks_like_command() {
            // Ambient channel chatter is not echoed into the agent.
            return;
        }

        // A thread reply may be the feedback a deny click is waiting
        // for.
        if let Some(thread_ts) = &msg.thread_ts
            && let Some(pending) = self.take_pending_deny(thread_ts)
        {
            self.finish_deny(&msg, thread_ts, pending).await;
            return;
        }

        let mode = self
            .router
            .send_response(&msg.text, msg.thread_ts.as_deref(), Some(&msg.channel))
            .await;
        self.acknowledge(&msg.channel, &msg.ts).await;
        self.confirm_forward(&msg.channel, msg.thread_ts.as_deref(), &msg.text, mode)
            .await;
        info!("forwarded message via {mode:?}");
    }

    async fn handle_mention(&self, mention: MentionEvent) {
        let text = mention.clean_text();
        if text.is_empty() {
            let _ = self
                .slack
                .post_message(&PostMessage {
                    channel: mention.channel.clone(),
                    text: "\u{1f44b} Hi! Send me a message and I'll forward it to the session."
                        .to_string(),
                    thread_ts: mention.thread_ts.clone(),
                    blocks: None,
                })
                .await;
            return;
        }
        let mode = self
            .router
            .send_response(&text, mention.thread_ts.as_deref(), Some(&mention.channel))
            .await;
        self.acknowledge(&mention.channel, &mention.ts).await;
        self.confirm_forward(&mention.channel, mention.thread_ts.as_deref(), &text, mode)
            .await;
    }

    // ── Reactions ───────────────────────────────────────────────────

    async fn handle_reaction(&self, reaction: ReactionEvent) {
        if reaction.user.is_some() && reaction.user == self.bot_user_id {
            return;
        }

        // The parent message's block ids discriminate the decoder.
        let parent = match self
            .slack
            .fetch_message(&reaction.channel, &reaction.message_ts)
            .await
        {
            Ok(parent) => parent,
            Err(e) => {
                debug!("could not fetch reacted message: {e}");
                None
            }
        };

        if let Some(parent) = &parent
            && let Some(block_ref) = first_askuser_block(parent)
        {
            self.handle_askuser_reaction(&reaction, parent, block_ref)
                .await;
            return;
        }

        let Some(digit) = emoji_to_permission_digit(&reaction.reaction) else {
            return;
        };

        // Route by the parent thread; a reaction on a reply resolves to
        // the reply's parent.
        let thread_ts = parent
            .as_ref()
            .and_then(|m| m.get("thread_ts").and_then(Value::as_str))
            .unwrap_or(&reaction.message_ts)
            .to_string();

        let mode = self
            .router
            .send_response(digit, Some(&thread_ts), Some(&reaction.channel))
            .await;
        info!(
            "reaction {} -> sent '{digit}' via {mode:?}",
            reaction.reaction
        );

        // A blocking permission hook announces itself by storing the
        // prompt's message ts; only then is a response file expected.
        if let Some(parent) = &parent {
            let blocks = parent.get("blocks").cloned().unwrap_or(Value::Null);
            self.maybe_write_permission_file(parent, &blocks, &thread_ts, &reaction.message_ts, digit)
                .await;
        }
        self.acknowledge(&reaction.channel, &reaction.message_ts).await;
    }

    async fn handle_askuser_reaction(
        &self,
        reaction: &ReactionEvent,
        parent: &Value,
        block_ref: slackline_protocol::interact::AskUserBlockRef,
    ) {
        let Some(option_index) = emoji_to_option_index(&reaction.reaction) else {
            return;
        };
        let response_file = response_file_path(
            &self.config.askuser_response_dir(),
            &block_ref.session_id,
            &block_ref.request_id,
        );

        // Reactions land on the message, not a block; assign the answer
        // to the first unanswered question, or accumulate multi-select
        // indices onto the last one once every question has a value.
        let num_questions = count_askuser_blocks(parent).max(1);
        let answered: serde_json::Map<String, Value> = std::fs::read_to_string(&response_file)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let target = (0..num_questions)
            .find(|i| !answered.contains_key(&question_key(*i)))
            .unwrap_or(num_questions - 1);

        if let Err(e) = accumulate_askuser_response(
            &response_file,
            &question_key(target),
            Value::from(option_index.to_string()),
            reaction.user.as_deref(),
            None,
        ) {
            warn!("failed to accumulate answer: {e}");
            return;
        }
        info!(
            "recorded option {} for question {} of {}",
            option_index + 1,
            target,
            block_ref.session_id
        );

        // Show the selection on the prompt message.
        let note = format!(
            "\u{2705} <@{}> picked option {} for question {}",
            reaction.user.as_deref().unwrap_or("someone"),
            option_index + 1,
            target + 1
        );
        if let Ok(mut blocks) = serde_json::from_value::<Vec<Block>>(
            parent.get("blocks").cloned().unwrap_or(Value::Null),
        ) {
            blocks.push(Block::context(note.clone()));
            let text = parent
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or(&note)
                .to_string();
            if let Err(e) = self
                .slack
                .update_message(&reaction.channel, &reaction.message_ts, &text, Some(blocks))
                .await
            {
                debug!("could not update prompt message: {e}");
            }
        }
        self.acknowledge(&reaction.channel, &reaction.message_ts).await;
    }

    // ── Button clicks ───────────────────────────────────────────────

    async fn handle_block_action(&self, click: BlockActionEvent) {
        if !click.action_id.starts_with(PERMISSION_ACTION_PREFIX) {
            debug!("ignoring action {}", click.action_id);
            return;
        }
        let digit = click.value.clone();
        if digit.is_empty() {
            return;
        }
        let thread_ts = click.thread_ts.clone().unwrap_or(click.message_ts.clone());

        // Thread mode is "this thread resolves to a session"; a deny
        // there asks for feedback before anything is forwarded.
        let thread_session = self.router.session_for_thread(&thread_ts);
        if digit == "3" && thread_session.is_some() && thread_ts != click.message_ts {
            self.start_deny_feedback(&click, &thread_ts, thread_session)
                .await;
            return;
        }

        let mode = self
            .router
            .send_response(&digit, Some(&thread_ts), Some(&click.channel))
            .await;
        info!(
            "button '{digit}' from {} -> sent via {mode:?}",
            click.user_name.as_deref().unwrap_or("unknown")
        );

        self.maybe_write_permission_file_for_click(&click, &thread_ts, &digit)
            .await;
        self.show_button_selection(&click, &digit).await;
    }

    async fn start_deny_feedback(
        &self,
        click: &BlockActionEvent,
        thread_ts: &str,
        session_id: Option<String>,
    ) {
        let request_id = click
            .block_id
            .as_deref()
            .and_then(|id| id.strip_prefix(PERMISSION_BLOCK_PREFIX))
            .map(str::to_string);
        {
            #[allow(clippy::unwrap_used)]
            let mut pending = self.pending_deny.lock().unwrap();
            pending.insert(
                thread_ts.to_string(),
                PendingDeny {
                    session_id,
                    request_id,
                    channel: click.channel.clone(),
                    message_ts: click.message_ts.clone(),
                },
            );
        }
        let text = format!(
            "\u{270b} <@{}> denied. Reply in this thread with what should happen instead.",
            click.user_id.as_deref().unwrap_or("someone")
        );
        if let Err(e) = self
            .slack
            .update_message(&click.channel, &click.message_ts, &text, None)
            .await
        {
            debug!("could not update message for deny feedback: {e}");
        }
    }

    fn take_pending_deny(&self, thread_ts: &str) -> Option<PendingDeny> {
        #[allow(clippy::unwrap_used)]
        let mut pending = self.pending_deny.lock().unwrap();
        pending.remove(thread_ts)
    }

    async fn finish_deny(&self, msg: &MessageEvent, thread_ts: &str, pending: PendingDeny) {
        // A blocking hook gets the reason through its response file;
        // the terminal path gets the option digit followed by the
        // feedback text.
        if let (Some(session_id), Some(request_id)) = (&pending.session_id, &pending.request_id) {
            let file = response_file_path(
                &self.config.permission_response_dir(),
                session_id,
                request_id,
            );
            if let Err(e) = write_permission_response(
                &file,
                &PermissionResponse {
                    decision: PermissionChoice::Deny,
                    reason: Some(msg.text.clone()),
                },
            ) {
                warn!("failed to write deny response: {e}");
            }
        } else {
            self.router
                .send_response("3", Some(thread_ts), Some(&msg.channel))
                .await;
            self.router
                .send_response(&msg.text, Some(thread_ts), Some(&msg.channel))
                .await;
        }
        let _ = self
            .slack
            .update_message(
                &pending.channel,
                &pending.message_ts,
                "\u{274c} Denied with feedback",
                None,
            )
            .await;
        self.acknowledge(&msg.channel, &msg.ts).await;
    }

    /// Write the decision file when (and only when) a blocking hook is
    /// waiting on this exact prompt message.
    async fn maybe_write_permission_file(
        &self,
        parent: &Value,
        blocks: &Value,
        thread_ts: &str,
        message_ts: &str,
        digit: &str,
    ) {
        let Some(request_id) = first_permission_request_id(parent) else {
            return;
        };
        let Some(session_id) = self.router.session_for_thread(thread_ts) else {
            return;
        };
        self.write_permission_file_if_pending(&session_id, &request_id, message_ts, digit, blocks)
            .await;
    }

    async fn maybe_write_permission_file_for_click(
        &self,
        click: &BlockActionEvent,
        thread_ts: &str,
        digit: &str,
    ) {
        let Some(request_id) = click
            .block_id
            .as_deref()
            .and_then(|id| id.strip_prefix(PERMISSION_BLOCK_PREFIX))
        else {
            return;
        };
        let Some(session_id) = self.router.session_for_thread(thread_ts) else {
            return;
        };
        self.write_permission_file_if_pending(
            &session_id,
            request_id,
            &click.message_ts,
            digit,
            &click.message_blocks,
        )
        .await;
    }

    async fn write_permission_file_if_pending(
        &self,
        session_id: &str,
        request_id: &str,
        message_ts: &str,
        digit: &str,
        blocks: &Value,
    ) {
        let waiting = self
            .db
            .get_session(session_id)
            .ok()
            .flatten()
            .and_then(|s| s.permission_message_ts)
            .is_some_and(|ts| ts == message_ts);
        if !waiting {
            return;
        }
        let decision = decision_for_digit(blocks, digit);
        let file = response_file_path(
            &self.config.permission_response_dir(),
            session_id,
            request_id,
        );
        if let Err(e) = write_permission_response(
            &file,
            &PermissionResponse {
                decision,
                reason: None,
            },
        ) {
            warn!("failed to write permission response: {e}");
        } else {
            info!("wrote permission decision for {session_id}/{request_id}");
        }
    }

    async fn show_button_selection(&self, click: &BlockActionEvent, digit: &str) {
        let label = selected_button_label(&click.message_blocks, digit)
            .unwrap_or_else(|| format!("Option {digit}"));
        let text = format!(
            "\u{2705} *<@{}> selected:* {label}",
            click.user_id.as_deref().unwrap_or("someone")
        );
        if let Err(e) = self
            .slack
            .update_message(&click.channel, &click.message_ts, &text, None)
            .await
        {
            debug!("could not update message after click: {e}");
        }
    }

    // ── DM commands ─────────────────────────────────────────────────

    async fn handle_dm_command(&self, msg: &MessageEvent, command: DmCommand) {
        let reply = |text: String| {
            let slack = self.slack.clone();
            let channel = msg.channel.clone();
            async move {
                let _ = slack
                    .post_message(&PostMessage {
                        channel,
                        text,
                        thread_ts: None,
                        blocks: None,
                    })
                    .await;
            }
        };

        match command {
            DmCommand::Sessions => {
                let sessions = self
                    .db
                    .list_sessions(Some(slackline_protocol::SessionStatus::Active))
                    .unwrap_or_default();
                reply(format_session_list(&sessions)).await;
            }
            DmCommand::Attach {
                session_id,
                history_count,
            } => {
                let Some(user) = msg.user.clone() else { return };
                let session = match self.db.get_session(&session_id) {
                    Ok(Some(session)) if !session.status.is_terminal() => session,
                    Ok(Some(_)) => {
                        reply(format!("Session `{session_id}` has already ended")).await;
                        return;
                    }
                    _ => {
                        reply(format!("Session `{session_id}` not found")).await;
                        return;
                    }
                };
                if let Err(e) =
                    self.db
                        .create_dm_subscription(&user, &session_id, &msg.channel)
                {
                    warn!("failed to create subscription: {e}");
                    return;
                }
                reply(format!(
                    "\u{1f4ce} Attached to *{}* (`{session_id}`)",
                    session.project
                ))
                .await;
                if let Some(n) = history_count {
                    self.replay_history(&msg.channel, &session_id, session.project_dir.as_deref(), n)
                        .await;
                }
            }
            DmCommand::Detach => {
                let Some(user) = msg.user.clone() else { return };
                let removed = self.db.delete_dm_subscription(&user).unwrap_or(false);
                if removed {
                    reply("\u{1f4f4} Detached".to_string()).await;
                } else {
                    reply("No active subscription".to_string()).await;
                }
            }
            DmCommand::ModeShow => {
                let Some(user) = msg.user.clone() else { return };
                let mode = self.db.get_user_mode(&user).unwrap_or_default();
                reply(format!("Current mode: *{}*", mode.as_str())).await;
            }
            DmCommand::ModeSet(mode) => {
                let Some(user) = msg.user.clone() else { return };
                match self.db.set_user_mode(&user, &mode) {
                    Ok(mode) => reply(format!("Mode set to *{}*", mode.as_str())).await,
                    Err(e) => reply(e.to_string()).await,
                }
            }
            DmCommand::Usage(usage) => reply(usage).await,
        }
    }

    async fn replay_history(
        &self,
        dm_channel: &str,
        session_id: &str,
        project_dir: Option<&str>,
        count: usize,
    ) {
        let Some(project_dir) = project_dir else { return };
        let Some(path) = transcript_path(session_id, project_dir) else {
            return;
        };
        let Ok(transcript) = Transcript::load(&path) else {
            debug!("no transcript at {}", path.display());
            return;
        };
        let mut lines = Vec::new();
        for message in transcript.recent_messages(count) {
            let prefix = match message.role {
                Role::User => "\u{1f464}",
                Role::Assistant => "\u{1f916}",
            };
            lines.push(format!("{prefix} {}", message.text));
        }
        if lines.is_empty() {
            return;
        }
        let _ = self
            .slack
            .post_message(&PostMessage {
                channel: dm_channel.to_string(),
                text: lines.join("\n\n"),
                thread_ts: None,
                blocks: None,
            })
            .await;
    }

    // ── Small helpers ───────────────────────────────────────────────

    async fn acknowledge(&self, channel: &str, ts: &str) {
        if let Err(e) = self.slack.add_reaction(channel, ts, "white_check_mark").await {
            debug!("could not add reaction: {e}");
        }
    }

    async fn confirm_forward(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
        mode: SendMode,
    ) {
        let mode_emoji = match mode {
            SendMode::RegistrySocket => "\u{1f4cb}",
            SendMode::LegacySocket => "\u{26a1}",
            SendMode::File => "\u{1f4c1}",
        };
        let preview: String = text.chars().take(100).collect();
        let confirm = format!("\u{2705} {mode_emoji} Got it! Sent to the session: `{preview}`");
        let _ = self
            .slack
            .post_message(&PostMessage {
                channel: channel.to_string(),
                text: confirm,
                thread_ts: thread_ts.map(String::from),
                blocks: None,
            })
            .await;
    }
}

/// First `askuser_Q*` block id on a message, parsed.
fn first_askuser_block(
    message: &Value,
) -> Option<slackline_protocol::interact::AskUserBlockRef> {
    message
        .get("blocks")?
        .as_array()?
        .iter()
        .filter_map(|b| b.get("block_id").and_then(Value::as_str))
        .find(|id| id.starts_with(ASKUSER_BLOCK_PREFIX))
        .and_then(parse_askuser_block_id)
}

fn count_askuser_blocks(message: &Value) -> usize {
    message
        .get("blocks")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("block_id").and_then(Value::as_str))
                .filter(|id| id.starts_with(ASKUSER_BLOCK_PREFIX))
                .count()
        })
        .unwrap_or(0)
}

/// Request id from the first `permission_<rid>` block id on a message.
fn first_permission_request_id(message: &Value) -> Option<String> {
    message
        .get("blocks")?
        .as_array()?
        .iter()
        .filter_map(|b| b.get("block_id").and_then(Value::as_str))
        .find_map(|id| {
            if id.starts_with(ASKUSER_BLOCK_PREFIX) {
                return None;
            }
            id.strip_prefix(PERMISSION_BLOCK_PREFIX).map(str::to_string)
        })
}

/// Map a numeric choice onto a decision. The option wording on the
/// prompt message is authoritative: a 2-option prompt's "2" is a deny,
/// not an allow-always. Without a matching label the 3-option table
/// applies.
fn decision_for_digit(blocks: &Value, digit: &str) -> PermissionChoice {
    if let Some(label) = selected_button_label(blocks, digit) {
        let lower = label.to_lowercase();
        if lower.contains("no") || lower.contains("deny") {
            return PermissionChoice::Deny;
        }
        if lower.contains("always") || lower.contains("allow all") {
            return PermissionChoice::AllowAlways;
        }
        return PermissionChoice::Allow;
    }
    match digit {
        "1" => PermissionChoice::Allow,
        "2" => PermissionChoice::AllowAlways,
        _ => PermissionChoice::Deny,
    }
}

/// Label of the button whose value matches `digit`, from the clicked
/// message's blocks.
fn selected_button_label(blocks: &Value, digit: &str) -> Option<String> {
    for block in blocks.as_array()? {
        if block.get("type").and_then(Value::as_str) != Some("actions") {
            continue;
        }
        for element in block.get("elements")?.as_array()? {
            if element.get("value").and_then(Value::as_str) == Some(digit) {
                return element
                    .pointer("/text/text")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn askuser_block_is_found_among_plain_blocks() {
        let message = json!({
            "blocks": [
                {"type": "section", "text": {"type": "mrkdwn", "text": "intro"}},
                {"type": "section", "block_id": "askuser_Q0_S_R", "text": {}},
                {"type": "section", "block_id": "askuser_Q1_S_R", "text": {}},
            ],
        });
        let block_ref = first_askuser_block(&message).expect("ref");
        assert_eq!(block_ref.question_index, 0);
        assert_eq!(block_ref.session_id, "S");
        assert_eq!(count_askuser_blocks(&message), 2);
    }

    #[test]
    fn permission_request_id_is_extracted() {
        let message = json!({
            "blocks": [
                {"type": "section", "text": {}},
                {"type": "actions", "block_id": "permission_1731500000123", "elements": []},
            ],
        });
        assert_eq!(
            first_permission_request_id(&message).as_deref(),
            Some("1731500000123")
        );
    }

    #[test]
    fn askuser_blocks_are_not_mistaken_for_permission_blocks() {
        // `askuser_Q...` does not start with `permission_`, but guard
        // the discriminator anyway.
        let message = json!({
            "blocks": [{"type": "section", "block_id": "askuser_Q0_S_R"}],
        });
        assert_eq!(first_permission_request_id(&message), None);
    }

    #[test]
    fn two_option_deny_maps_by_label_not_by_table() {
        let blocks = json!([
            {"type": "actions", "elements": [
                {"type": "button", "value": "1", "text": {"type": "plain_text", "text": "1. Yes"}},
                {"type": "button", "value": "2", "text": {"type": "plain_text", "text": "2. No"}},
            ]},
        ]);
        assert_eq!(decision_for_digit(&blocks, "2"), PermissionChoice::Deny);
        assert_eq!(decision_for_digit(&blocks, "1"), PermissionChoice::Allow);

        let three = json!([
            {"type": "actions", "elements": [
                {"type": "button", "value": "2",
                 "text": {"type": "plain_text", "text": "2. Yes, allow all edits..."}},
            ]},
        ]);
        assert_eq!(
            decision_for_digit(&three, "2"),
            PermissionChoice::AllowAlways
        );

        // No labels available: the fixed table applies.
        assert_eq!(
            decision_for_digit(&Value::Null, "2"),
            PermissionChoice::AllowAlways
        );
        assert_eq!(decision_for_digit(&Value::Null, "3"), PermissionChoice::Deny);
    }

    #[test]
    fn selected_label_comes_from_the_matching_button() {
        let blocks = json!([
            {"type": "section"},
            {"type": "actions", "elements": [
                {"type": "button", "value": "1", "text": {"type": "plain_text", "text": "1. Yes"}},
                {"type": "button", "value": "3", "text": {"type": "plain_text", "text": "3. No"}},
            ]},
        ]);
        assert_eq!(
            selected_button_label(&blocks, "3").as_deref(),
            Some("3. No")
        );
        assert_eq!(selected_button_label(&blocks, "2"), None);
    }
}
