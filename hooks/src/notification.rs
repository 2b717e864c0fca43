//! Non-blocking permission card on agent notifications.
//!
//! When the agent rings its attention bell a permission prompt is
//! usually on screen. This hook re-reads the terminal buffer, parses
//! the exact options and posts a card whose button values are the
//! numeric strings the listener forwards straight to the control
//! socket — the terminal prompt itself stays in charge.

use tracing::info;
use tracing::warn;

use slackline_linelog::LineLogger;
use slackline_linelog::parse_permission_prompt;
use slackline_registry::SessionUpdate;
use slackline_slack::Block;
use slackline_slack::client::PostMessage;

use crate::context::HookContext;
use crate::permission::buttons_for_labels;
use crate::permission::canonical_button_labels;
use crate::permission::numbered_text_blocks;

pub async fn run(ctx: &HookContext) {
    let Some(slack) = ctx.slack() else { return };
    let Some(channel) = ctx.permission_channel() else {
        return;
    };

    let buffer_path = ctx.config.buffer_file_path(&ctx.input.session_id);
    let raw = match std::fs::read(&buffer_path) {
        Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).into_owned(),
        _ => {
            // Fall back to the registered buffer path.
            let Some(path) = &ctx.session.buffer_file_path else {
                return;
            };
            match std::fs::read(path) {
                Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).into_owned(),
                _ => return,
            }
        }
    };

    let logger = LineLogger::default();
    logger.add_data(raw.as_bytes());
    logger.add_data(b"\n");
    let Some(prompt) = parse_permission_prompt(&logger.get_all_lines()) else {
        info!("no permission prompt visible, nothing to post");
        return;
    };

    let request_id = chrono::Utc::now().timestamp_millis().to_string();
    let question = prompt
        .question
        .clone()
        .unwrap_or_else(|| "Permission required".to_string());

    let mut blocks = vec![Block::section(format!(
        "\u{26a0}\u{fe0f} *{question}*"
    ))];
    match canonical_button_labels(&prompt) {
        Some(labels) => blocks.push(buttons_for_labels(&labels, &request_id)),
        None => blocks.extend(numbered_text_blocks(&prompt)),
    }

    let posted = match slack
        .post_message(&PostMessage {
            channel,
            text: question,
            thread_ts: ctx.session.thread_ts.clone(),
            blocks: Some(blocks),
        })
        .await
    {
        Ok(posted) => posted,
        Err(e) => {
            warn!("failed to post notification card: {e}");
            return;
        }
    };

    let update = SessionUpdate {
        permission_message_ts: Some(posted.ts),
        ..Default::default()
    };
    let _ = ctx.db.update_session(&ctx.input.session_id, &update);
    info!("posted permission card with {} options", prompt.options.len());
}
