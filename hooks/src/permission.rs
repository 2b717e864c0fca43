//! Blocking permission-prompt hook.
//!
//! Invoked when the agent is about to request permission for a tool.
//! The exact option wording only exists in the terminal rendering, so
//! the raw output buffer is re-read and back-parsed; interactive
//! buttons are rendered only for the two canonical option shapes, since
//! a mismatch between button index and underlying option index would be
//! dangerous.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_common::flags;
use slackline_linelog::LineLogger;
use slackline_linelog::PermissionPrompt;
use slackline_linelog::parse_permission_prompt;
use slackline_linelog::strip_ansi;
use slackline_protocol::hook_io::HookOutput;
use slackline_protocol::interact::NUMBER_EMOJIS;
use slackline_protocol::interact::permission_action_id;
use slackline_protocol::interact::permission_block_id;
use slackline_protocol::response_file::PermissionChoice;
use slackline_protocol::response_file::response_file_path;
use slackline_registry::SessionUpdate;
use slackline_slack::Block;
use slackline_slack::ButtonElement;
use slackline_slack::client::PostMessage;

use crate::context::HookContext;
use crate::format::describe_tool_input;
use crate::respond::cleanup_stale_response_files;
use crate::respond::remove_response_file;
use crate::respond::wait_for_permission_response;

const EVENT_NAME: &str = "PermissionRequest";
const BUFFER_READ_RETRIES: usize = 5;
const BUFFER_READ_SLEEP: Duration = Duration::from_millis(100);
const PROMPT_TEXT_LIMIT: usize = 2500;

/// Run the hook; the returned string, if any, is the decision document
/// to print on stdout.
pub async fn run(ctx: &HookContext) -> Option<String> {
    cleanup_stale_response_files(&ctx.config.permission_response_dir());

    let slack = ctx.slack()?;
    let channel = ctx.permission_channel()?;
    let request_id = chrono::Utc::now().timestamp_millis().to_string();
    let response_file = response_file_path(
        &ctx.config.permission_response_dir(),
        &ctx.input.session_id,
        &request_id,
    );

    let raw_buffer = read_terminal_buffer(ctx).await;
    let prompt = raw_buffer.as_deref().and_then(parse_buffer);
    info!(
        "tool {:?}, parsed options: {}",
        ctx.input.tool_name,
        prompt.as_ref().map(|p| p.options.len()).unwrap_or(0)
    );

    let blocks = build_prompt_blocks(ctx, raw_buffer.as_deref(), prompt.as_ref(), &request_id);
    let tool_name = ctx.input.tool_name.clone().unwrap_or_default();
    let posted = match slack
        .post_message(&PostMessage {
            channel,
            text: format!("\u{26a0}\u{fe0f} Permission Required: {tool_name}"),
            thread_ts: None,
            blocks: Some(blocks),
        })
        .await
    {
        Ok(posted) => posted,
        Err(e) => {
            warn!("failed to post permission prompt, terminal takes over: {e}");
            return None;
        }
    };

    // Announce the pending prompt; the listener writes the response
    // file only for prompts whose message ts is recorded here.
    let update = SessionUpdate {
        permission_message_ts: Some(posted.ts.clone()),
        ..Default::default()
    };
    let _ = ctx.db.update_session(&ctx.input.session_id, &update);

    let timeout = *flags::PERMISSION_TIMEOUT;
    let response = wait_for_permission_response(&response_file, timeout).await;
    remove_response_file(&response_file);

    let response = response?;
    let output = match response.decision {
        PermissionChoice::Allow | PermissionChoice::AllowAlways => HookOutput::allow(EVENT_NAME),
        PermissionChoice::Deny => HookOutput::deny(
            EVENT_NAME,
            response
                .reason
                .unwrap_or_else(|| "User denied permission via chat".to_string()),
        ),
    };
    serde_json::to_string(&output).ok()
}

/// Read this session's raw output buffer, waiting briefly for the
/// prompt to finish rendering. Returns the raw bytes (ANSI intact)
/// decoded lossily.
async fn read_terminal_buffer(ctx: &HookContext) -> Option<String> {
    let mut path = ctx.config.buffer_file_path(&ctx.input.session_id);
    if !path.exists()
        && let Some(registered) = &ctx.session.buffer_file_path
    {
        let registered = PathBuf::from(registered);
        if registered.exists() {
            debug!("using buffer path from registry: {}", registered.display());
            path = registered;
        }
    }

    for _ in 0..BUFFER_READ_RETRIES {
        if let Ok(bytes) = std::fs::read(&path)
            && !bytes.is_empty()
        {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if has_numbered_prompt(&strip_ansi(&text)) {
                return Some(text);
            }
        }
        tokio::time::sleep(BUFFER_READ_SLEEP).await;
    }
    debug!("no permission prompt found in buffer {}", path.display());
    None
}

fn has_numbered_prompt(clean_text: &str) -> bool {
    clean_text.lines().any(|line| {
        let t = line.trim_start();
        (t.starts_with("1.") || t.starts_with("1)"))
            && t[2..].starts_with(char::is_whitespace)
    })
}

/// Feed the raw buffer through the same line cleaning the wrapper
/// applies, then back-parse the option list.
fn parse_buffer(raw: &str) -> Option<PermissionPrompt> {
    let logger = LineLogger::default();
    logger.add_data(raw.as_bytes());
    logger.add_data(b"\n");
    parse_permission_prompt(&logger.get_all_lines())
}

/// Button labels for the canonical 2-option (`Yes` / `No...`) and
/// 3-option (`Yes` / `Yes, allow...` / `No...`) shapes; `None` for
/// everything else, which must fall back to numbered text.
pub fn canonical_button_labels(prompt: &PermissionPrompt) -> Option<Vec<String>> {
    if prompt.missing_count() > 0 {
        return None;
    }
    let texts = prompt.option_texts();
    let canonical = match texts.len() {
        2 => texts[0].starts_with("Yes") && texts[1].starts_with("No"),
        3 => {
            texts[0].starts_with("Yes")
                && texts[1].starts_with("Yes")
                && texts[2].starts_with("No")
        }
        _ => false,
    };
    if !canonical {
        return None;
    }
    Some(
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let short: String = text.chars().take(30).collect();
                let ellipsis = if text.chars().count() > 30 { "..." } else { "" };
                format!("{}. {short}{ellipsis}", i + 1)
            })
            .collect(),
    )
}

/// Buttons styled green for the first option and red for the last.
pub fn buttons_for_labels(labels: &[String], request_id: &str) -> Block {
    let last = labels.len() - 1;
    let elements = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let number = (i + 1) as u32;
            let button = ButtonElement::new(
                label.clone(),
                permission_action_id(number),
                number.to_string(),
            );
            if i == 0 {
                button.primary()
            } else if i == last {
                button.danger()
            } else {
                button
            }
        })
        .collect();
    Block::actions(permission_block_id(request_id), elements)
}

/// Numbered text rendering with reaction instructions, used whenever
/// buttons would be unsafe.
pub fn numbered_text_blocks(prompt: &PermissionPrompt) -> Vec<Block> {
    let mut lines = Vec::new();
    for option in &prompt.options {
        lines.push(format!("{}. {}", option.number, option.text));
    }
    let emojis: Vec<&str> = NUMBER_EMOJIS
        .iter()
        .take(prompt.options.len())
        .copied()
        .collect();
    vec![
        Block::section(lines.join("\n")),
        Block::context(format!("React with {}", emojis.join(" "))),
    ]
}

fn build_prompt_blocks(
    ctx: &HookContext,
    raw_buffer: Option<&str>,
    prompt: Option<&PermissionPrompt>,
    request_id: &str,
) -> Vec<Block> {
    let tool_name = ctx.input.tool_name.as_deref().unwrap_or("unknown");

    let details = match raw_buffer {
        Some(raw) => {
            let clean = strip_ansi(raw);
            let truncated: String = clean.chars().take(PROMPT_TEXT_LIMIT).collect();
            let suffix = if clean.chars().count() > PROMPT_TEXT_LIMIT {
                "\n...(truncated)"
            } else {
                ""
            };
            format!("```\n{truncated}{suffix}\n```")
        }
        None => describe_tool_input(tool_name, &ctx.input.tool_input),
    };

    let mut blocks = vec![Block::section(format!(
        "\u{26a0}\u{fe0f} *Permission Required: {tool_name}*\n\n{details}"
    ))];

    match prompt.and_then(canonical_button_labels) {
        Some(labels) => blocks.push(buttons_for_labels(&labels, request_id)),
        None => match prompt {
            // Parsed but non-canonical: numbered text only.
            Some(prompt) => blocks.extend(numbered_text_blocks(prompt)),
            // Nothing parsed: layout from the suggestion signal.
            None => {
                let labels: &[&str] = if suggests_always_option(&ctx.input.permission_suggestions)
                {
                    &["1. Yes", "2. Yes, always", "3. No"]
                } else {
                    &["1. Yes", "2. No"]
                };
                let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
                blocks.push(buttons_for_labels(&labels, request_id));
            }
        },
    }
    blocks
}

/// A `permission_suggestions` payload signals a 3-option prompt.
fn suggests_always_option(suggestions: &Option<Value>) -> bool {
    suggestions.as_ref().is_some_and(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use slackline_linelog::PromptOption;

    fn prompt(texts: &[&str]) -> PermissionPrompt {
        PermissionPrompt {
            question: None,
            options: texts
                .iter()
                .enumerate()
                .map(|(i, t)| PromptOption {
                    number: (i + 1) as u32,
                    text: t.to_string(),
                    reconstructed: false,
                })
                .collect(),
        }
    }

    #[test]
    fn canonical_three_option_shape_gets_buttons() {
        let labels = canonical_button_labels(&prompt(&[
            "Yes",
            "Yes, allow all edits during this session",
            "No, and tell Claude what to do differently",
        ]))
        .expect("labels");
        assert_eq!(labels.len(), 3);
        assert!(labels[0].starts_with("1."));
        assert!(labels[1].starts_with("2."));
        assert!(labels[2].starts_with("3."));
    }

    #[test]
    fn canonical_two_option_shape_gets_buttons() {
        let labels = canonical_button_labels(&prompt(&["Yes", "No"])).expect("labels");
        assert_eq!(labels, vec!["1. Yes".to_string(), "2. No".to_string()]);
    }

    #[test]
    fn custom_labels_do_not_get_buttons() {
        assert_eq!(
            canonical_button_labels(&prompt(&["Proceed", "Abort"])),
            None
        );
        assert_eq!(
            canonical_button_labels(&prompt(&["Yes", "Maybe", "No"])),
            None
        );
    }

    #[test]
    fn reconstructed_options_never_get_buttons() {
        let mut p = prompt(&["Yes", "Yes, allow", "No"]);
        p.options[0].reconstructed = true;
        assert_eq!(canonical_button_labels(&p), None);
    }

    #[test]
    fn buttons_carry_digit_values_and_styles() {
        let labels = vec!["1. Yes".to_string(), "2. Yes, always".to_string(), "3. No".to_string()];
        let Block::Actions { block_id, elements } = buttons_for_labels(&labels, "99") else {
            panic!("expected actions block");
        };
        assert_eq!(block_id.as_deref(), Some("permission_99"));
        assert_eq!(elements[0].value, "1");
        assert_eq!(elements[0].action_id, "permission_response_1");
        assert_eq!(elements[0].style.as_deref(), Some("primary"));
        assert_eq!(elements[2].style.as_deref(), Some("danger"));
    }

    #[test]
    fn numbered_prompt_detection_requires_a_first_option() {
        assert!(has_numbered_prompt("something\n 1. Yes\n 2. No"));
        assert!(!has_numbered_prompt("just output\nwith 1.5 numbers"));
    }

    #[test]
    fn buffer_parse_handles_ansi_and_boxes() {
        let raw = "\x1b[1mDo you want to make this edit?\x1b[0m\r\n\
                   \u{276f} 1. Yes\r\n\
                   2. Yes, allow all edits during this session\r\n\
                   3. No, and tell Claude what to do differently\r\n";
        let parsed = parse_buffer(raw).expect("prompt");
        assert_eq!(parsed.options.len(), 3);
        assert_eq!(parsed.options[0].text, "Yes");
    }
}
