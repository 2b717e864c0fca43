//! Tool-finished hook: live task-list updates.
//!
//! Filters to the agent's task-list write tool and mirrors the list
//! into one chat message that is updated in place. When the tracked
//! message has been deleted, a fresh one is posted and its id stored.

use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use slackline_registry::SessionUpdate;
use slackline_slack::Block;
use slackline_slack::SlackClient;
use slackline_slack::client::PostMessage;

use crate::context::HookContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub content: String,
    pub status: TaskStatus,
}

/// Parse the task-list tool input; entries with unknown status are
/// treated as pending.
pub fn parse_tasks(tool_input: &Value) -> Vec<Task> {
    tool_input
        .get("todos")
        .and_then(Value::as_array)
        .map(|todos| {
            todos
                .iter()
                .filter_map(|todo| {
                    let content = todo.get("content").and_then(Value::as_str)?;
                    let status = match todo.get("status").and_then(Value::as_str) {
                        Some("completed") => TaskStatus::Completed,
                        Some("in_progress") => TaskStatus::InProgress,
                        _ => TaskStatus::Pending,
                    };
                    Some(Task {
                        content: content.to_string(),
                        status,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Progress bar plus categorized sections: in-progress, pending, and
/// completed (collapsed to the last two with a count when long).
pub fn format_tasks(tasks: &[Task]) -> (String, Vec<Block>) {
    let total = tasks.len();
    let completed: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();
    let in_progress: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .collect();
    let pending: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .collect();

    let pct = if total > 0 {
        completed.len() * 100 / total
    } else {
        0
    };
    let filled = pct / 10;
    let bar: String = "\u{2588}".repeat(filled) + &"\u{2591}".repeat(10 - filled);

    let mut blocks = vec![
        Block::section(format!(
            "*Task Progress* {bar} {}/{total} ({pct}%)",
            completed.len()
        )),
        Block::Divider,
    ];

    if !in_progress.is_empty() {
        let mut text = String::from("*In Progress:*\n");
        for task in &in_progress {
            text.push_str(&format!("  :hourglass_flowing_sand: {}\n", task.content));
        }
        blocks.push(Block::section(text.trim_end().to_string()));
    }
    if !pending.is_empty() {
        let mut text = String::from("*Pending:*\n");
        for task in &pending {
            text.push_str(&format!("  :white_circle: {}\n", task.content));
        }
        blocks.push(Block::section(text.trim_end().to_string()));
    }
    if !completed.is_empty() {
        let mut text = if completed.len() <= 3 {
            let mut text = String::from("*Completed:*\n");
            for task in &completed {
                text.push_str(&format!("  :white_check_mark: ~{}~\n", task.content));
            }
            text
        } else {
            let mut text = format!("*Completed:* ({} tasks)\n", completed.len());
            for task in &completed[completed.len() - 2..] {
                text.push_str(&format!("  :white_check_mark: ~{}~\n", task.content));
            }
            text
        };
        text.truncate(text.trim_end().len());
        blocks.push(Block::section(text));
    }

    let fallback = format!("Task Progress: {}/{total} complete", completed.len());
    (fallback, blocks)
}

pub async fn run(ctx: &HookContext) {
    if ctx.input.tool_name.as_deref() != Some("TodoWrite") {
        return;
    }
    let tasks = parse_tasks(&ctx.input.tool_input);
    if tasks.is_empty() {
        debug!("empty task list, skipping");
        return;
    }
    let Some(slack) = ctx.slack() else { return };
    let Some(channel) = ctx.session.channel.clone() else {
        return;
    };

    let (fallback, blocks) = format_tasks(&tasks);
    let existing_ts = ctx.session.todo_message_ts.clone();

    let new_ts = post_or_update(
        &slack,
        &channel,
        ctx.session.thread_ts.as_deref(),
        existing_ts.as_deref(),
        &fallback,
        blocks,
    )
    .await;

    if let Some(new_ts) = new_ts {
        if existing_ts.as_deref() != Some(new_ts.as_str()) {
            let update = SessionUpdate {
                todo_message_ts: Some(new_ts),
                ..Default::default()
            };
            let _ = ctx.db.update_session(&ctx.input.session_id, &update);
        }
        info!("task list mirrored to chat");
    }

    forward_to_subscribers(ctx, &slack, &fallback).await;
}

/// Update the tracked message in place; on `message_not_found` (or a
/// vanished channel) fall back to posting fresh.
async fn post_or_update(
    slack: &SlackClient,
    channel: &str,
    thread_ts: Option<&str>,
    message_ts: Option<&str>,
    text: &str,
    blocks: Vec<Block>,
) -> Option<String> {
    if let Some(ts) = message_ts {
        match slack
            .update_message(channel, ts, text, Some(blocks.clone()))
            .await
        {
            Ok(()) => return Some(ts.to_string()),
            Err(e) => match e.api_code() {
                Some("message_not_found") | Some("channel_not_found") => {
                    debug!("tracked message gone, posting fresh");
                }
                _ => {
                    warn!("task-list update failed: {e}");
                    return None;
                }
            },
        }
    }
    match slack
        .post_message(&PostMessage {
            channel: channel.to_string(),
            text: text.to_string(),
            thread_ts: thread_ts.map(String::from),
            blocks: Some(blocks),
        })
        .await
    {
        Ok(posted) => Some(posted.ts),
        Err(e) => {
            warn!("task-list post failed: {e}");
            None
        }
    }
}

/// DM subscribers get the one-line summary.
async fn forward_to_subscribers(ctx: &HookContext, slack: &SlackClient, text: &str) {
    let subscriptions = ctx
        .db
        .get_dm_subscriptions_for_session(&ctx.input.session_id)
        .unwrap_or_default();
    for subscription in subscriptions {
        let _ = slack
            .post_message(&PostMessage {
                channel: subscription.dm_channel_id.clone(),
                text: text.to_string(),
                thread_ts: None,
                blocks: None,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task(content: &str, status: TaskStatus) -> Task {
        Task {
            content: content.to_string(),
            status,
        }
    }

    #[test]
    fn tasks_parse_with_status_fallback() {
        let input = json!({"todos": [
            {"content": "Fix bug", "status": "completed"},
            {"content": "Add tests", "status": "in_progress"},
            {"content": "Ship it", "status": "someday"},
        ]});
        let tasks = parse_tasks(&input);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[1].status, TaskStatus::InProgress);
        assert_eq!(tasks[2].status, TaskStatus::Pending);
    }

    #[test]
    fn progress_bar_reflects_completion() {
        let tasks = vec![
            task("a", TaskStatus::Completed),
            task("b", TaskStatus::Completed),
            task("c", TaskStatus::InProgress),
            task("d", TaskStatus::Pending),
        ];
        let (fallback, blocks) = format_tasks(&tasks);
        assert_eq!(fallback, "Task Progress: 2/4 complete");
        let Block::Section { text: Some(text), .. } = &blocks[0] else {
            panic!("expected header section");
        };
        assert!(text.as_str().contains("2/4 (50%)"));
        assert!(text.as_str().contains("\u{2588}\u{2588}\u{2588}\u{2588}\u{2588}\u{2591}"));
    }

    #[test]
    fn long_completed_lists_collapse_to_last_two() {
        let tasks = vec![
            task("one", TaskStatus::Completed),
            task("two", TaskStatus::Completed),
            task("three", TaskStatus::Completed),
            task("four", TaskStatus::Completed),
        ];
        let (_, blocks) = format_tasks(&tasks);
        let completed_text = blocks
            .iter()
            .find_map(|b| match b {
                Block::Section { text: Some(t), .. } if t.as_str().contains("Completed") => {
                    Some(t.as_str().to_string())
                }
                _ => None,
            })
            .expect("completed section");
        assert!(completed_text.contains("(4 tasks)"));
        assert!(completed_text.contains("three"));
        assert!(completed_text.contains("four"));
        assert!(!completed_text.contains("one"));
    }

    #[test]
    fn sections_appear_only_when_non_empty() {
        let tasks = vec![task("solo", TaskStatus::InProgress)];
        let (_, blocks) = format_tasks(&tasks);
        let texts: Vec<String> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::Section { text: Some(t), .. } => Some(t.as_str().to_string()),
                _ => None,
            })
            .collect();
        assert!(texts.iter().any(|t| t.contains("In Progress")));
        assert!(!texts.iter().any(|t| t.contains("Pending")));
        assert!(!texts.iter().any(|t| t.contains("Completed")));
    }
}
