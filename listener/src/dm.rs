//! DM convenience commands: `/sessions`, `/attach`, `/detach`,
//! `/mode`.

use slackline_protocol::SessionRecord;

/// Parsed DM command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmCommand {
    Sessions,
    Attach {
        session_id: String,
        history_count: Option<usize>,
    },
    Detach,
    ModeShow,
    ModeSet(String),
    /// Recognized command with bad arguments; carries the usage hint.
    Usage(String),
}

const HISTORY_MIN: usize = 1;
const HISTORY_MAX: usize = 25;

/// Parse a DM message into a command. Returns `None` for anything that
/// is not a recognized slash command, so ordinary DM text flows through
/// to the session.
pub fn parse_dm_command(text: &str) -> Option<DmCommand> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.split_whitespace();
    let command = parts.next()?.trim_start_matches('/').to_lowercase();

    match command.as_str() {
        "sessions" => Some(DmCommand::Sessions),
        "attach" => match parts.next() {
            None => Some(DmCommand::Usage(
                "Usage: /attach <session_id> [history_count]".to_string(),
            )),
            Some(session_id) => {
                let history_count = parts
                    .next()
                    .and_then(|raw| raw.parse::<usize>().ok())
                    .map(|n| n.clamp(HISTORY_MIN, HISTORY_MAX));
                Some(DmCommand::Attach {
                    session_id: session_id.to_string(),
                    history_count,
                })
            }
        },
        "detach" => Some(DmCommand::Detach),
        "mode" => match parts.next() {
            None => Some(DmCommand::ModeShow),
            Some(mode) => {
                let mode = mode.to_lowercase();
                if matches!(mode.as_str(), "plan" | "research" | "execute") {
                    Some(DmCommand::ModeSet(mode))
                } else {
                    Some(DmCommand::Usage(format!(
                        "Invalid mode: `{mode}`. Valid modes: plan, research, execute"
                    )))
                }
            }
        },
        _ => None,
    }
}

/// One line per session for the `/sessions` listing.
pub fn format_session_list(sessions: &[SessionRecord]) -> String {
    if sessions.is_empty() {
        return "_No active sessions_".to_string();
    }
    let mut lines = vec![format!("*Active sessions ({})*", sessions.len())];
    for session in sessions {
        let short_id: String = session.session_id.chars().take(12).collect();
        lines.push(format!(
            "\u{2022} *{}* - {} (`{}`)",
            session.project, session.terminal, short_id
        ));
    }
    lines.join("\n")
}
