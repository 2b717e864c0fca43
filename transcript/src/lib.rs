//! Agent conversation transcript reader.
//!
//! The agent persists each session as JSONL, one entry per line, under
//! `~/.claude/projects/<project-slug>/<session-uuid>.jsonl`. The stop
//! hook reads the latest assistant text from it, and `/attach` replays
//! the last N user/assistant exchanges into a DM. Malformed lines are
//! skipped rather than treated as fatal; the file is written
//! concurrently by the agent.

#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One text-bearing message extracted from the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptMessage {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Value>,
}

impl Transcript {
    /// Load a JSONL transcript, skipping malformed lines.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries = raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combined text of the most recent assistant message that has
    /// actual text content. Tool-only messages are skipped.
    pub fn latest_assistant_text(&self) -> Option<String> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some("assistant"))
            .find_map(|e| {
                let text = extract_text(e.pointer("/message/content")?);
                if text.is_empty() { None } else { Some(text) }
            })
    }

    /// The last `n` text-bearing user/assistant messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<TranscriptMessage> {
        let mut collected: Vec<TranscriptMessage> = self
            .entries
            .iter()
            .rev()
            .filter_map(|e| {
                let role = match e.get("type").and_then(Value::as_str) {
                    Some("user") => Role::User,
                    Some("assistant") => Role::Assistant,
                    _ => return None,
                };
                let text = extract_text(e.pointer("/message/content")?);
                if text.is_empty() {
                    return None;
                }
                Some(TranscriptMessage { role, text })
            })
            .take(n)
            .collect();
        collected.reverse();
        collected
    }
}

/// Content is either a plain string or a list of typed blocks; only
/// `text` blocks contribute.
fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.trim().to_string(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

/// `~/.claude/projects/-<slashes-to-hyphens>/<session_id>.jsonl`
pub fn transcript_path(session_id: &str, project_dir: &str) -> Option<PathBuf> {
    let slug = project_dir.replace('/', "-");
    let slug = slug.strip_prefix('-').unwrap_or(&slug);
    Some(
        dirs::home_dir()?
            .join(".claude")
            .join("projects")
            .join(format!("-{slug}"))
            .join(format!("{session_id}.jsonl")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_transcript(lines: &[Value]) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("session.jsonl");
        let mut file = std::fs::File::create(&path).expect("create");
        for line in lines {
            writeln!(file, "{line}").expect("write");
        }
        (tmp, path)
    }

    fn assistant(text: &str) -> Value {
        serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": text}]},
        })
    }

    fn user(text: &str) -> Value {
        serde_json::json!({
            "type": "user",
            "message": {"content": text},
        })
    }

    #[test]
    fn latest_assistant_text_skips_tool_only_messages() {
        let (_tmp, path) = write_transcript(&[
            assistant("first answer"),
            serde_json::json!({
                "type": "assistant",
                "message": {"content": [{"type": "tool_use", "name": "Bash"}]},
            }),
        ]);
        let transcript = Transcript::load(&path).expect("load");
        assert_eq!(
            transcript.latest_assistant_text().as_deref(),
            Some("first answer")
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("session.jsonl");
        std::fs::write(&path, "not json\n{\"type\": \"assistant\", \"message\": {\"content\": [{\"type\": \"text\", \"text\": \"ok\"}]}}\n")
            .expect("write");
        let transcript = Transcript::load(&path).expect("load");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.latest_assistant_text().as_deref(), Some("ok"));
    }

    #[test]
    fn recent_messages_returns_oldest_first() {
        let (_tmp, path) = write_transcript(&[
            user("question one"),
            assistant("answer one"),
            user("question two"),
            assistant("answer two"),
        ]);
        let transcript = Transcript::load(&path).expect("load");
        let recent = transcript.recent_messages(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "answer one");
        assert_eq!(recent[2].text, "answer two");
        assert_eq!(recent[2].role, Role::Assistant);
    }

    #[test]
    fn string_content_is_accepted_for_user_messages() {
        let (_tmp, path) = write_transcript(&[user("plain string body")]);
        let transcript = Transcript::load(&path).expect("load");
        let recent = transcript.recent_messages(5);
        assert_eq!(recent[0].role, Role::User);
        assert_eq!(recent[0].text, "plain string body");
    }

    #[test]
    fn transcript_path_slugifies_the_project_dir() {
        let path = transcript_path("abc-uuid", "/home/dev/proj").expect("path");
        let s = path.to_string_lossy();
        assert!(s.ends_with(".claude/projects/-home-dev-proj/abc-uuid.jsonl"));
    }
}
