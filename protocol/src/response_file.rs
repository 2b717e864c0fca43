//! On-disk rendezvous between the listener (writer) and a blocking
//! hook (reader/deleter).
//!
//! Each pending interactive prompt owns one JSON file named
//! `<session_id>_<request_id>.json`. Permission prompts get a single
//! complete write; structured-question prompts accumulate partial
//! answers across multiple user actions and are complete once every
//! `question_<i>` key is present.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionChoice {
    Allow,
    AllowAlways,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionResponse {
    pub decision: PermissionChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `<dir>/<session_id>_<request_id>.json`
pub fn response_file_path(dir: &Path, session_id: &str, request_id: &str) -> PathBuf {
    dir.join(format!("{session_id}_{request_id}.json"))
}

/// Advisory lock sibling protecting accumulation reads/writes.
pub fn lock_file_path(response_file: &Path) -> PathBuf {
    let mut os = response_file.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

/// Key under which question `i`'s answer is accumulated.
pub fn question_key(index: usize) -> String {
    format!("question_{index}")
}

/// Key for free-text "other" replies to question `i`.
pub fn question_text_key(index: usize) -> String {
    format!("question_{index}_text")
}

/// A structured-question response is complete once every question has
/// an answer key.
pub fn askuser_is_complete(data: &Map<String, Value>, num_questions: usize) -> bool {
    (0..num_questions).all(|i| data.contains_key(&question_key(i)))
}

/// Number of answered questions, for progress logging.
pub fn askuser_answered_count(data: &Map<String, Value>, num_questions: usize) -> usize {
    (0..num_questions)
        .filter(|i| data.contains_key(&question_key(*i)))
        .count()
}

/// Merge one user action into the accumulated response. Multi-select
/// answers arrive one reaction at a time; an index reacted onto a
/// question that already holds a single index upgrades the value to a
/// list, and duplicate indices are ignored.
pub fn merge_askuser_answer(data: &mut Map<String, Value>, key: &str, incoming: Value) {
    match (data.get_mut(key), incoming) {
        (Some(Value::Array(existing)), Value::String(idx)) => {
            let idx = Value::String(idx);
            if !existing.contains(&idx) {
                existing.push(idx);
            }
        }
        (Some(Value::String(existing)), Value::String(idx)) if *existing != idx => {
            let merged = Value::Array(vec![Value::String(existing.clone()), Value::String(idx)]);
            data.insert(key.to_string(), merged);
        }
        (Some(_), _) => {}
        (None, incoming) => {
            data.insert(key.to_string(), incoming);
        }
    }
}
