//! Response-file writes performed by the listener.
//!
//! The listener is the only writer; the blocking hook is the only
//! reader/deleter. Accumulating structured-question answers happens
//! under an exclusive advisory lock on the `.lock` sibling so the hook
//! never observes a torn merge.

use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;

use fs2::FileExt;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use slackline_protocol::response_file::PermissionResponse;
use slackline_protocol::response_file::lock_file_path;
use slackline_protocol::response_file::merge_askuser_answer;

const LOCK_RETRIES: usize = 10;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Write a complete permission decision in one shot.
pub fn write_permission_response(
    response_file: &Path,
    response: &PermissionResponse,
) -> std::io::Result<()> {
    if let Some(parent) = response_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(response_file, serde_json::to_string(response)?)
}

/// Merge one structured-question answer into the accumulated file,
/// stamping the acting user.
pub fn accumulate_askuser_response(
    response_file: &Path,
    key: &str,
    incoming: Value,
    user_id: Option<&str>,
    user_name: Option<&str>,
) -> std::io::Result<()> {
    if let Some(parent) = response_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_path = lock_file_path(response_file);
    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    acquire_exclusive_with_retry(&lock)?;

    let result = (|| {
        let mut data: Map<String, Value> = match std::fs::read_to_string(response_file) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Map::new(),
        };
        merge_askuser_answer(&mut data, key, incoming);
        if let Some(user_id) = user_id {
            data.insert("user_id".to_string(), Value::String(user_id.to_string()));
        }
        if let Some(user_name) = user_name {
            data.insert("user_name".to_string(), Value::String(user_name.to_string()));
        }
        data.insert(
            "timestamp".to_string(),
            Value::from(chrono::Utc::now().timestamp()),
        );
        std::fs::write(response_file, serde_json::to_string(&Value::Object(data))?)?;
        debug!("accumulated answer into {}", response_file.display());
        Ok(())
    })();

    let _ = fs2::FileExt::unlock(&lock);
    result
}

fn acquire_exclusive_with_retry(file: &std::fs::File) -> std::io::Result<()> {
    for _ in 0..LOCK_RETRIES {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(LOCK_RETRY_SLEEP);
            }
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::WouldBlock,
        "could not acquire response file lock after multiple attempts",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use slackline_protocol::response_file::PermissionChoice;
    use slackline_protocol::response_file::response_file_path;

    #[test]
    fn permission_write_produces_the_documented_schema() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = response_file_path(tmp.path(), "abc12345", "1731500000123");
        write_permission_response(
            &file,
            &PermissionResponse {
                decision: PermissionChoice::Allow,
                reason: None,
            },
        )
        .expect("write");
        let raw = std::fs::read_to_string(&file).expect("read");
        assert_eq!(raw, r#"{"decision":"allow"}"#);
    }

    #[test]
    fn accumulation_merges_across_calls() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = response_file_path(tmp.path(), "S", "R");

        accumulate_askuser_response(&file, "question_0", Value::from("0"), Some("U1"), Some("dev"))
            .expect("first");
        let data: Value =
            serde_json::from_str(&std::fs::read_to_string(&file).expect("read")).expect("parse");
        assert_eq!(data["question_0"], "0");
        assert_eq!(data["user_id"], "U1");
        assert!(data["timestamp"].as_i64().is_some());

        accumulate_askuser_response(&file, "question_1", Value::from("1"), Some("U1"), None)
            .expect("second");
        accumulate_askuser_response(&file, "question_1", Value::from("2"), Some("U1"), None)
            .expect("third");
        let data: Value =
            serde_json::from_str(&std::fs::read_to_string(&file).expect("read")).expect("parse");
        assert_eq!(data["question_0"], "0");
        assert_eq!(data["question_1"], serde_json::json!(["1", "2"]));
    }
}
