//! Hook side of the response-file rendezvous.
//!
//! A blocking hook polls for its response file every half second up to
//! the configured timeout. Reads race the listener's accumulation
//! writes, so the read-and-delete happens under an exclusive advisory
//! lock on the `.lock` sibling; partial structured-question responses
//! are written back and polling continues.

use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use fs2::FileExt;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use slackline_protocol::response_file::PermissionResponse;
use slackline_protocol::response_file::askuser_answered_count;
use slackline_protocol::response_file::askuser_is_complete;
use slackline_protocol::response_file::lock_file_path;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Response files older than this are leftovers from dead prompts.
pub const STALE_RESPONSE_AGE: Duration = Duration::from_secs(300);

const LOCK_RETRIES: usize = 10;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Poll for a complete permission decision. The file is deleted on
/// receipt; corrupt JSON deletes the file and counts as no response.
pub async fn wait_for_permission_response(
    response_file: &Path,
    timeout: Duration,
) -> Option<PermissionResponse> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if response_file.exists() {
            let parsed = std::fs::read_to_string(response_file)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok());
            remove_response_file(response_file);
            if parsed.is_none() {
                warn!("corrupt permission response, treating as no response");
            }
            return parsed;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    debug!("timed out waiting for {}", response_file.display());
    None
}

/// Poll for a structured-question response until every question in
/// `[0, num_questions)` has an answer. Partial accumulations are put
/// back for the listener to keep merging into.
pub async fn wait_for_askuser_response(
    response_file: &Path,
    timeout: Duration,
    num_questions: usize,
) -> Option<Map<String, Value>> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if response_file.exists() {
            if let Some(data) = read_and_remove_locked(response_file) {
                if askuser_is_complete(&data, num_questions) {
                    return Some(data);
                }
                debug!(
                    "partial response: {}/{} answered",
                    askuser_answered_count(&data, num_questions),
                    num_questions
                );
                // The locked read deleted the file; restore the partial
                // accumulation for the next merge.
                if let Err(e) =
                    std::fs::write(response_file, Value::Object(data).to_string())
                {
                    warn!("failed to restore partial response: {e}");
                }
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    debug!("timed out waiting for {}", response_file.display());
    remove_response_file(response_file);
    None
}

/// Read and delete the response file under the advisory lock. Corrupt
/// JSON deletes the file and returns `None`.
pub fn read_and_remove_locked(response_file: &Path) -> Option<Map<String, Value>> {
    let lock_path = lock_file_path(response_file);
    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .ok()?;
    if let Err(e) = acquire_exclusive_with_retry(&lock) {
        warn!("could not lock response file: {e}");
        return None;
    }

    let result = match std::fs::read_to_string(response_file) {
        Ok(raw) => {
            let _ = std::fs::remove_file(response_file);
            match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!("corrupt response file removed: {e}");
                    None
                }
            }
        }
        Err(_) => None,
    };

    let _ = fs2::FileExt::unlock(&lock);
    let _ = std::fs::remove_file(&lock_path);
    result
}

/// Remove the response file and its lock sibling. Hooks call this on
/// every exit path so no rendezvous artifacts outlive the prompt.
pub fn remove_response_file(response_file: &Path) {
    let _ = std::fs::remove_file(response_file);
    let _ = std::fs::remove_file(lock_file_path(response_file));
}

/// Delete response files older than [`STALE_RESPONSE_AGE`] from `dir`.
pub fn cleanup_stale_response_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let now = std::time::SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(modified) = meta.modified() else { continue };
        if now
            .duration_since(modified)
            .map(|age| age > STALE_RESPONSE_AGE)
            .unwrap_or(false)
        {
            debug!("removing stale response file {}", path.display());
            remove_response_file(&path);
        }
    }
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
