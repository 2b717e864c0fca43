//! Session discovery by buffer-file modification time.
//!
//! After `/compact` or `/resume` the agent starts writing under a new
//! session id. The new id is discovered by finding the most recently
//! modified `claude_output_*.txt` in the shared logs directory.

use std::path::Path;
use std::time::SystemTime;

const BUFFER_PREFIX: &str = "claude_output_";
const LINES_PREFIX: &str = "claude_lines_";
const SUFFIX: &str = ".txt";

/// Extract the session id from a buffer or lines filename.
///
/// `claude_output_abc12345.txt` → `abc12345`; anything else → `None`.
pub fn extract_session_id_from_filename(filename: &str) -> Option<&str> {
    let stem = filename.strip_suffix(SUFFIX)?;
    let id = stem
        .strip_prefix(BUFFER_PREFIX)
        .or_else(|| stem.strip_prefix(LINES_PREFIX))?;
    if id.is_empty() { None } else { Some(id) }
}

/// Session id of the most recently modified buffer file in `log_dir`,
/// or `None` when the directory is missing or holds no buffer files.
pub fn find_active_session(log_dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(log_dir).ok()?;

    let mut newest: Option<(SystemTime, String)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(BUFFER_PREFIX) || !name.ends_with(SUFFIX) {
            continue;
        }
        let Some(id) = extract_session_id_from_filename(name) else {
            continue;
        };
        // The file may vanish between readdir and stat; skip it then.
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(mtime) = meta.modified() else { continue };
        match &newest {
            Some((best, _)) if *best >= mtime => {}
            _ => newest = Some((mtime, id.to_string())),
        }
    }

    newest.map(|(_, id)| id)
}
