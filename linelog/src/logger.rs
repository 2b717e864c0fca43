//! Bounded FIFO of cleaned terminal lines.
//!
//! The wrapper appends every PTY read here. Lines are ANSI-stripped,
//! cursor-prefix-stripped, whitespace-trimmed and filtered against a
//! noise-pattern set before they are stored, so readers (the
//! session-change check, the numbered dump file, debugging) see what a
//! human saw on screen rather than what the terminal was sent.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use std::sync::Mutex;

use regex_lite::Regex;

use crate::ansi::strip_ansi;

pub const DEFAULT_MAX_LINES: usize = 500;

// Spinner-only lines, terminal title-bar updates, transient status
// words, token-count lines, status prefixes, pure box drawing.
#[allow(clippy::expect_used)]
static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^[*+.·•○●◦◉◎⊙⊚⊛⊜⊝]+$",
        r"^0;",
        r"(Vibing|Prestidigitating|Julienning|Pondering|Conjuring)",
        r"thinking\)$",
        r"^\d+\.?\d*k? tokens",
        r"^(Checking|Working|Loading|Waiting)",
        r"^[─│┌┐└┘├┤┬┴┼═║╔╗╚╝╠╣╦╩╬]+$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

// Commands that replace the agent's session identity. Must match at
// the start of the line; the same string mid-sentence is not a command.
#[allow(clippy::expect_used)]
static SESSION_CHANGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)^/compact\b", r"(?i)^/resume\b"]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
});

#[derive(Default)]
struct Inner {
    lines: VecDeque<String>,
    partial: String,
    session_change_pending: bool,
}

/// Thread-safe bounded line log. All mutation happens under one mutex;
/// readers take snapshots.
pub struct LineLogger {
    max_lines: usize,
    inner: Mutex<Inner>,
}

impl Default for LineLogger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl LineLogger {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Append one raw PTY read. Invalid UTF-8 is replaced, a trailing
    /// partial line is buffered until the next read completes it.
    pub fn add_data(&self, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();

        let combined = format!("{}{}", inner.partial, text);
        let ends_on_newline = combined.ends_with(['\r', '\n']);

        let mut parts: Vec<&str> = split_on_newline_runs(&combined);
        if ends_on_newline {
            inner.partial = String::new();
        } else {
            inner.partial = parts.pop().unwrap_or("").to_string();
        }

        for part in parts {
            let clean = clean_line(&strip_ansi(part));
            if clean.is_empty() {
                continue;
            }
            // Session-change commands are detected before noise
            // filtering so a prompt-echoed command still fires.
            if SESSION_CHANGE_PATTERNS.iter().any(|re| re.is_match(&clean)) {
                inner.session_change_pending = true;
            }
            if NOISE_PATTERNS.iter().any(|re| re.is_match(&clean)) {
                continue;
            }
            if inner.lines.len() == self.max_lines {
                inner.lines.pop_front();
            }
            inner.lines.push_back(clean);
        }
    }

    /// Atomically consume the sticky session-change flag, returning the
    /// previous value. Returns `true` at most once per detected change.
    pub fn acknowledge_session_change(&self) -> bool {
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.session_change_pending)
    }

    pub fn session_change_pending(&self) -> bool {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        inner.session_change_pending
    }

    /// Last `n` lines, oldest first. `n == 0` returns nothing; `n`
    /// larger than the log returns everything.
    pub fn get_last_n(&self, n: usize) -> Vec<String> {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        if n == 0 {
            return Vec::new();
        }
        let skip = inner.lines.len().saturating_sub(n);
        inner.lines.iter().skip(skip).cloned().collect()
    }

    pub fn get_all_lines(&self) -> Vec<String> {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        inner.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        inner.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dump all lines to `path` as `NNNN: <line>`, creating parent
    /// directories as needed.
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let lines = self.get_all_lines();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for (i, line) in lines.iter().enumerate() {
            writeln!(file, "{i:4}: {line}")?;
        }
        Ok(())
    }
}

/// Split on any run of CR/LF. Runs collapse: `"a\r\n\nb"` yields
/// `["a", "b"]` plus the empty tail when the text ends on a newline.
fn split_on_newline_runs(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_newline = false;
    for (i, ch) in text.char_indices() {
        if ch == '\r' || ch == '\n' {
            if !in_newline {
                parts.push(&text[start..i]);
                in_newline = true;
            }
            start = i + ch.len_utf8();
        } else {
            in_newline = false;
        }
    }
    parts.push(&text[start..]);
    parts
}

#[allow(clippy::expect_used)]
static CURSOR_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[❯>]+\s*").expect("static regex"));

const BOX_DRAWING: &[char] = &[
    '─', '│', '┌', '┐', '└', '┘', '├', '┤', '┬', '┴', '┼', '═', '║', '╔', '╗', '╚', '╝',
    '╠', '╣', '╦', '╩', '╬',
];

/// Strip the selection cursor glyphs and UI border characters, then
/// trim. Cursor prefixes (`❯`/`>`) appear before the selected option in
/// permission prompts and would otherwise defeat option parsing.
fn clean_line(line: &str) -> String {
    let without_cursor = CURSOR_PREFIX_RE.replace(line, "");
    let without_boxes: String = without_cursor
        .chars()
        .filter(|c| !BOX_DRAWING.contains(c))
        .collect();
    without_boxes.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ansi_is_stripped_from_stored_lines() {
        let log = LineLogger::default();
        log.add_data(b"\x1b[31mRed text\x1b[0m\n");
        assert_eq!(log.get_all_lines(), vec!["Red text".to_string()]);
    }

    #[test]
    fn partial_lines_are_buffered_until_complete() {
        let log = LineLogger::default();
        log.add_data(b"hello wo");
        assert!(log.get_all_lines().is_empty());
        log.add_data(b"rld\n");
        assert_eq!(log.get_all_lines(), vec!["hello world".to_string()]);
    }

    #[test]
    fn split_feeding_matches_single_feeding() {
        let single = LineLogger::default();
        single.add_data(b"A\r\nB\r\n");

        let split = LineLogger::default();
        split.add_data(b"A\r\nB");
        split.add_data(b"\r\n");

        assert_eq!(single.get_all_lines(), split.get_all_lines());
        assert_eq!(single.get_all_lines(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn overflow_drops_oldest_first() {
        let log = LineLogger::new(3);
        for i in 0..5 {
            log.add_data(format!("line {i}\n").as_bytes());
        }
        assert_eq!(
            log.get_all_lines(),
            vec!["line 2".to_string(), "line 3".to_string(), "line 4".to_string()]
        );
    }

    #[test]
    fn get_last_n_boundaries() {
        let log = LineLogger::default();
        log.add_data(b"a\nb\nc\n");
        assert_eq!(log.get_last_n(0), Vec::<String>::new());
        assert_eq!(log.get_last_n(2), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(log.get_last_n(10).len(), 3);
    }

    #[test]
    fn noise_lines_are_filtered() {
        let log = LineLogger::default();
        log.add_data(b"\xc2\xb7\xc2\xb7\xc2\xb7\n"); // spinner dots
        log.add_data(b"0;title bar\n");
        log.add_data("1.7k tokens\n".as_bytes());
        log.add_data("Checking something\n".as_bytes());
        log.add_data("(esc to interrupt · thinking)\n".as_bytes());
        log.add_data(b"real output\n");
        assert_eq!(log.get_all_lines(), vec!["real output".to_string()]);
    }

    #[test]
    fn cursor_prefix_and_box_drawing_are_removed() {
        let log = LineLogger::default();
        log.add_data("\u{276f} 1. Yes\n".as_bytes());
        log.add_data("\u{2502} 2. No \u{2502}\n".as_bytes());
        assert_eq!(
            log.get_all_lines(),
            vec!["1. Yes".to_string(), "2. No".to_string()]
        );
    }

    #[test]
    fn session_change_flag_is_sticky_and_consumed_once() {
        let log = LineLogger::default();
        log.add_data(b"/compact\n");
        assert!(log.session_change_pending());
        assert!(log.acknowledge_session_change());
        assert!(!log.acknowledge_session_change());
    }

    #[test]
    fn session_change_is_case_insensitive_and_anchored() {
        let log = LineLogger::default();
        log.add_data(b"/RESUME abc\n");
        assert!(log.acknowledge_session_change());

        log.add_data(b"talking about /compact mid-sentence\n");
        assert!(!log.session_change_pending());
    }

    #[test]
    fn session_change_detected_behind_cursor_prefix() {
        let log = LineLogger::default();
        log.add_data("> /compact\n".as_bytes());
        assert!(log.session_change_pending());
    }

    #[test]
    fn compact_substring_does_not_fire() {
        let log = LineLogger::default();
        log.add_data(b"/compacted\n");
        assert!(!log.session_change_pending());
    }

    #[test]
    fn log_never_exceeds_max_lines() {
        let log = LineLogger::new(10);
        for i in 0..100 {
            log.add_data(format!("line {i}\n").as_bytes());
        }
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn save_to_file_writes_numbered_lines() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("sub").join("lines.txt");
        let log = LineLogger::default();
        log.add_data(b"first\nsecond\n");
        log.save_to_file(&path).expect("save");
        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(content, "   0: first\n   1: second\n");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let log = LineLogger::default();
        log.add_data(b"ok \xff\xfe bytes\n");
        assert_eq!(log.len(), 1);
    }
}
