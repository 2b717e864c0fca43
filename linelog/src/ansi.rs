use std::sync::LazyLock;

use regex_lite::Regex;

// CSI sequences plus the single-character escapes (cursor save, title
// bar, etc.). Stripping is idempotent: the output contains no ESC
// bytes, so a second pass finds nothing to remove.
#[allow(clippy::expect_used)]
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static regex")
});

/// Remove ANSI escape sequences from `text`.
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}
