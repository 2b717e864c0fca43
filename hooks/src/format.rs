//! Message-shaping helpers shared by the hooks.

use serde_json::Value;

/// Provider messages cap out around 40K characters; leave headroom for
/// part indicators.
pub const MAX_MESSAGE_CHARS: usize = 39_000;

/// At most this many chunks per logical message; anything longer is
/// truncated.
pub const MAX_CHUNKS: usize = 5;

/// Split a long message into chunks that each fit the provider limit,
/// preferring to break on a newline near the boundary.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();
    while !rest.is_empty() {
        if rest.len() <= max_chars {
            chunks.push(rest.iter().collect());
            break;
        }
        // Look for a newline in the last 500 chars before the limit.
        let window_start = max_chars.saturating_sub(500);
        let break_at = rest[window_start..max_chars]
            .iter()
            .rposition(|c| *c == '\n')
            .map(|i| window_start + i)
            .unwrap_or(max_chars);
        chunks.push(rest[..break_at].iter().collect());
        rest.drain(..break_at);
        while rest.first() == Some(&'\n') {
            rest.remove(0);
        }
    }
    chunks
}

/// Compact rendering of a tool invocation, used when the exact
/// terminal prompt is unavailable.
pub fn describe_tool_input(tool_name: &str, tool_input: &Value) -> String {
    match tool_name {
        "Bash" => {
            let command = tool_input
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let truncated: String = command.chars().take(200).collect();
            let ellipsis = if command.chars().count() > 200 { "..." } else { "" };
            let mut text = format!("*Command:* `{truncated}{ellipsis}`");
            if let Some(description) = tool_input.get("description").and_then(Value::as_str) {
                text.push_str(&format!("\n*Purpose:* {description}"));
            }
            text
        }
        "Read" | "Write" | "Edit" => {
            let file = tool_input
                .get("file_path")
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("*File:* `{file}`")
        }
        _ => {
            let raw = serde_json::to_string_pretty(tool_input).unwrap_or_default();
            let truncated: String = raw.chars().take(500).collect();
            format!("*Input:* ```{truncated}```")
        }
    }
}
