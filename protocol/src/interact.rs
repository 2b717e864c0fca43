//! Interactive-component naming and the emoji option map.
//!
//! Block ids are the carrier for our own routing metadata on chat
//! messages; the listener parses them back to decide which decoder an
//! incoming reaction or click belongs to. The formats are bit-stable:
//!
//! ```text
//! permission_<request_id>
//! askuser_Q<i>_<session_id>_<request_id>
//! ```

pub const PERMISSION_BLOCK_PREFIX: &str = "permission_";
pub const ASKUSER_BLOCK_PREFIX: &str = "askuser_Q";

/// Action ids for permission buttons are `permission_response_<n>` with
/// values `"1" | "2" | "3"`.
pub const PERMISSION_ACTION_PREFIX: &str = "permission_response_";

pub fn permission_block_id(request_id: &str) -> String {
    format!("{PERMISSION_BLOCK_PREFIX}{request_id}")
}

pub fn permission_action_id(option_number: u32) -> String {
    format!("{PERMISSION_ACTION_PREFIX}{option_number}")
}

pub fn askuser_block_id(question_index: usize, session_id: &str, request_id: &str) -> String {
    format!("{ASKUSER_BLOCK_PREFIX}{question_index}_{session_id}_{request_id}")
}

/// Parsed `askuser_Q<i>_<session_id>_<request_id>` block id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskUserBlockRef {
    pub question_index: usize,
    pub session_id: String,
    pub request_id: String,
}

/// Session ids never contain underscores and request ids are plain
/// digit strings, so splitting on the first and last `_` of the
/// remainder is unambiguous.
pub fn parse_askuser_block_id(block_id: &str) -> Option<AskUserBlockRef> {
    let rest = block_id.strip_prefix(ASKUSER_BLOCK_PREFIX)?;
    let (index, rest) = rest.split_once('_')?;
    let question_index = index.parse().ok()?;
    let (session_id, request_id) = rest.rsplit_once('_')?;
    if session_id.is_empty() || request_id.is_empty() {
        return None;
    }
    Some(AskUserBlockRef {
        question_index,
        session_id: session_id.to_string(),
        request_id: request_id.to_string(),
    })
}

/// Reaction-name → 0-based option index for structured questions
/// (displayed 1-based with unicode number emojis).
pub fn emoji_to_option_index(reaction: &str) -> Option<usize> {
    match reaction {
        "one" => Some(0),
        "two" => Some(1),
        "three" => Some(2),
        "four" => Some(3),
        _ => None,
    }
}

/// Reaction-name → numeric terminal input for permission prompts.
/// Thumbs and check/cross marks are shortcuts for the first and last
/// options.
pub fn emoji_to_permission_digit(reaction: &str) -> Option<&'static str> {
    match reaction {
        "one" | "+1" | "thumbsup" | "white_check_mark" | "heavy_check_mark" => Some("1"),
        "two" => Some("2"),
        "three" | "-1" | "thumbsdown" | "x" => Some("3"),
        "four" => Some("4"),
        "five" => Some("5"),
        _ => None,
    }
}

/// Unicode emojis used when rendering options 1..=4 in message text.
pub const NUMBER_EMOJIS: [&str; 4] = ["1\u{fe0f}\u{20e3}", "2\u{fe0f}\u{20e3}", "3\u{fe0f}\u{20e3}", "4\u{fe0f}\u{20e3}"];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn askuser_block_id_round_trips() {
        let id = askuser_block_id(1, "0c32e1a8-7c2f-44c5-b1d2-6a2fbb6d0a01", "1731500000123");
        assert_eq!(id, "askuser_Q1_0c32e1a8-7c2f-44c5-b1d2-6a2fbb6d0a01_1731500000123");
        let parsed = parse_askuser_block_id(&id).expect("parse");
        assert_eq!(parsed.question_index, 1);
        assert_eq!(parsed.session_id, "0c32e1a8-7c2f-44c5-b1d2-6a2fbb6d0a01");
        assert_eq!(parsed.request_id, "1731500000123");
    }

    #[test]
    fn malformed_block_ids_are_rejected() {
        assert_eq!(parse_askuser_block_id("permission_12345"), None);
        assert_eq!(parse_askuser_block_id("askuser_Qx_S_R"), None);
        assert_eq!(parse_askuser_block_id("askuser_Q0_norequest"), None);
    }

    #[test]
    fn permission_emoji_map_covers_the_shortcut_aliases() {
        for name in ["one", "+1", "thumbsup", "white_check_mark", "heavy_check_mark"] {
            assert_eq!(emoji_to_permission_digit(name), Some("1"));
        }
        assert_eq!(emoji_to_permission_digit("two"), Some("2"));
        for name in ["three", "-1", "thumbsdown", "x"] {
            assert_eq!(emoji_to_permission_digit(name), Some("3"));
        }
        assert_eq!(emoji_to_permission_digit("tada"), None);
    }

    #[test]
    fn option_index_map_is_zero_based() {
        assert_eq!(emoji_to_option_index("one"), Some(0));
        assert_eq!(emoji_to_option_index("four"), Some(3));
        assert_eq!(emoji_to_option_index("five"), None);
        assert_eq!(emoji_to_option_index("thumbsup"), None);
    }
}
