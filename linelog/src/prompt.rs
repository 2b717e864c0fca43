//! Back-parser for permission prompts.
//!
//! The hook contract does not expose the exact option wording the agent
//! renders in the terminal, so the only reliable source is the terminal
//! rendering itself. This parses an ordered list of cleaned lines
//! (most recent last) backwards into a `{question, options}` structure,
//! or `None` when no prompt is visible.

use std::sync::LazyLock;

use regex_lite::Regex;

#[allow(clippy::expect_used)]
static OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)[.)]\s*(.+)$").expect("static regex"));

// At least one of these must appear in the concatenated option text;
// numbered lists of anything else (file listings, token stats) are not
// permission prompts.
const PERMISSION_KEYWORDS: [&str; 7] =
    ["yes", "no", "allow", "deny", "approve", "cancel", "session"];

// Lines whose option text is pure status noise are skipped outright.
const SKIP_KEYWORDS: [&str; 7] = [
    "tokens", "thinking", "running", "waiting", "checking", "nesting", "hatching",
];

const QUESTION_KEYWORDS: [&str; 8] = [
    "permission", "wants to", "allow", "edit", "run", "write", "read", "execute",
];

/// How far above the first option the question line may sit.
const QUESTION_SEARCH_WINDOW: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOption {
    /// 1-based number as rendered in the terminal.
    pub number: u32,
    pub text: String,
    /// True for options reconstructed because they scrolled out of the
    /// buffer; callers must not bind interactive buttons to these.
    pub reconstructed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPrompt {
    pub question: Option<String>,
    pub options: Vec<PromptOption>,
}

impl PermissionPrompt {
    /// Number of reconstructed placeholder options at the front.
    pub fn missing_count(&self) -> usize {
        self.options.iter().filter(|o| o.reconstructed).count()
    }

    /// Option texts in display order, placeholders included.
    pub fn option_texts(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.text.as_str()).collect()
    }
}

/// Scan `lines` backwards for a maximal run of consecutive numbered
/// options, validate it against the permission keyword set, reconstruct
/// scrolled-off leading options, and look above the run for a question
/// line.
pub fn parse_permission_prompt(lines: &[String]) -> Option<PermissionPrompt> {
    let mut options: Vec<(u32, String)> = Vec::new();
    let mut first_option_idx = lines.len();

    for (idx, line) in lines.iter().enumerate().rev() {
        let Some(caps) = OPTION_RE.captures(line) else {
            if options.is_empty() {
                continue;
            }
            break;
        };
        let number: u32 = caps.get(1)?.as_str().parse().ok()?;
        let text = caps.get(2)?.as_str().trim().to_string();

        let lower = text.to_lowercase();
        if SKIP_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            continue;
        }

        match options.first() {
            None => {}
            // Duplicate of the lowest-numbered option so far: a redraw
            // artifact, skip it.
            Some((lowest, _)) if number == *lowest => continue,
            // Consecutive continuation going up the screen.
            Some((lowest, _)) if number + 1 == *lowest => {}
            // Non-sequential number terminates the run.
            Some(_) => break,
        }

        options.insert(0, (number, text));
        first_option_idx = idx;
    }

    if options.len() < 2 || options.len() > 3 {
        return None;
    }

    let all_text = options
        .iter()
        .map(|(_, t)| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if !PERMISSION_KEYWORDS.iter().any(|kw| all_text.contains(kw)) {
        return None;
    }

    // Options 1 (and 2) may have scrolled out of the bounded buffer;
    // reconstruct placeholders so numbering stays truthful.
    let lowest = options.first().map(|(n, _)| *n)?;
    let mut full: Vec<PromptOption> = Vec::new();
    if lowest == 2 || lowest == 3 {
        for n in 1..lowest {
            full.push(PromptOption {
                number: n,
                text: format!("[Option {n} - scrolled off buffer]"),
                reconstructed: true,
            });
        }
    } else if lowest != 1 {
        return None;
    }
    for (number, text) in options {
        full.push(PromptOption {
            number,
            text,
            reconstructed: false,
        });
    }
    if full.len() > 3 {
        return None;
    }

    let question = find_question(lines, first_option_idx);

    Some(PermissionPrompt {
        question,
        options: full,
    })
}

fn find_question(lines: &[String], first_option_idx: usize) -> Option<String> {
    let start = first_option_idx.saturating_sub(QUESTION_SEARCH_WINDOW);
    for line in lines[start..first_option_idx].iter().rev() {
        let trimmed = line.trim();
        if trimmed.len() < 5 {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if trimmed.ends_with('?') || QUESTION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return Some(trimmed.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_the_canonical_three_option_prompt() {
        let input = lines(&[
            "Claude wants to edit src/main.rs",
            "Do you want to make this edit?",
            "1. Yes",
            "2. Yes, allow all edits during this session",
            "3. No, and tell Claude what to do differently",
        ]);
        let prompt = parse_permission_prompt(&input).expect("prompt");
        assert_eq!(
            prompt.option_texts(),
            vec![
                "Yes",
                "Yes, allow all edits during this session",
                "No, and tell Claude what to do differently",
            ]
        );
        assert_eq!(prompt.missing_count(), 0);
        assert_eq!(
            prompt.question.as_deref(),
            Some("Do you want to make this edit?")
        );
    }

    #[test]
    fn parses_a_two_option_prompt() {
        let input = lines(&["Allow Bash to run `ls`?", "1. Yes", "2. No"]);
        let prompt = parse_permission_prompt(&input).expect("prompt");
        assert_eq!(prompt.options.len(), 2);
        assert_eq!(prompt.options[0].number, 1);
        assert!(!prompt.options[0].reconstructed);
    }

    #[test]
    fn no_numbered_lines_means_no_prompt() {
        let input = lines(&["just some output", "nothing numbered here"]);
        assert_eq!(parse_permission_prompt(&input), None);
    }

    #[test]
    fn numbered_lists_without_permission_keywords_are_rejected() {
        let input = lines(&["1. apples", "2. oranges", "3. pears"]);
        assert_eq!(parse_permission_prompt(&input), None);
    }

    #[test]
    fn status_noise_options_are_skipped() {
        let input = lines(&[
            "Do you want to proceed?",
            "1. Yes",
            "2. No",
            "3. 1.7k tokens used",
        ]);
        let prompt = parse_permission_prompt(&input).expect("prompt");
        assert_eq!(prompt.option_texts(), vec!["Yes", "No"]);
    }

    #[test]
    fn missing_option_one_is_reconstructed_and_marked() {
        let input = lines(&["2. Yes, allow always", "3. No, deny this"]);
        let prompt = parse_permission_prompt(&input).expect("prompt");
        assert_eq!(prompt.options.len(), 3);
        assert!(prompt.options[0].reconstructed);
        assert_eq!(prompt.options[0].number, 1);
        assert_eq!(prompt.missing_count(), 1);
    }

    #[test]
    fn duplicate_numbers_from_redraws_are_skipped() {
        let input = lines(&[
            "Do you want to proceed?",
            "1. Yes",
            "1. Yes",
            "2. No",
        ]);
        let prompt = parse_permission_prompt(&input).expect("prompt");
        assert_eq!(prompt.option_texts(), vec!["Yes", "No"]);
    }

    #[test]
    fn non_sequential_run_is_terminated() {
        // The earlier "5." belongs to an older list; only the trailing
        // consecutive run counts.
        let input = lines(&[
            "5. old leftover entry",
            "Allow this session to write files?",
            "1. Yes",
            "2. No",
        ]);
        let prompt = parse_permission_prompt(&input).expect("prompt");
        assert_eq!(prompt.option_texts(), vec!["Yes", "No"]);
    }

    #[test]
    fn four_visible_options_are_not_a_permission_prompt() {
        let input = lines(&[
            "1. Yes",
            "2. Yes, allow for session",
            "3. No",
            "4. No, and cancel everything",
        ]);
        assert_eq!(parse_permission_prompt(&input), None);
    }

    #[test]
    fn question_found_by_keyword_without_question_mark() {
        let input = lines(&[
            "Claude wants to run a command",
            "1. Yes",
            "2. No",
        ]);
        let prompt = parse_permission_prompt(&input).expect("prompt");
        assert_eq!(
            prompt.question.as_deref(),
            Some("Claude wants to run a command")
        );
    }

    #[test]
    fn parses_options_cleaned_from_a_boxed_menu() {
        // What a LineLogger yields for a box-drawn prompt with the
        // cursor on option 1.
        let log = crate::LineLogger::default();
        log.add_data(
            "\u{250c}\u{2500}\u{2500}\u{2500}\u{2500}\u{2510}\r\n\
             \u{2502} Do you want to make this edit? \u{2502}\r\n\
             \u{276f} 1. Yes\r\n\
             2. Yes, allow all edits during this session\r\n\
             3. No, and tell Claude what to do differently\r\n\
             \u{2514}\u{2500}\u{2500}\u{2500}\u{2500}\u{2518}\r\n"
                .as_bytes(),
        );
        let prompt = parse_permission_prompt(&log.get_all_lines()).expect("prompt");
        assert_eq!(prompt.options.len(), 3);
        assert_eq!(prompt.options[0].text, "Yes");
        assert_eq!(
            prompt.question.as_deref(),
            Some("Do you want to make this edit?")
        );
    }

    #[test]
    fn question_outside_the_search_window_is_ignored() {
        let mut raw = vec!["Do you want to allow this?".to_string()];
        for i in 0..25 {
            raw.push(format!("filler output number {i} with-no-keywords"));
        }
        raw.push("1. Yes".to_string());
        raw.push("2. No".to_string());
        let prompt = parse_permission_prompt(&raw).expect("prompt");
        assert_eq!(prompt.question, None);
    }
}
