//! Blocking structured-question hook.
//!
//! The agent's structured-question tool carries up to four questions,
//! each with up to four labeled options and optional multi-select. One
//! chat post renders all questions with per-question block ids; the
//! listener accumulates answers into the response file one user action
//! at a time, and the hook completes once every question has a value.

use serde_json::Map;
use serde_json::Value;
use tracing::info;
use tracing::warn;

use slackline_common::flags;
use slackline_protocol::hook_io::HookOutput;
use slackline_protocol::interact::NUMBER_EMOJIS;
use slackline_protocol::interact::askuser_block_id;
use slackline_protocol::response_file::question_key;
use slackline_protocol::response_file::question_text_key;
use slackline_protocol::response_file::response_file_path;
use slackline_slack::Block;
use slackline_slack::client::PostMessage;

use crate::context::HookContext;
use crate::respond::cleanup_stale_response_files;
use crate::respond::remove_response_file;
use crate::respond::wait_for_askuser_response;

const EVENT_NAME: &str = "PreToolUse";
const MAX_QUESTIONS: usize = 4;
const MAX_OPTIONS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    pub multi_select: bool,
}

/// Validate the tool input shape. Anything out of contract is an
/// error string, which the hook logs before failing open.
pub fn validate_questions(tool_input: &Value) -> Result<Vec<Question>, String> {
    let questions = tool_input
        .get("questions")
        .and_then(Value::as_array)
        .filter(|q| !q.is_empty())
        .ok_or("Missing 'questions' array")?;
    if questions.len() > MAX_QUESTIONS {
        return Err(format!("Maximum {MAX_QUESTIONS} questions allowed"));
    }

    let mut parsed = Vec::new();
    for (i, question) in questions.iter().enumerate() {
        let text = question
            .get("question")
            .and_then(Value::as_str)
            .ok_or(format!("Question {i} missing 'question' text"))?;
        let options = question
            .get("options")
            .and_then(Value::as_array)
            .map(|opts| opts.as_slice())
            .unwrap_or_default();
        if options.len() > MAX_OPTIONS {
            return Err(format!("Question {i} has more than {MAX_OPTIONS} options"));
        }
        let mut labels = Vec::new();
        for (j, option) in options.iter().enumerate() {
            let label = option
                .get("label")
                .and_then(Value::as_str)
                .ok_or(format!("Question {i} option {j} missing 'label'"))?;
            labels.push(label.to_string());
        }
        parsed.push(Question {
            text: text.to_string(),
            options: labels,
            multi_select: question
                .get("multiSelect")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }
    Ok(parsed)
}

/// Markdown body for one question: numbered emoji options, the "Other"
/// affordance and the reaction instruction.
pub fn format_question(question: &Question, index: usize, total: usize) -> String {
    let mut lines = Vec::new();
    if total > 1 {
        lines.push(format!(
            "*Question {}/{total}: {}*",
            index + 1,
            question.text
        ));
    } else {
        lines.push(format!("*{}*", question.text));
    }
    lines.push(String::new());

    let shown = question.options.len().min(NUMBER_EMOJIS.len());
    for (i, label) in question.options.iter().take(shown).enumerate() {
        lines.push(format!("{} *{label}*", NUMBER_EMOJIS[i]));
    }
    lines.push("\u{1f4ac} *Other* (reply in thread)".to_string());
    lines.push(String::new());

    let emojis = NUMBER_EMOJIS[..shown].join(" ");
    if question.multi_select {
        lines.push(format!("_React with one or more: {emojis}_"));
    } else {
        lines.push(format!("_React with {emojis}_"));
    }
    lines.join("\n")
}

/// One block per question, each carrying its routing block id.
pub fn question_blocks(
    questions: &[Question],
    session_id: &str,
    request_id: &str,
) -> Vec<Block> {
    let mut blocks = vec![Block::section("\u{2753} *Input needed:*")];
    for (i, question) in questions.iter().enumerate() {
        blocks.push(Block::section_with_id(
            askuser_block_id(i, session_id, request_id),
            format_question(question, i, questions.len()),
        ));
        if i + 1 < questions.len() {
            blocks.push(Block::Divider);
        }
    }
    blocks
}

/// Translate accumulated index answers into option labels; "other"
/// answers pass their free text through.
pub fn build_answers(data: &Map<String, Value>, questions: &[Question]) -> Value {
    let mut answers = Map::new();
    for (i, question) in questions.iter().enumerate() {
        let key = question_key(i);
        let Some(value) = data.get(&key) else { continue };

        let answer = match value {
            Value::String(s) if s == "other" => data
                .get(&question_text_key(i))
                .cloned()
                .unwrap_or_else(|| Value::String("Other".to_string())),
            Value::String(s) => match label_for_index(question, s) {
                Some(label) => Value::String(label),
                None => Value::String(s.clone()),
            },
            Value::Array(indices) => Value::Array(
                indices
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| label_for_index(question, s))
                    .map(Value::String)
                    .collect(),
            ),
            other => other.clone(),
        };
        answers.insert(key, answer);
    }
    Value::Object(answers)
}

fn label_for_index(question: &Question, raw: &str) -> Option<String> {
    let index: usize = raw.parse().ok()?;
    question.options.get(index).cloned()
}

pub async fn run(ctx: &HookContext) -> Option<String> {
    if ctx.input.tool_name.as_deref() != Some("AskUserQuestion") {
        return None;
    }
    cleanup_stale_response_files(&ctx.config.askuser_response_dir());

    let questions = match validate_questions(&ctx.input.tool_input) {
        Ok(questions) => questions,
        Err(e) => {
            warn!("invalid structured-question input: {e}");
            return None;
        }
    };

    let slack = ctx.slack()?;
    let channel = ctx.session.channel.clone()?;
    let request_id = chrono::Utc::now().timestamp_millis().to_string();
    let response_file = response_file_path(
        &ctx.config.askuser_response_dir(),
        &ctx.input.session_id,
        &request_id,
    );

    let blocks = question_blocks(&questions, &ctx.input.session_id, &request_id);
    let posted = match slack
        .post_message(&PostMessage {
            channel: channel.clone(),
            text: format!("\u{2753} Input needed ({} questions)", questions.len()),
            thread_ts: ctx.session.thread_ts.clone(),
            blocks: Some(blocks),
        })
        .await
    {
        Ok(posted) => posted,
        Err(e) => {
            warn!("failed to post questions, terminal takes over: {e}");
            return None;
        }
    };
    info!("posted {} questions as {}", questions.len(), posted.ts);

    let timeout = *flags::PERMISSION_TIMEOUT;
    let data = wait_for_askuser_response(&response_file, timeout, questions.len()).await;
    remove_response_file(&response_file);
    let data = data?;

    let answers = build_answers(&data, &questions);
    let output = HookOutput::answered(EVENT_NAME, answers.clone());
    let stdout = serde_json::to_string(&output).ok()?;

    // Collapse the prompt message into a compact summary.
    let summary = if questions.len() > 1 {
        format!("\u{2713} All {} questions answered", questions.len())
    } else {
        let first = answers
            .as_object()
            .and_then(|m| m.get(&question_key(0)))
            .map(render_answer)
            .unwrap_or_default();
        format!("\u{2713} Selected: {first}")
    };
    if let Err(e) = slack
        .update_message(&posted.channel, &posted.ts, &summary, None)
        .await
    {
        warn!("could not update question message: {e}");
    }

    Some(stdout)
}

fn render_answer(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn two_questions() -> Vec<Question> {
        vec![
            Question {
                text: "Which approach?".to_string(),
                options: vec!["Fast".to_string(), "Safe".to_string()],
                multi_select: false,
            },
            Question {
                text: "Which targets?".to_string(),
                options: vec![
                    "Linux".to_string(),
                    "Mac".to_string(),
                    "Windows".to_string(),
                ],
                multi_select: true,
            },
        ]
    }

    #[test]
    fn validation_accepts_well_formed_input() {
        let input = json!({"questions": [
            {"question": "Which?", "options": [{"label": "A"}, {"label": "B"}]},
        ]});
        let questions = validate_questions(&input).expect("valid");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].options, vec!["A", "B"]);
        assert!(!questions[0].multi_select);
    }

    #[test]
    fn validation_rejects_too_many_questions() {
        let question = json!({"question": "q", "options": []});
        let input = json!({"questions": [question, question, question, question, question]});
        assert_eq!(
            validate_questions(&input),
            Err("Maximum 4 questions allowed".to_string())
        );
    }

    #[test]
    fn validation_rejects_too_many_options() {
        let input = json!({"questions": [{
            "question": "q",
            "options": [
                {"label": "1"}, {"label": "2"}, {"label": "3"},
                {"label": "4"}, {"label": "5"},
            ],
        }]});
        assert_eq!(
            validate_questions(&input),
            Err("Question 0 has more than 4 options".to_string())
        );
    }

    #[test]
    fn validation_rejects_missing_labels_and_empty_lists() {
        assert_eq!(
            validate_questions(&json!({"questions": []})),
            Err("Missing 'questions' array".to_string())
        );
        let input = json!({"questions": [{"question": "q", "options": [{"description": "x"}]}]});
        assert_eq!(
            validate_questions(&input),
            Err("Question 0 option 0 missing 'label'".to_string())
        );
    }

    #[test]
    fn formatting_includes_emojis_other_and_multiselect_note() {
        let questions = two_questions();
        let text = format_question(&questions[1], 1, 2);
        assert!(text.contains("Question 2/2"));
        assert!(text.contains("1\u{fe0f}\u{20e3} *Linux*"));
        assert!(text.contains("\u{1f4ac} *Other* (reply in thread)"));
        assert!(text.contains("one or more"));
    }

    #[test]
    fn blocks_carry_per_question_ids() {
        let blocks = question_blocks(&two_questions(), "S", "R");
        let ids: Vec<String> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::Section { block_id: Some(id), .. } => Some(id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["askuser_Q0_S_R".to_string(), "askuser_Q1_S_R".to_string()]);
    }

    #[test]
    fn answers_translate_indices_to_labels() {
        let questions = two_questions();
        let mut data = Map::new();
        data.insert("question_0".to_string(), Value::from("0"));
        data.insert("question_1".to_string(), json!(["1", "2"]));

        let answers = build_answers(&data, &questions);
        assert_eq!(answers["question_0"], "Fast");
        assert_eq!(answers["question_1"], json!(["Mac", "Windows"]));
    }

    #[test]
    fn other_answers_pass_free_text_through() {
        let questions = two_questions();
        let mut data = Map::new();
        data.insert("question_0".to_string(), Value::from("other"));
        data.insert(
            "question_0_text".to_string(),
            Value::from("a hybrid of both"),
        );
        let answers = build_answers(&data, &questions);
        assert_eq!(answers["question_0"], "a hybrid of both");
    }

    #[test]
    fn out_of_range_indices_fall_back_to_the_raw_value() {
        let questions = two_questions();
        let mut data = Map::new();
        data.insert("question_0".to_string(), Value::from("9"));
        let answers = build_answers(&data, &questions);
        assert_eq!(answers["question_0"], "9");
    }
}
