//! The stdin/stdout contract between the agent and hook processes.
//!
//! A hook receives exactly one JSON document on stdin describing the
//! lifecycle event, may print exactly one JSON document on stdout to
//! influence the agent's decision, and always exits 0 — a non-zero exit
//! is a control signal to the agent that is never wanted here.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Event document the agent writes to a hook's stdin.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Present only for 3-option permission prompts.
    #[serde(default)]
    pub permission_suggestions: Option<Value>,
}

impl HookInput {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Short id prefix for logging.
    pub fn short_session_id(&self) -> &str {
        let end = self.session_id.len().min(8);
        &self.session_id[..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionBehavior {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub behavior: DecisionBehavior,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `{"hookSpecificOutput": {"hookEventName": ..., ...}}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookOutput {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookSpecificOutput {
    #[serde(rename = "hookEventName")]
    pub hook_event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl HookOutput {
    /// Permission decision: allow.
    pub fn allow(event_name: &str) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: event_name.to_string(),
                decision: Some(Decision {
                    behavior: DecisionBehavior::Allow,
                    message: None,
                }),
                output: None,
            },
        }
    }

    /// Permission decision: deny, with the user's reason.
    pub fn deny(event_name: &str, message: impl Into<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: event_name.to_string(),
                decision: Some(Decision {
                    behavior: DecisionBehavior::Deny,
                    message: Some(message.into()),
                }),
                output: None,
            },
        }
    }

    /// Structured-question answers: `{"decision": "answered", "answers": {...}}`.
    pub fn answered(event_name: &str, answers: Value) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: event_name.to_string(),
                decision: None,
                output: Some(serde_json::json!({
                    "decision": "answered",
                    "answers": answers,
                })),
            },
        }
    }
}
