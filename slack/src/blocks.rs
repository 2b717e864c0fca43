//! The subset of Block Kit the workspace renders.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Text {
    #[serde(rename = "mrkdwn")]
    Mrkdwn { text: String },
    #[serde(rename = "plain_text")]
    Plain { text: String },
}

impl Text {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Text::Mrkdwn { text: text.into() }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Text::Plain { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Text::Mrkdwn { text } | Text::Plain { text } => text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub text: Text,
    pub action_id: String,
    pub value: String,
    /// `primary` (green) or `danger` (red); default styling otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ButtonElement {
    pub fn new(label: impl Into<String>, action_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: Text::plain(label),
            action_id: action_id.into(),
            value: value.into(),
            style: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.style = Some("primary".to_string());
        self
    }

    pub fn danger(mut self) -> Self {
        self.style = Some("danger".to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: Text,
    },
    Section {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<Text>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<Text>>,
    },
    Divider,
    Context {
        elements: Vec<Text>,
    },
    Actions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        elements: Vec<ButtonElement>,
    },
}

impl Block {
    pub fn header(text: impl Into<String>) -> Self {
        Block::Header {
            text: Text::plain(text),
        }
    }

    pub fn section(text: impl Into<String>) -> Self {
        Block::Section {
            block_id: None,
            text: Some(Text::mrkdwn(text)),
            fields: None,
        }
    }

    pub fn section_with_id(block_id: impl Into<String>, text: impl Into<String>) -> Self {
        Block::Section {
            block_id: Some(block_id.into()),
            text: Some(Text::mrkdwn(text)),
            fields: None,
        }
    }

    pub fn fields(fields: Vec<Text>) -> Self {
        Block::Section {
            block_id: None,
            text: None,
            fields: Some(fields),
        }
    }

    pub fn context(text: impl Into<String>) -> Self {
        Block::Context {
            elements: vec![Text::mrkdwn(text)],
        }
    }

    pub fn actions(block_id: impl Into<String>, elements: Vec<ButtonElement>) -> Self {
        Block::Actions {
            block_id: Some(block_id.into()),
            elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn section_serializes_with_mrkdwn_text() {
        let block = Block::section("*hello*");
        let json = serde_json::to_value(&block).expect("serialize");
        assert_eq!(json["type"], "section");
        assert_eq!(json["text"]["type"], "mrkdwn");
        assert_eq!(json["text"]["text"], "*hello*");
        assert!(json.get("block_id").is_none());
    }

    #[test]
    fn actions_block_carries_block_id_and_buttons() {
        let block = Block::actions(
            "permission_123",
            vec![
                ButtonElement::new("1. Yes", "permission_response_1", "1").primary(),
                ButtonElement::new("3. No", "permission_response_3", "3").danger(),
            ],
        );
        let json = serde_json::to_value(&block).expect("serialize");
        assert_eq!(json["block_id"], "permission_123");
        assert_eq!(json["elements"][0]["type"], "button");
        assert_eq!(json["elements"][0]["style"], "primary");
        assert_eq!(json["elements"][1]["value"], "3");
        assert_eq!(json["elements"][1]["text"]["type"], "plain_text");
    }

    #[test]
    fn blocks_round_trip_through_json() {
        let blocks = vec![
            Block::header("Session"),
            Block::Divider,
            Block::context("react with 1 or 2"),
        ];
        let json = serde_json::to_string(&blocks).expect("serialize");
        let parsed: Vec<Block> = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, blocks);
    }
}
