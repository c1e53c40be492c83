//! Conversation turns in the shape the Converse API exchanges them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    pub tool_use_id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultContent {
    Text(String),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: Vec<ToolResultContent>,
}

impl ToolResult {
    pub fn text(tool_use_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: vec![ToolResultContent::Text(text.into())],
        }
    }

    pub fn json(tool_use_id: impl Into<String>, value: Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: vec![ToolResultContent::Json(value)],
        }
    }
}

/// One unit within a turn. Serialized with a single tag key:
/// `text`, `toolUse` or `toolResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
    Text(String),
    ToolUse(ToolUse),
    ToolResult(ToolResult),
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUse> {
        match self {
            ContentBlock::ToolUse(call) => Some(call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    pub fn from_text(text: impl Into<String>, role: Role) -> Self {
        Self::new(role, vec![ContentBlock::Text(text.into())])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::from_text(text, Role::User)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::from_text(text, Role::Assistant)
    }

    /// The synthetic user turn carrying one round of tool results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::new(
            Role::User,
            results.into_iter().map(ContentBlock::ToolResult).collect(),
        )
    }

    /// Concatenation of every text item in the turn.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUse> + '_ {
        self.content.iter().filter_map(ContentBlock::as_tool_use)
    }

    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Structural check on a raw turn before it is parsed.
    pub fn validate(raw: &Value) -> bool {
        let Some(map) = raw.as_object() else {
            return false;
        };
        let role_ok = matches!(
            map.get("role").and_then(Value::as_str),
            Some("user") | Some("assistant")
        );
        let content_ok = map
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .is_some_and(Value::is_object);
        role_ok && content_ok
    }

    pub fn try_from_value(raw: Value) -> Result<Self> {
        if !Self::validate(&raw) {
            return Err(AgentError::InvalidTurn(format!(
                "expected {{\"role\": \"user\"|\"assistant\", \"content\": [{{..}}, ..]}}, got {raw}"
            )));
        }
        if let Some(items) = raw.get("content").and_then(Value::as_array) {
            for item in items {
                let keys = item.as_object().map(|m| m.len()).unwrap_or(0);
                if keys != 1 {
                    return Err(AgentError::InvalidTurn(format!(
                        "content item must carry exactly one of `text`, `toolUse`, `toolResult`: {item}"
                    )));
                }
            }
        }
        serde_json::from_value(raw).map_err(|err| AgentError::InvalidTurn(err.to_string()))
    }
}

/// Anything `Agent::chat` accepts as the opening of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatInput {
    Text { text: String, role: Role },
    Turns(Vec<Turn>),
    Raw(Value),
}

impl ChatInput {
    pub fn text_as(text: impl Into<String>, role: Role) -> Self {
        ChatInput::Text {
            text: text.into(),
            role,
        }
    }

    /// Normalises the input into at least one turn.
    pub fn into_turns(self) -> Result<Vec<Turn>> {
        let turns = match self {
            ChatInput::Text { text, role } => vec![Turn::from_text(text, role)],
            ChatInput::Turns(turns) => turns,
            ChatInput::Raw(Value::String(text)) => vec![Turn::user(text)],
            ChatInput::Raw(Value::Array(items)) => items
                .into_iter()
                .map(Turn::try_from_value)
                .collect::<Result<Vec<_>>>()?,
            ChatInput::Raw(raw @ Value::Object(_)) => vec![Turn::try_from_value(raw)?],
            ChatInput::Raw(other) => {
                return Err(AgentError::InvalidTurn(format!(
                    "expected text, a turn or a list of turns, got {other}"
                )))
            }
        };
        if turns.is_empty() {
            return Err(AgentError::InvalidTurn("no turns to send".into()));
        }
        Ok(turns)
    }
}

impl From<&str> for ChatInput {
    fn from(text: &str) -> Self {
        ChatInput::text_as(text, Role::User)
    }
}

impl From<String> for ChatInput {
    fn from(text: String) -> Self {
        ChatInput::text_as(text, Role::User)
    }
}

impl From<Turn> for ChatInput {
    fn from(turn: Turn) -> Self {
        ChatInput::Turns(vec![turn])
    }
}

impl From<Vec<Turn>> for ChatInput {
    fn from(turns: Vec<Turn>) -> Self {
        ChatInput::Turns(turns)
    }
}

impl From<Value> for ChatInput {
    fn from(raw: Value) -> Self {
        ChatInput::Raw(raw)
    }
}
