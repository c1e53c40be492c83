//! Model service contract: the Converse request/response wire shapes and the
//! `LanguageModel` trait every backend implements.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{AgentError, Result};
use crate::message::{ContentBlock, Role, ToolUse, Turn};
use crate::tool::ToolSpec;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    #[serde(serialize_with = "serialize_tool_specs")]
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Value,
}

impl ToolConfig {
    /// Every spec offered, model decides whether to call.
    pub fn auto(tools: Vec<ToolSpec>) -> Self {
        Self {
            tools,
            tool_choice: json!({ "auto": {} }),
        }
    }
}

fn serialize_tool_specs<S: Serializer>(
    tools: &[ToolSpec],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(tools.len()))?;
    for tool in tools {
        seq.serialize_element(&tool.to_wire())?;
    }
    seq.end()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    pub model_id: String,
    pub messages: Vec<Turn>,
    pub inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    GuardrailIntervened,
    ContentFiltered,
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::GuardrailIntervened => "guardrail_intervened",
            StopReason::ContentFiltered => "content_filtered",
            StopReason::Other(raw) => raw,
        }
    }
}

impl From<&str> for StopReason {
    fn from(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "guardrail_intervened" => StopReason::GuardrailIntervened,
            "content_filtered" => StopReason::ContentFiltered,
            other => StopReason::Other(other.to_string()),
        }
    }
}

impl From<String> for StopReason {
    fn from(raw: String) -> Self {
        StopReason::from(raw.as_str())
    }
}

impl From<StopReason> for String {
    fn from(reason: StopReason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverseOutput {
    pub message: Turn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetrics {
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
    #[serde(rename = "HTTPStatusCode", default)]
    pub http_status_code: u16,
    #[serde(rename = "HTTPHeaders", default)]
    pub http_headers: HashMap<String, String>,
    #[serde(rename = "RetryAttempts", default)]
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    pub output: ConverseOutput,
    pub stop_reason: StopReason,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub metrics: ResponseMetrics,
    #[serde(
        rename = "ResponseMetadata",
        alias = "responseMetadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_metadata: Option<ResponseMetadata>,
}

impl ConverseResponse {
    pub fn new(message: Turn, stop_reason: StopReason) -> Self {
        Self {
            output: ConverseOutput { message },
            stop_reason,
            usage: TokenUsage::default(),
            metrics: ResponseMetrics::default(),
            response_metadata: None,
        }
    }

    /// A finished assistant reply.
    pub fn end_turn(text: impl Into<String>) -> Self {
        Self::new(Turn::assistant(text), StopReason::EndTurn)
    }

    /// An assistant turn asking for the given tool calls.
    pub fn tool_use(calls: Vec<ToolUse>) -> Self {
        Self::new(
            Turn::new(
                Role::Assistant,
                calls.into_iter().map(ContentBlock::ToolUse).collect(),
            ),
            StopReason::ToolUse,
        )
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = TokenUsage::new(input_tokens, output_tokens);
        self
    }

    pub fn message(&self) -> &Turn {
        &self.output.message
    }

    pub fn text(&self) -> String {
        self.output.message.text()
    }
}

/// A hosted conversation model: transcript and config in, one assistant turn out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse>;
}

/// A deterministic model used for tests and demos. Replays scripted responses
/// in order and keeps every request it was sent.
pub struct StubModel {
    responses: Mutex<VecDeque<ConverseResponse>>,
    requests: Mutex<Vec<ConverseRequest>>,
}

impl StubModel {
    pub fn new(responses: Vec<ConverseResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Scripted responses in the service's JSON wire format.
    pub fn from_json<S: AsRef<str>>(responses: &[S]) -> Result<Arc<Self>> {
        let parsed = responses
            .iter()
            .map(|raw| serde_json::from_str(raw.as_ref()))
            .collect::<std::result::Result<Vec<ConverseResponse>, _>>()?;
        Ok(Self::new(parsed))
    }

    pub fn requests(&self) -> Vec<ConverseRequest> {
        self.requests.lock().expect("stub model poisoned").clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("stub model poisoned").len()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse> {
        self.requests
            .lock()
            .expect("stub model poisoned")
            .push(request.clone());
        self.responses
            .lock()
            .expect("stub model poisoned")
            .pop_front()
            .ok_or_else(|| {
                AgentError::LanguageModel("StubModel ran out of scripted responses".into())
            })
    }
}
