//! `LanguageModel` backed by the AWS Bedrock Converse API.

use std::fmt::Display;

use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::operation::RequestId;
use aws_sdk_bedrockruntime::types as bedrock;
use aws_sdk_bedrockruntime::Client;
use aws_smithy_types::{Document, Number};
use serde_json::{json, Map, Value};

use crate::config::AwsConfig;
use crate::error::{AgentError, Result};
use crate::llm::{
    ConverseRequest, ConverseResponse, LanguageModel, ResponseMetadata, ResponseMetrics,
    StopReason, TokenUsage, ToolConfig,
};
use crate::message::{ContentBlock, Role, ToolResultContent, ToolUse, Turn};
use crate::tool::ToolSpec;

#[derive(Clone)]
pub struct BedrockClient {
    client: Client,
}

impl BedrockClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolves credentials through the default AWS chain for the configured
    /// region and optional named profile.
    pub async fn from_config(cfg: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_bedrockruntime::config::Region::new(cfg.region.clone()));
        if let Some(profile) = &cfg.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }
}

#[async_trait]
impl LanguageModel for BedrockClient {
    async fn converse(&self, request: &ConverseRequest) -> Result<ConverseResponse> {
        let messages = request
            .messages
            .iter()
            .map(to_sdk_message)
            .collect::<Result<Vec<_>>>()?;
        let system: Vec<bedrock::SystemContentBlock> = request
            .system
            .iter()
            .map(|block| bedrock::SystemContentBlock::Text(block.text.clone()))
            .collect();
        let inference = bedrock::InferenceConfiguration::builder()
            .temperature(request.inference_config.temperature)
            .top_p(request.inference_config.top_p)
            .max_tokens(i32::try_from(request.inference_config.max_tokens).unwrap_or(i32::MAX))
            .build();
        let tool_config = request
            .tool_config
            .as_ref()
            .map(to_sdk_tool_config)
            .transpose()?;

        let output = self
            .client
            .converse()
            .model_id(&request.model_id)
            .set_messages(Some(messages))
            .set_system((!system.is_empty()).then_some(system))
            .inference_config(inference)
            .set_tool_config(tool_config)
            .send()
            .await
            .map_err(|err| {
                AgentError::LanguageModel(format!(
                    "Bedrock converse failed: {}",
                    DisplayErrorContext(&err)
                ))
            })?;

        let message = match output.output() {
            Some(bedrock::ConverseOutput::Message(message)) => from_sdk_message(message)?,
            _ => {
                return Err(AgentError::LanguageModel(
                    "Bedrock response carried no message".into(),
                ))
            }
        };
        let usage = output
            .usage()
            .map(|usage| TokenUsage {
                input_tokens: non_negative(usage.input_tokens()),
                output_tokens: non_negative(usage.output_tokens()),
                total_tokens: non_negative(usage.total_tokens()),
            })
            .unwrap_or_default();
        let metrics = ResponseMetrics {
            latency_ms: output
                .metrics()
                .map(|m| u64::try_from(m.latency_ms()).unwrap_or(0))
                .unwrap_or(0),
        };
        let response_metadata = output.request_id().map(|id| ResponseMetadata {
            request_id: id.to_string(),
            ..ResponseMetadata::default()
        });

        Ok(ConverseResponse {
            output: crate::llm::ConverseOutput { message },
            stop_reason: StopReason::from(output.stop_reason().as_str()),
            usage,
            metrics,
            response_metadata,
        })
    }
}

fn non_negative(count: i32) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

fn build_error<E: Display>(err: E) -> AgentError {
    AgentError::LanguageModel(format!("invalid Bedrock request: {err}"))
}

fn to_sdk_message(turn: &Turn) -> Result<bedrock::Message> {
    let role = match turn.role {
        Role::User => bedrock::ConversationRole::User,
        Role::Assistant => bedrock::ConversationRole::Assistant,
    };
    let content = turn
        .content
        .iter()
        .map(to_sdk_block)
        .collect::<Result<Vec<_>>>()?;
    bedrock::Message::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(build_error)
}

fn to_sdk_block(block: &ContentBlock) -> Result<bedrock::ContentBlock> {
    Ok(match block {
        ContentBlock::Text(text) => bedrock::ContentBlock::Text(text.clone()),
        ContentBlock::ToolUse(call) => bedrock::ContentBlock::ToolUse(
            bedrock::ToolUseBlock::builder()
                .tool_use_id(&call.tool_use_id)
                .name(&call.name)
                .input(to_document(&call.input))
                .build()
                .map_err(build_error)?,
        ),
        ContentBlock::ToolResult(result) => {
            let content = result
                .content
                .iter()
                .map(|item| match item {
                    ToolResultContent::Text(text) => {
                        bedrock::ToolResultContentBlock::Text(text.clone())
                    }
                    ToolResultContent::Json(value) => {
                        bedrock::ToolResultContentBlock::Json(to_document(value))
                    }
                })
                .collect();
            bedrock::ContentBlock::ToolResult(
                bedrock::ToolResultBlock::builder()
                    .tool_use_id(&result.tool_use_id)
                    .set_content(Some(content))
                    .build()
                    .map_err(build_error)?,
            )
        }
    })
}

fn to_sdk_tool(spec: &ToolSpec) -> Result<bedrock::Tool> {
    let specification = bedrock::ToolSpecification::builder()
        .name(&spec.name)
        .set_description((!spec.description.is_empty()).then(|| spec.description.clone()))
        .input_schema(bedrock::ToolInputSchema::Json(to_document(
            &spec.input_schema(),
        )))
        .build()
        .map_err(build_error)?;
    Ok(bedrock::Tool::ToolSpec(specification))
}

fn to_sdk_tool_config(config: &ToolConfig) -> Result<bedrock::ToolConfiguration> {
    let tools = config
        .tools
        .iter()
        .map(to_sdk_tool)
        .collect::<Result<Vec<_>>>()?;
    bedrock::ToolConfiguration::builder()
        .set_tools(Some(tools))
        .tool_choice(bedrock::ToolChoice::Auto(
            bedrock::AutoToolChoice::builder().build(),
        ))
        .build()
        .map_err(build_error)
}

fn from_sdk_message(message: &bedrock::Message) -> Result<Turn> {
    let role = match message.role() {
        bedrock::ConversationRole::User => Role::User,
        bedrock::ConversationRole::Assistant => Role::Assistant,
        other => {
            return Err(AgentError::LanguageModel(format!(
                "unexpected role `{}` in Bedrock response",
                other.as_str()
            )))
        }
    };
    let mut content = Vec::with_capacity(message.content().len());
    let mut skipped = 0usize;
    for block in message.content() {
        match block {
            bedrock::ContentBlock::Text(text) => content.push(ContentBlock::Text(text.clone())),
            bedrock::ContentBlock::ToolUse(call) => content.push(ContentBlock::ToolUse(ToolUse {
                tool_use_id: call.tool_use_id().to_string(),
                name: call.name().to_string(),
                input: from_document(call.input()),
            })),
            other => {
                skipped += 1;
                tracing::debug!(block = ?other, "skipping unsupported content block");
            }
        }
    }
    if content.is_empty() && skipped > 0 {
        return Err(AgentError::LanguageModel(format!(
            "Bedrock response carried only unsupported content blocks ({skipped})"
        )));
    }
    Ok(Turn::new(role, content))
}

fn to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                Document::Number(Number::Float(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => Document::String(s.clone()),
        Value::Array(items) => Document::Array(items.iter().map(to_document).collect()),
        Value::Object(map) => Document::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), to_document(value)))
                .collect(),
        ),
    }
}

fn from_document(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(b) => Value::Bool(*b),
        Document::Number(Number::PosInt(u)) => json!(u),
        Document::Number(Number::NegInt(i)) => json!(i),
        Document::Number(Number::Float(f)) => json!(f),
        Document::String(s) => Value::String(s.clone()),
        Document::Array(items) => Value::Array(items.iter().map(from_document).collect()),
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), from_document(value)))
                .collect::<Map<String, Value>>(),
        ),
    }
}
