//! Tool-using conversation agents on top of the Bedrock Converse API.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with a Bedrock backend and a scripted `StubModel`.
//! - Typed tool declarations (`ToolSpec`, `Tool`, `ToolRegistry`) validated before they reach the model.
//! - An `Agent` that loops between the model and its tools until the model ends its turn,
//!   including handoffs to nested agents with their own transcripts and token accounting.

mod agent;
#[cfg(feature = "aws")]
mod bedrock;
mod config;
mod error;
mod hooks;
mod llm;
mod logging;
mod memory;
mod message;
mod tool;
mod trace;
mod usage;

pub use agent::{Agent, HandoffTrace, DEFAULT_MAX_ROUNDS};
#[cfg(feature = "aws")]
pub use bedrock::BedrockClient;
pub use config::{AgentSettings, AppConfig, AwsConfig, ModelConfig};
pub use error::{AgentError, Result};
pub use hooks::{AgentHook, TracingHook};
pub use llm::{
    ConverseOutput, ConverseRequest, ConverseResponse, InferenceConfig, LanguageModel,
    ResponseMetadata, ResponseMetrics, StopReason, StubModel, SystemBlock, TokenUsage, ToolConfig,
};
pub use logging::init_tracing;
pub use memory::Transcript;
pub use message::{ChatInput, ContentBlock, Role, ToolResult, ToolResultContent, ToolUse, Turn};
pub use tool::{
    FunctionTool, HandoffTool, ParamSpec, ParamType, Tool, ToolOutcome, ToolRegistry, ToolSpec,
    ToolSpecBuilder,
};
pub use trace::{render_transcript, render_with_handoffs};
pub use usage::{
    format_cost, PriceCategory, PriceType, PricingTable, PricingTier, UsageCounters,
};
