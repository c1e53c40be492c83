use async_trait::async_trait;

use crate::error::Result;
use crate::llm::{ConverseRequest, ConverseResponse};
use crate::message::{ToolResult, ToolUse, Turn};
use crate::usage::UsageCounters;

/// Observer for each step of the conversation loop. Returning an error aborts `chat`.
#[async_trait]
pub trait AgentHook: Send + Sync {
    async fn before_model(&self, _agent: &str, _request: &ConverseRequest) -> Result<()> {
        Ok(())
    }

    async fn after_model(&self, _agent: &str, _response: &ConverseResponse) -> Result<()> {
        Ok(())
    }

    async fn before_tool_call(&self, _agent: &str, _call: &ToolUse) -> Result<()> {
        Ok(())
    }

    async fn after_tool_result(&self, _agent: &str, _result: &ToolResult) -> Result<()> {
        Ok(())
    }

    async fn after_handoff(
        &self,
        _agent: &str,
        _key: &str,
        _transcript: &[Turn],
        _usage: &UsageCounters,
    ) -> Result<()> {
        Ok(())
    }
}

/// Emits every step as `tracing` events. Verbose mode logs full wire JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook {
    verbose: bool,
}

impl TracingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

#[async_trait]
impl AgentHook for TracingHook {
    async fn before_model(&self, agent: &str, request: &ConverseRequest) -> Result<()> {
        if self.verbose && request.messages.len() == 1 {
            let opening = serde_json::to_string_pretty(&request.messages[0])?;
            tracing::info!(agent, "{opening}");
        }
        tracing::debug!(
            agent,
            model = %request.model_id,
            turns = request.messages.len(),
            tools = request.tool_config.as_ref().map(|c| c.tools.len()).unwrap_or(0),
            "calling model"
        );
        Ok(())
    }

    async fn after_model(&self, agent: &str, response: &ConverseResponse) -> Result<()> {
        if self.verbose {
            let message = serde_json::to_string_pretty(response.message())?;
            tracing::info!(agent, stop_reason = %response.stop_reason, "{message}");
        } else {
            tracing::debug!(
                agent,
                stop_reason = %response.stop_reason,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                latency_ms = response.metrics.latency_ms,
                "model responded"
            );
        }
        Ok(())
    }

    async fn before_tool_call(&self, agent: &str, call: &ToolUse) -> Result<()> {
        tracing::debug!(agent, tool = %call.name, id = %call.tool_use_id, "invoking tool");
        Ok(())
    }

    async fn after_tool_result(&self, agent: &str, result: &ToolResult) -> Result<()> {
        if self.verbose {
            let rendered = serde_json::to_string_pretty(result)?;
            tracing::info!(agent, "{rendered}");
        }
        Ok(())
    }

    async fn after_handoff(
        &self,
        agent: &str,
        key: &str,
        transcript: &[Turn],
        usage: &UsageCounters,
    ) -> Result<()> {
        tracing::info!(
            agent,
            handoff = key,
            turns = transcript.len(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "handoff completed"
        );
        Ok(())
    }
}
