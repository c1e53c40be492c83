use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::{AppConfig, ModelConfig};
use crate::error::{AgentError, Result};
use crate::hooks::{AgentHook, TracingHook};
use crate::llm::{
    ConverseRequest, ConverseResponse, LanguageModel, StopReason, SystemBlock, ToolConfig,
};
use crate::memory::Transcript;
use crate::message::{ChatInput, ToolResult, ToolUse, Turn};
use crate::tool::{Tool, ToolOutcome, ToolRegistry};
use crate::trace;
use crate::usage::{format_cost, PricingTable, PricingTier, UsageCounters};

/// Transcripts of completed handoffs, keyed by `<agent name>-<short id>`.
pub type HandoffTrace = BTreeMap<String, Vec<Turn>>;

pub const DEFAULT_MAX_ROUNDS: usize = 10;

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// A conversation engine that alternates between the model service and local tools
/// until the model ends its turn.
pub struct Agent {
    name: String,
    model: Arc<dyn LanguageModel>,
    config: ModelConfig,
    system_prompt: Option<String>,
    tools: ToolRegistry,
    transcript: Transcript,
    usage: UsageCounters,
    handoffs: HandoffTrace,
    pricing: Arc<PricingTable>,
    pricing_tier: PricingTier,
    max_rounds: usize,
    hooks: Vec<Arc<dyn AgentHook>>,
}

impl Agent {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: "agent".to_string(),
            model,
            config: ModelConfig::default(),
            system_prompt: None,
            tools: ToolRegistry::new(),
            transcript: Transcript::default(),
            usage: UsageCounters::default(),
            handoffs: HandoffTrace::new(),
            pricing: Arc::new(PricingTable::builtin()),
            pricing_tier: PricingTier::OnDemand,
            max_rounds: DEFAULT_MAX_ROUNDS,
            hooks: Vec::new(),
        }
    }

    /// Builds an agent from loaded settings, including the pricing file and log verbosity.
    pub fn from_config(model: Arc<dyn LanguageModel>, config: &AppConfig) -> Result<Self> {
        let mut agent = Self::new(model)
            .with_name(config.agent.name.clone())
            .with_config(config.model.clone())
            .with_max_rounds(config.agent.max_rounds)
            .with_pricing_tier(config.agent.pricing_tier);
        if let Some(prompt) = &config.agent.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }
        if let Some(path) = &config.agent.pricing_path {
            agent = agent.with_pricing(PricingTable::from_file(path)?);
        }
        let hook = if config.agent.verbose {
            TracingHook::verbose()
        } else {
            TracingHook::new()
        };
        Ok(agent.with_hook(Arc::new(hook)))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Result<Self> {
        self.tools.register(tool)?;
        Ok(self)
    }

    /// Seeds the transcript with earlier turns.
    pub fn with_transcript(mut self, turns: Vec<Turn>) -> Result<Self> {
        self.transcript = Transcript::with_turns(turns)?;
        Ok(self)
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    pub fn with_pricing_tier(mut self, tier: PricingTier) -> Self {
        self.pricing_tier = tier;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn transcript(&self) -> &[Turn] {
        self.transcript.turns()
    }

    pub fn usage(&self) -> &UsageCounters {
        &self.usage
    }

    pub fn handoffs(&self) -> &HandoffTrace {
        &self.handoffs
    }

    /// Clears the transcript. Usage and handoff history are kept.
    pub fn reset(&mut self) {
        self.transcript.reset();
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens()
    }

    pub fn total_cost(&self) -> Result<f64> {
        self.pricing
            .cost(&self.config.model_id, &self.usage, self.pricing_tier)
    }

    pub fn formatted_cost(&self) -> Result<String> {
        self.total_cost().map(format_cost)
    }

    pub fn draw_trace(&self) -> String {
        trace::render_with_handoffs(self.transcript.turns(), &self.handoffs)
    }

    /// Appends the input and makes one model call without dispatching tools.
    pub async fn completion(&mut self, input: impl Into<ChatInput>) -> Result<ConverseResponse> {
        self.push_input(input.into())?;
        self.step().await
    }

    /// Runs the exchange until the model ends its turn, executing every tool it asks for.
    pub fn chat<'a>(
        &'a mut self,
        input: impl Into<ChatInput>,
    ) -> BoxFuture<'a, Result<ConverseResponse>> {
        let input = input.into();
        Box::pin(async move {
            self.push_input(input)?;
            let mut rounds = 0usize;
            loop {
                let response = self.step().await?;
                match response.stop_reason.clone() {
                    StopReason::EndTurn => {
                        tracing::debug!(agent = %self.name, rounds, "turn complete");
                        return Ok(response);
                    }
                    StopReason::ToolUse => {
                        rounds += 1;
                        if rounds > self.max_rounds {
                            return Err(AgentError::TooManyToolRounds(self.max_rounds));
                        }
                        let results = self.dispatch(response.message()).await?;
                        self.transcript.append(Turn::tool_results(results))?;
                    }
                    other => {
                        tracing::warn!(agent = %self.name, stop_reason = %other, "model stopped early");
                        return Err(AgentError::UnhandledStopReason(other.to_string()));
                    }
                }
            }
        })
    }

    fn push_input(&mut self, input: ChatInput) -> Result<()> {
        let turns = input.into_turns()?;
        self.transcript.append_all(turns)
    }

    fn build_request(&self) -> ConverseRequest {
        ConverseRequest {
            model_id: self.config.model_id.clone(),
            messages: self.transcript.turns().to_vec(),
            inference_config: self.config.inference(),
            system: self
                .system_prompt
                .iter()
                .map(|text| SystemBlock { text: text.clone() })
                .collect(),
            tool_config: if self.tools.is_empty() {
                None
            } else {
                Some(ToolConfig::auto(self.tools.describe()))
            },
        }
    }

    async fn step(&mut self) -> Result<ConverseResponse> {
        let request = self.build_request();
        for hook in &self.hooks {
            hook.before_model(&self.name, &request).await?;
        }
        let response = self.model.converse(&request).await?;
        self.usage.record(&response.usage);
        if response.message().content.is_empty() {
            return Err(AgentError::Protocol(format!(
                "model returned an assistant turn with no usable content (stop reason `{}`)",
                response.stop_reason
            )));
        }
        for hook in &self.hooks {
            hook.after_model(&self.name, &response).await?;
        }
        self.transcript.append(response.output.message.clone())?;
        Ok(response)
    }

    /// Executes the round's tool requests in the order the model listed them.
    async fn dispatch(&mut self, message: &Turn) -> Result<Vec<ToolResult>> {
        let calls: Vec<&ToolUse> = message.tool_uses().collect();
        if calls.is_empty() {
            return Err(AgentError::Protocol(
                "model stopped for tool use without requesting a tool".into(),
            ));
        }
        tracing::debug!(agent = %self.name, calls = calls.len(), "dispatching tools");

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            for hook in &self.hooks {
                hook.before_tool_call(&self.name, call).await?;
            }
            let outcome = self.tools.invoke(&call.name, call.input.clone()).await?;
            let result = match outcome {
                ToolOutcome::Text(text) => ToolResult::text(&call.tool_use_id, text),
                ToolOutcome::Json(value) => ToolResult::json(&call.tool_use_id, value),
                ToolOutcome::Handoff(nested) => {
                    let text = self.hand_off(*nested, call).await?;
                    ToolResult::text(&call.tool_use_id, text)
                }
            };
            for hook in &self.hooks {
                hook.after_tool_result(&self.name, &result).await?;
            }
            results.push(result);
        }
        Ok(results)
    }

    async fn hand_off(&mut self, mut nested: Agent, call: &ToolUse) -> Result<String> {
        let request = match call.input.get("request").and_then(Value::as_str) {
            Some(request) => request.to_string(),
            None => call.input.to_string(),
        };
        tracing::info!(agent = %self.name, delegate = %nested.name, tool = %call.name, "handing off");

        nested.chat(request).await?;

        let key = format!("{}-{}", nested.name, short_id());
        self.usage.merge_from(&nested.usage);
        for hook in &self.hooks {
            hook.after_handoff(&self.name, &key, nested.transcript(), &nested.usage)
                .await?;
        }
        for (inner, turns) in std::mem::take(&mut nested.handoffs) {
            self.handoffs.insert(format!("{key}/{inner}"), turns);
        }
        let text = nested.transcript.last_assistant_text().unwrap_or_default();
        self.handoffs.insert(key, nested.transcript.turns().to_vec());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    use crate::message::{ContentBlock, Role, ToolResultContent};
    use crate::tool::{FunctionTool, HandoffTool, ParamType, ToolSpec};
    use crate::StubModel;

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    fn add_registry() -> ToolRegistry {
        let spec = ToolSpec::builder("add")
            .description("Add two integers")
            .param("a", ParamType::Integer, "")
            .param("b", ParamType::Integer, "")
            .build()
            .unwrap();
        let mut tools = ToolRegistry::new();
        tools
            .register(FunctionTool::new(spec, |args: AddArgs| Ok(args.a + args.b)))
            .unwrap();
        tools
    }

    fn call(id: &str, name: &str, input: Value) -> ToolUse {
        ToolUse {
            tool_use_id: id.into(),
            name: name.into(),
            input,
        }
    }

    #[tokio::test]
    async fn returns_end_turn_response_without_tools() {
        let model = StubModel::new(vec![ConverseResponse::end_turn("I am an AI.")]);
        let mut agent = Agent::new(model.clone());

        let response = agent.chat("Who are you?").await.unwrap();

        assert_eq!(response.text(), "I am an AI.");
        assert_eq!(
            agent.transcript(),
            &[Turn::user("Who are you?"), Turn::assistant("I am an AI.")]
        );
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![Turn::user("Who are you?")]);
        assert!(requests[0].tool_config.is_none());
    }

    #[tokio::test]
    async fn executes_tool_then_replies() {
        let model = StubModel::new(vec![
            ConverseResponse::tool_use(vec![call("t-1", "add", json!({"a": 2, "b": 3}))]),
            ConverseResponse::end_turn("5"),
        ]);
        let mut agent = Agent::new(model.clone()).with_tools(add_registry());

        let response = agent.chat("What is 2 + 3?").await.unwrap();

        assert_eq!(response.text(), "5");
        let transcript = agent.transcript();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0], Turn::user("What is 2 + 3?"));
        assert_eq!(
            transcript[2],
            Turn::tool_results(vec![ToolResult::text("t-1", "5")])
        );
        assert_eq!(transcript[3], Turn::assistant("5"));

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.tool_config.is_some()));
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn one_result_turn_per_round_in_request_order() {
        let model = StubModel::new(vec![
            ConverseResponse::tool_use(vec![
                call("t-1", "add", json!({"a": 1, "b": 1})),
                call("t-2", "add", json!({"a": 10, "b": 20})),
                call("t-3", "add", json!({"a": -4, "b": 4})),
            ]),
            ConverseResponse::end_turn("done"),
        ]);
        let mut agent = Agent::new(model).with_tools(add_registry());

        agent.chat("sum things").await.unwrap();

        let results = &agent.transcript()[2];
        assert_eq!(results.role, Role::User);
        let ids_and_values: Vec<(String, String)> = results
            .content
            .iter()
            .map(|item| match item {
                ContentBlock::ToolResult(result) => match &result.content[0] {
                    ToolResultContent::Text(text) => (result.tool_use_id.clone(), text.clone()),
                    other => panic!("unexpected content {other:?}"),
                },
                other => panic!("unexpected item {other:?}"),
            })
            .collect();
        assert_eq!(
            ids_and_values,
            vec![
                ("t-1".to_string(), "2".to_string()),
                ("t-2".to_string(), "30".to_string()),
                ("t-3".to_string(), "0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tool_aborts_without_result_turn() {
        let model = StubModel::new(vec![
            ConverseResponse::tool_use(vec![
                call("t-1", "add", json!({"a": 1, "b": 1})),
                call("t-2", "subtract", json!({})),
            ]),
            ConverseResponse::end_turn("unreachable"),
        ]);
        let mut agent = Agent::new(model.clone()).with_tools(add_registry());

        let err = agent.chat("go").await.unwrap_err();

        assert!(matches!(err, AgentError::ToolNotFound(ref name) if name == "subtract"));
        assert_eq!(agent.transcript().len(), 2);
        assert_eq!(agent.transcript()[1].role, Role::Assistant);
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn handoff_folds_nested_result_and_usage() {
        let nested_model = StubModel::new(vec![
            ConverseResponse::end_turn("Two plus three is five.").with_usage(40, 10)
        ]);
        let factory_model = nested_model.clone();
        let spec = ToolSpec::handoff("tutor", "Ask the math tutor").unwrap();
        let tutor = HandoffTool::new(spec, move |_input: &Value| {
            Ok(Agent::new(factory_model.clone()).with_name("tutor"))
        });

        let model = StubModel::new(vec![
            ConverseResponse::tool_use(vec![call(
                "t-1",
                "tutor",
                json!({"request": "Explain 2 + 3"}),
            )])
            .with_usage(100, 20),
            ConverseResponse::end_turn("The tutor says five.").with_usage(150, 30),
        ]);
        let mut agent = Agent::new(model).with_tool(tutor).unwrap();

        agent.chat("Ask the tutor about 2 + 3").await.unwrap();

        assert_eq!(
            agent.transcript()[2],
            Turn::tool_results(vec![ToolResult::text("t-1", "Two plus three is five.")])
        );
        assert_eq!(
            *agent.usage(),
            UsageCounters {
                prompt_tokens: 290,
                completion_tokens: 60,
            }
        );

        let (key, nested) = agent.handoffs().iter().next().unwrap();
        assert!(key.starts_with("tutor-"));
        assert_eq!(key.len(), "tutor-".len() + 8);
        assert_eq!(nested[0], Turn::user("Explain 2 + 3"));
        assert_eq!(nested.len(), 2);
        assert_eq!(nested_model.requests()[0].messages, vec![Turn::user("Explain 2 + 3")]);
    }

    #[tokio::test]
    async fn handoff_without_request_field_sends_whole_input() {
        let nested_model = StubModel::new(vec![ConverseResponse::end_turn("ok")]);
        let factory_model = nested_model.clone();
        let spec = ToolSpec::builder("delegate").build().unwrap();
        let delegate = HandoffTool::new(spec, move |_input: &Value| {
            Ok(Agent::new(factory_model.clone()))
        });
        let model = StubModel::new(vec![
            ConverseResponse::tool_use(vec![call("t-1", "delegate", json!({"topic": "rust"}))]),
            ConverseResponse::end_turn("done"),
        ]);
        let mut agent = Agent::new(model).with_tool(delegate).unwrap();

        agent.chat("go").await.unwrap();

        assert_eq!(
            nested_model.requests()[0].messages,
            vec![Turn::user(r#"{"topic":"rust"}"#)]
        );
    }

    #[tokio::test]
    async fn stops_after_max_tool_rounds() {
        let looping = || ConverseResponse::tool_use(vec![call("t", "add", json!({"a": 0, "b": 0}))]);
        let model = StubModel::new(vec![looping(), looping(), looping(), looping()]);
        let mut agent = Agent::new(model)
            .with_tools(add_registry())
            .with_max_rounds(2);

        let err = agent.chat("loop forever").await.unwrap_err();

        assert!(matches!(err, AgentError::TooManyToolRounds(2)));
    }

    #[tokio::test]
    async fn unhandled_stop_reason_keeps_assistant_turn() {
        let truncated = ConverseResponse::new(Turn::assistant("partial"), StopReason::MaxTokens);
        let model = StubModel::new(vec![truncated]);
        let mut agent = Agent::new(model);

        let err = agent.chat("write a novel").await.unwrap_err();

        assert!(matches!(err, AgentError::UnhandledStopReason(ref r) if r == "max_tokens"));
        assert_eq!(agent.transcript().last(), Some(&Turn::assistant("partial")));
    }

    #[tokio::test]
    async fn malformed_input_never_reaches_the_model() {
        let model = StubModel::new(vec![ConverseResponse::end_turn("hi")]);
        let mut agent = Agent::new(model.clone());

        let err = agent
            .chat(json!({"role": "system", "content": [{"text": "x"}]}))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::InvalidTurn(_)));
        assert!(agent.transcript().is_empty());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_input_never_reaches_the_model() {
        let model = StubModel::new(vec![ConverseResponse::end_turn("hi")]);
        let mut agent = Agent::new(model.clone());

        let raw = agent.chat(json!([])).await.unwrap_err();
        let typed = agent.chat(Vec::<Turn>::new()).await.unwrap_err();

        assert!(matches!(raw, AgentError::InvalidTurn(_)));
        assert!(matches!(typed, AgentError::InvalidTurn(_)));
        assert!(agent.transcript().is_empty());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_assistant_turn_is_a_protocol_error() {
        let empty = ConverseResponse::new(
            Turn::new(Role::Assistant, Vec::new()),
            StopReason::EndTurn,
        )
        .with_usage(7, 0);
        let model = StubModel::new(vec![empty]);
        let mut agent = Agent::new(model);

        let err = agent.chat("think quietly").await.unwrap_err();

        assert!(matches!(err, AgentError::Protocol(_)));
        assert_eq!(agent.transcript(), &[Turn::user("think quietly")]);
        assert_eq!(agent.usage().prompt_tokens, 7);
    }

    #[tokio::test]
    async fn sends_system_prompt_and_config() {
        let model = StubModel::new(vec![ConverseResponse::end_turn("hi")]);
        let config = ModelConfig {
            model_id: "amazon.nova-lite-v1:0".into(),
            temperature: 0.1,
            top_p: 0.2,
            max_tokens: 64,
        };
        let mut agent = Agent::new(model.clone())
            .with_config(config)
            .with_system_prompt("You are terse.");

        agent.chat("hello").await.unwrap();

        let request = &model.requests()[0];
        assert_eq!(request.model_id, "amazon.nova-lite-v1:0");
        assert_eq!(request.inference_config.max_tokens, 64);
        assert_eq!(
            request.system,
            vec![SystemBlock {
                text: "You are terse.".into()
            }]
        );
    }

    #[tokio::test]
    async fn completion_does_not_dispatch_tools() {
        let model = StubModel::new(vec![ConverseResponse::tool_use(vec![call(
            "t-1",
            "add",
            json!({"a": 1, "b": 2}),
        )])]);
        let mut agent = Agent::new(model).with_tools(add_registry());

        let response = agent.completion("add 1 and 2").await.unwrap();

        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(agent.transcript().len(), 2);
    }

    #[tokio::test]
    async fn cost_is_zero_before_any_usage() {
        let agent = Agent::new(StubModel::new(Vec::new()));
        assert_eq!(agent.formatted_cost().unwrap(), "0.0000000000");
        assert_eq!(agent.total_tokens(), 0);

        let unpriced = Agent::new(StubModel::new(Vec::new())).with_config(ModelConfig {
            model_id: "unpriced-model".into(),
            ..ModelConfig::default()
        });
        assert!(matches!(
            unpriced.total_cost(),
            Err(AgentError::UnknownModelPricing(_))
        ));
    }

    #[tokio::test]
    async fn hooks_observe_each_step() {
        #[derive(Default)]
        struct RecordingHook {
            events: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl AgentHook for RecordingHook {
            async fn before_model(&self, _agent: &str, _request: &ConverseRequest) -> Result<()> {
                self.events.lock().unwrap().push("model".into());
                Ok(())
            }

            async fn before_tool_call(&self, _agent: &str, call: &ToolUse) -> Result<()> {
                self.events.lock().unwrap().push(format!("tool:{}", call.name));
                Ok(())
            }
        }

        let hook = Arc::new(RecordingHook::default());
        let model = StubModel::new(vec![
            ConverseResponse::tool_use(vec![call("t-1", "add", json!({"a": 1, "b": 2}))]),
            ConverseResponse::end_turn("3"),
        ]);
        let mut agent = Agent::new(model)
            .with_tools(add_registry())
            .with_hook(hook.clone());

        agent.chat("add").await.unwrap();

        assert_eq!(
            *hook.events.lock().unwrap(),
            vec!["model".to_string(), "tool:add".to_string(), "model".to_string()]
        );
    }

    #[tokio::test]
    async fn reset_keeps_usage() {
        let model = StubModel::new(vec![ConverseResponse::end_turn("hi").with_usage(3, 2)]);
        let mut agent = Agent::new(model);
        agent.chat("hello").await.unwrap();

        agent.reset();

        assert!(agent.transcript().is_empty());
        assert_eq!(agent.total_tokens(), 5);
    }
}
