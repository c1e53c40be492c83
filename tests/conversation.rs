use std::io::Write;
use std::sync::Arc;

use bedrock_agent::{
    Agent, AgentError, AppConfig, ContentBlock, ConverseResponse, FunctionTool, HandoffTool,
    ParamType, PricingTier, Role, StubModel, ToolResult, ToolResultContent, ToolSpec, ToolUse,
    Turn,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

#[derive(Deserialize)]
struct Operands {
    a: i64,
    b: i64,
}

fn add_tool() -> FunctionTool<Operands, i64, impl Fn(Operands) -> bedrock_agent::Result<i64>> {
    let spec = ToolSpec::builder("add")
        .description("Add two integers")
        .param("a", ParamType::Integer, "")
        .param("b", ParamType::Integer, "")
        .build()
        .unwrap();
    FunctionTool::new(spec, |ops: Operands| Ok(ops.a + ops.b))
}

fn tool_call(id: &str, name: &str, input: Value) -> ToolUse {
    ToolUse {
        tool_use_id: id.into(),
        name: name.into(),
        input,
    }
}

#[tokio::test]
async fn calculator_exchange_from_wire_responses() {
    let model = StubModel::from_json(&[
        r#"{
            "output": {"message": {"role": "assistant", "content": [
                {"text": "Let me add those."},
                {"toolUse": {"toolUseId": "tooluse_1", "name": "add", "input": {"a": 2, "b": 3}}}
            ]}},
            "stopReason": "tool_use",
            "usage": {"inputTokens": 420, "outputTokens": 35, "totalTokens": 455},
            "metrics": {"latencyMs": 210}
        }"#,
        r#"{
            "output": {"message": {"role": "assistant", "content": [{"text": "2 + 3 = 5"}]}},
            "stopReason": "end_turn",
            "usage": {"inputTokens": 480, "outputTokens": 12, "totalTokens": 492},
            "metrics": {"latencyMs": 150}
        }"#,
    ])
    .unwrap();
    let mut agent = Agent::new(model.clone()).with_tool(add_tool()).unwrap();

    let response = agent.chat("What is 2 + 3?").await.unwrap();

    assert_eq!(response.text(), "2 + 3 = 5");
    assert_eq!(agent.transcript().len(), 4);
    assert_eq!(
        agent.transcript()[2],
        Turn::tool_results(vec![ToolResult::text("tooluse_1", "5")])
    );
    assert_eq!(agent.usage().prompt_tokens, 900);
    assert_eq!(agent.usage().completion_tokens, 47);
    assert_eq!(agent.total_tokens(), 947);

    let wire = serde_json::to_value(&model.requests()[1]).unwrap();
    assert_eq!(wire["messages"][2]["role"], "user");
    assert_eq!(
        wire["messages"][2]["content"][0],
        json!({"toolResult": {"toolUseId": "tooluse_1", "content": [{"text": "5"}]}})
    );
    assert_eq!(
        wire["toolConfig"]["tools"][0]["toolSpec"]["inputSchema"]["json"]["required"],
        json!(["a", "b"])
    );

    let trace = agent.draw_trace();
    assert!(trace.contains("TOOL USE: add"));
    assert!(trace.contains("TOOL RESULT: 5"));
}

#[tokio::test]
async fn raw_turns_are_accepted_as_input() {
    let model = StubModel::new(vec![ConverseResponse::end_turn("Paris.")]);
    let mut agent = Agent::new(model.clone());

    agent
        .chat(json!([
            {"role": "user", "content": [{"text": "Capital of France?"}]},
            {"role": "assistant", "content": [{"text": "Do you mean today?"}]},
            {"role": "user", "content": [{"text": "Yes."}]}
        ]))
        .await
        .unwrap();

    assert_eq!(model.requests()[0].messages.len(), 3);
    assert_eq!(agent.transcript().len(), 4);
    assert_eq!(agent.transcript()[1].role, Role::Assistant);
}

#[tokio::test]
async fn text_and_tool_use_in_one_item_is_rejected() {
    let model = StubModel::new(vec![ConverseResponse::end_turn("unused")]);
    let mut agent = Agent::new(model.clone());

    let err = agent
        .chat(json!({"role": "user", "content": [{
            "text": "hi",
            "toolUse": {"toolUseId": "t", "name": "add", "input": {}}
        }]}))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::InvalidTurn(_)));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn structured_results_stay_json() {
    let spec = ToolSpec::builder("lookup")
        .param("city", ParamType::String, "City name")
        .build()
        .unwrap();
    let lookup = FunctionTool::new(spec, |args: Value| {
        Ok(json!({"city": args["city"], "population": 2_100_000}))
    });
    let model = StubModel::new(vec![
        ConverseResponse::tool_use(vec![tool_call("t-1", "lookup", json!({"city": "Paris"}))]),
        ConverseResponse::end_turn("About two million."),
    ]);
    let mut agent = Agent::new(model).with_tool(lookup).unwrap();

    agent.chat("How many people live in Paris?").await.unwrap();

    match &agent.transcript()[2].content[0] {
        ContentBlock::ToolResult(result) => assert_eq!(
            result.content,
            vec![ToolResultContent::Json(
                json!({"city": "Paris", "population": 2_100_000})
            )]
        ),
        other => panic!("expected a tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn null_tool_result_is_a_type_error() {
    let spec = ToolSpec::builder("nothing").build().unwrap();
    let nothing = FunctionTool::new(spec, |_: Value| Ok(Option::<i64>::None));
    let model = StubModel::new(vec![ConverseResponse::tool_use(vec![tool_call(
        "t-1",
        "nothing",
        json!({}),
    )])]);
    let mut agent = Agent::new(model).with_tool(nothing).unwrap();

    let err = agent.chat("do nothing").await.unwrap_err();

    assert!(matches!(err, AgentError::ToolResultType { ref tool, .. } if tool == "nothing"));
}

#[tokio::test]
async fn failing_tool_surfaces_as_invocation_error() {
    let spec = ToolSpec::builder("divide")
        .param("a", ParamType::Integer, "")
        .param("b", ParamType::Integer, "")
        .build()
        .unwrap();
    let divide = FunctionTool::new(spec, |ops: Operands| {
        ops.a
            .checked_div(ops.b)
            .ok_or_else(|| AgentError::Protocol("division by zero".into()))
    });
    let model = StubModel::new(vec![ConverseResponse::tool_use(vec![tool_call(
        "t-1",
        "divide",
        json!({"a": 1, "b": 0}),
    )])]);
    let mut agent = Agent::new(model).with_tool(divide).unwrap();

    let err = agent.chat("1 / 0").await.unwrap_err();

    assert!(matches!(err, AgentError::ToolInvocation { ref name, .. } if name == "divide"));
}

#[tokio::test]
async fn nested_handoffs_are_all_traced() {
    let inner_model = StubModel::new(vec![
        ConverseResponse::end_turn("inner answer").with_usage(5, 1)
    ]);
    let inner_factory_model = inner_model.clone();
    let specialist = HandoffTool::new(
        ToolSpec::handoff("specialist", "Deep dive").unwrap(),
        move |_: &Value| Ok(Agent::new(inner_factory_model.clone()).with_name("specialist")),
    );

    let middle_model = StubModel::new(vec![
        ConverseResponse::tool_use(vec![tool_call(
            "m-1",
            "specialist",
            json!({"request": "details please"}),
        )])
        .with_usage(20, 4),
        ConverseResponse::end_turn("middle answer").with_usage(30, 6),
    ]);
    let specialist = Arc::new(specialist);
    let middle_factory_model = middle_model.clone();
    let generalist = HandoffTool::new(
        ToolSpec::handoff("generalist", "General help").unwrap(),
        move |_: &Value| {
            let mut agent = Agent::new(middle_factory_model.clone()).with_name("generalist");
            agent.tools_mut().register_arc(specialist.clone())?;
            Ok(agent)
        },
    );

    let top_model = StubModel::new(vec![
        ConverseResponse::tool_use(vec![tool_call(
            "t-1",
            "generalist",
            json!({"request": "help"}),
        )])
        .with_usage(100, 10),
        ConverseResponse::end_turn("top answer").with_usage(120, 12),
    ]);
    let mut agent = Agent::new(top_model).with_tool(generalist).unwrap();

    let response = agent.chat("start").await.unwrap();

    assert_eq!(response.text(), "top answer");
    assert_eq!(
        agent.transcript()[2],
        Turn::tool_results(vec![ToolResult::text("t-1", "middle answer")])
    );
    assert_eq!(agent.usage().prompt_tokens, 275);
    assert_eq!(agent.usage().completion_tokens, 33);

    let keys: Vec<&String> = agent.handoffs().keys().collect();
    assert_eq!(keys.len(), 2);
    let outer = keys.iter().find(|k| !k.contains('/')).unwrap();
    let inner = keys.iter().find(|k| k.contains('/')).unwrap();
    assert!(outer.starts_with("generalist-"));
    assert!(inner.starts_with(outer.as_str()));
    assert!(inner.contains("/specialist-"));
    assert_eq!(agent.handoffs()[*inner].last(), Some(&Turn::assistant("inner answer")));

    let trace = agent.draw_trace();
    assert!(trace.contains(&format!("HANDOFF: {outer}")));
    assert!(trace.contains("TEXT: inner answer"));
}

#[tokio::test]
async fn agent_from_config_uses_pricing_file_and_tier() {
    let mut pricing = NamedTempFile::new().unwrap();
    write!(
        pricing,
        r#"{{"custom-model": {{"on_demand": {{"input": 1.0, "output": 2.0}}, "batch": {{"input": 0.5, "output": 1.0}}}}}}"#
    )
    .unwrap();
    let toml = format!(
        "[model]\nmodel_id = 'custom-model'\n[agent]\nname = 'billing'\nsystem_prompt = 'Be exact.'\npricing_tier = 'batch'\npricing_path = '{}'\n",
        pricing.path().display()
    );
    let config = AppConfig::from_toml_str(&toml).unwrap();
    assert_eq!(config.agent.pricing_tier, PricingTier::Batch);

    let model = StubModel::new(vec![ConverseResponse::end_turn("ok").with_usage(1000, 2000)]);
    let mut agent = Agent::from_config(model.clone(), &config).unwrap();
    agent.chat("bill me").await.unwrap();

    assert_eq!(agent.name(), "billing");
    assert_eq!(model.requests()[0].system[0].text, "Be exact.");
    assert_eq!(agent.formatted_cost().unwrap(), "2.5000000000");
}
