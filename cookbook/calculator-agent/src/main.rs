use std::sync::Arc;

use bedrock_agent::{
    init_tracing, Agent, AgentError, AppConfig, BedrockClient, FunctionTool, HandoffTool,
    LanguageModel, ParamType, Result, ToolSpec,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct Operands {
    a: i64,
    b: i64,
}

fn overflow(op: &str, ops: &Operands) -> AgentError {
    AgentError::Protocol(format!("{} {op} {} overflows a 64-bit integer", ops.a, ops.b))
}

fn add(ops: Operands) -> Result<i64> {
    ops.a.checked_add(ops.b).ok_or_else(|| overflow("+", &ops))
}

fn multiply(ops: Operands) -> Result<i64> {
    ops.a.checked_mul(ops.b).ok_or_else(|| overflow("*", &ops))
}

fn operands_spec(name: &str, description: &str) -> Result<ToolSpec> {
    ToolSpec::builder(name)
        .description(description)
        .param("a", ParamType::Integer, "Left operand")
        .param("b", ParamType::Integer, "Right operand")
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.agent.verbose, false)?;

    let model: Arc<dyn LanguageModel> = Arc::new(BedrockClient::from_config(&config.aws).await);

    let tutor_model = model.clone();
    let tutor_config = config.model.clone();
    let tutor = HandoffTool::new(
        ToolSpec::handoff(
            "math_tutor",
            "Hand a conceptual arithmetic question to a patient tutor",
        )?,
        move |_input: &Value| {
            Ok(Agent::new(tutor_model.clone())
                .with_name("math_tutor")
                .with_config(tutor_config.clone())
                .with_system_prompt("Explain arithmetic step by step to a beginner."))
        },
    );

    let mut agent = Agent::from_config(model, &config)?
        .with_system_prompt(
            "Use the add and multiply tools for every calculation. \
             Ask math_tutor when the user wants an explanation.",
        )
        .with_tool(FunctionTool::new(
            operands_spec("add", "Add two integers")?,
            add,
        ))?
        .with_tool(FunctionTool::new(
            operands_spec("multiply", "Multiply two integers")?,
            multiply,
        ))?
        .with_tool(tutor)?;

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let question = if question.trim().is_empty() {
        "What is (12 + 30) * 3? Also explain why multiplication distributes over addition.".to_string()
    } else {
        question
    };

    let response = agent.chat(question).await?;

    println!("{}", agent.draw_trace());
    println!("Answer: {}", response.text());
    println!("Total tokens: {}", agent.total_tokens());
    match agent.formatted_cost() {
        Ok(cost) => println!("Cost: ${cost}"),
        Err(err) => tracing::warn!(%err, "cost unavailable"),
    }
    Ok(())
}
