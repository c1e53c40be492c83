use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid turn: {0}")]
    InvalidTurn(String),

    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{tool}` parameter `{parameter}`: {reason}")]
    Schema {
        tool: String,
        parameter: String,
        reason: String,
    },

    #[error("invalid tool name `{0}`")]
    InvalidToolName(String),

    #[error("tool `{tool}` returned an unsupported value ({found})")]
    ToolResultType { tool: String, found: &'static str },

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("no pricing entry for model `{0}`")]
    UnknownModelPricing(String),

    #[error("model requested tools for more than {0} rounds")]
    TooManyToolRounds(usize),

    #[error("unhandled stop reason `{0}`")]
    UnhandledStopReason(String),

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
