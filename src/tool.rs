use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agent::Agent;
use crate::error::{AgentError, Result};

fn tool_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("valid pattern"))
}

fn param_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"))
}

/// JSON schema primitive a tool parameter maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Null => "null",
        }
    }
}

impl FromStr for ParamType {
    type Err = String;

    /// Accepts schema names and the common declared-type spellings.
    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(ParamType::String),
            "integer" | "int" => Ok(ParamType::Integer),
            "number" | "float" => Ok(ParamType::Number),
            "boolean" | "bool" => Ok(ParamType::Boolean),
            "array" | "list" => Ok(ParamType::Array),
            "object" | "dict" | "map" => Ok(ParamType::Object),
            "null" | "none" => Ok(ParamType::Null),
            other => Err(format!("unsupported parameter type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub description: String,
    pub required: bool,
}

/// Description of a tool as advertised to the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn builder(name: impl Into<String>) -> ToolSpecBuilder {
        ToolSpecBuilder {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            error: None,
        }
    }

    /// Spec for a tool that delegates to another agent through its `request` field.
    pub fn handoff(name: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        Self::builder(name)
            .description(description)
            .param(
                "request",
                ParamType::String,
                "The request to hand to the delegated agent",
            )
            .build()
    }

    pub fn validate(&self) -> Result<()> {
        if !tool_name_pattern().is_match(&self.name) {
            return Err(AgentError::InvalidToolName(self.name.clone()));
        }
        let mut seen = Vec::with_capacity(self.params.len());
        for param in &self.params {
            if !param_name_pattern().is_match(&param.name) {
                return Err(self.schema_error(&param.name, "not a valid parameter name"));
            }
            if seen.contains(&param.name.as_str()) {
                return Err(self.schema_error(&param.name, "declared more than once"));
            }
            seen.push(param.name.as_str());
        }
        Ok(())
    }

    fn schema_error(&self, parameter: &str, reason: impl Into<String>) -> AgentError {
        AgentError::Schema {
            tool: self.name.clone(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut property = json!({ "type": param.ty.as_str() });
            if !param.description.is_empty() {
                property["description"] = Value::String(param.description.clone());
            }
            properties.insert(param.name.clone(), property);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// `{"toolSpec": {name, description, inputSchema: {json: ...}}}`
    pub fn to_wire(&self) -> Value {
        json!({
            "toolSpec": {
                "name": self.name,
                "description": self.description,
                "inputSchema": { "json": self.input_schema() },
            }
        })
    }
}

pub struct ToolSpecBuilder {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    error: Option<AgentError>,
}

impl ToolSpecBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(
        self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.push(name.into(), ty, description.into(), true)
    }

    /// A parameter with a default on the tool side, so the model may omit it.
    pub fn optional(
        self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.push(name.into(), ty, description.into(), false)
    }

    /// Declares a parameter by type name (`"int"`, `"str"`, `"list"`, ...).
    /// Unknown names surface as a schema error from `build`.
    pub fn param_declared(
        mut self,
        name: impl Into<String>,
        declared_type: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        match declared_type.parse::<ParamType>() {
            Ok(ty) => self.push(name, ty, description.into(), required),
            Err(reason) => {
                if self.error.is_none() {
                    self.error = Some(AgentError::Schema {
                        tool: self.name.clone(),
                        parameter: name,
                        reason,
                    });
                }
                self
            }
        }
    }

    fn push(mut self, name: String, ty: ParamType, description: String, required: bool) -> Self {
        self.params.push(ParamSpec {
            name,
            ty,
            description,
            required,
        });
        self
    }

    pub fn build(self) -> Result<ToolSpec> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let spec = ToolSpec {
            name: self.name,
            description: self.description,
            params: self.params,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// What a tool hands back to the engine.
pub enum ToolOutcome {
    Text(String),
    Json(Value),
    /// Continue the conversation with another agent; its final text becomes the result.
    Handoff(Box<Agent>),
}

impl ToolOutcome {
    /// Strings stay text, objects and arrays stay structured, numbers and booleans
    /// are rendered as text. `null` is not a usable result.
    pub fn from_value(tool: &str, value: Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(ToolOutcome::Text(text)),
            Value::Object(_) | Value::Array(_) => Ok(ToolOutcome::Json(value)),
            Value::Number(n) => Ok(ToolOutcome::Text(n.to_string())),
            Value::Bool(b) => Ok(ToolOutcome::Text(b.to_string())),
            Value::Null => Err(AgentError::ToolResultType {
                tool: tool.to_string(),
                found: "null",
            }),
        }
    }
}

impl fmt::Debug for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutcome::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ToolOutcome::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ToolOutcome::Handoff(agent) => f.debug_tuple("Handoff").field(&agent.name()).finish(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    async fn call(&self, input: Value) -> Result<ToolOutcome>;
}

/// Wraps a plain function whose arguments deserialize from the model's input mapping.
pub struct FunctionTool<A, R, F> {
    spec: ToolSpec,
    func: F,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R, F> FunctionTool<A, R, F>
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> Result<R> + Send + Sync,
{
    pub fn new(spec: ToolSpec, func: F) -> Self {
        Self {
            spec,
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, R, F> Tool for FunctionTool<A, R, F>
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> Result<R> + Send + Sync,
{
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, input: Value) -> Result<ToolOutcome> {
        let args: A = serde_json::from_value(input)?;
        let value = serde_json::to_value((self.func)(args)?)?;
        ToolOutcome::from_value(&self.spec.name, value)
    }
}

/// A tool whose every invocation builds a fresh agent to take over the request.
pub struct HandoffTool<F> {
    spec: ToolSpec,
    factory: F,
}

impl<F> HandoffTool<F>
where
    F: Fn(&Value) -> Result<Agent> + Send + Sync,
{
    pub fn new(spec: ToolSpec, factory: F) -> Self {
        Self { spec, factory }
    }
}

#[async_trait]
impl<F> Tool for HandoffTool<F>
where
    F: Fn(&Value) -> Result<Agent> + Send + Sync,
{
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, input: Value) -> Result<ToolOutcome> {
        Ok(ToolOutcome::Handoff(Box::new((self.factory)(&input)?)))
    }
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Validates the tool's spec first; a rejected tool leaves the registry untouched.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        tool.spec().validate()?;
        let name = tool.spec().name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "replaced previously registered tool");
        }
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec().clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<ToolOutcome> {
        let tool = self.resolve(name)?;
        tool.call(input).await.map_err(|err| match err {
            err @ AgentError::ToolResultType { .. } => err,
            other => AgentError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(other),
            },
        })
    }
}
