use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::llm::InferenceConfig;
use crate::usage::PricingTier;

/// Per-agent inference settings, sent verbatim on every model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl ModelConfig {
    pub fn inference(&self) -> InferenceConfig {
        InferenceConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_model_id() -> String {
    "amazon.nova-micro-v1:0".into()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_top_p() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub profile: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            profile: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub pricing_path: Option<String>,
    #[serde(default)]
    pub pricing_tier: PricingTier,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: None,
            max_rounds: default_max_rounds(),
            verbose: false,
            pricing_path: None,
            pricing_tier: PricingTier::default(),
        }
    }
}

fn default_agent_name() -> String {
    "agent".into()
}

fn default_max_rounds() -> usize {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| AgentError::Config(format!("Failed to parse configuration: {err}")))
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Defaults overlaid with `BEDROCK_AGENT_*` variables, for running without a file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(model_id) = env::var("BEDROCK_AGENT_MODEL_ID") {
            self.model.model_id = model_id;
        }
        if let Some(temperature) = parse_var::<f32>("BEDROCK_AGENT_TEMPERATURE")? {
            self.model.temperature = temperature;
        }
        if let Some(top_p) = parse_var::<f32>("BEDROCK_AGENT_TOP_P")? {
            self.model.top_p = top_p;
        }
        if let Some(max_tokens) = parse_var::<u32>("BEDROCK_AGENT_MAX_TOKENS")? {
            self.model.max_tokens = max_tokens;
        }
        if let Ok(region) = env::var("BEDROCK_AGENT_REGION") {
            self.aws.region = region;
        }
        if let Ok(profile) = env::var("BEDROCK_AGENT_PROFILE") {
            self.aws.profile = Some(profile);
        }
        if let Some(max_rounds) = parse_var::<usize>("BEDROCK_AGENT_MAX_ROUNDS")? {
            self.agent.max_rounds = max_rounds;
        }
        if let Some(verbose) = parse_var::<bool>("BEDROCK_AGENT_VERBOSE")? {
            self.agent.verbose = verbose;
        }
        if let Ok(path) = env::var("BEDROCK_AGENT_PRICING_PATH") {
            self.agent.pricing_path = Some(path);
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AgentError::Config(format!("`{key}` has an invalid value `{raw}`"))),
        Err(_) => Ok(None),
    }
}
