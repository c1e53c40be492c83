//! Token accounting and cost estimation.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::llm::TokenUsage;

const BUILTIN_PRICING: &str = include_str!("../pricing.json");

/// Running token totals for one agent, including anything absorbed from handoffs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageCounters {
    pub fn record(&mut self, usage: &TokenUsage) {
        self.prompt_tokens += usage.input_tokens;
        self.completion_tokens += usage.output_tokens;
    }

    pub fn merge_from(&mut self, other: &UsageCounters) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceType {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceCategory {
    pub on_demand: PriceType,
    pub batch: PriceType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    #[default]
    OnDemand,
    Batch,
}

/// Price per 1000 tokens, keyed by model id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    models: HashMap<String, PriceCategory>,
}

impl PricingTable {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_PRICING).unwrap_or_default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn get(&self, model_id: &str) -> Result<&PriceCategory> {
        self.models
            .get(model_id)
            .ok_or_else(|| AgentError::UnknownModelPricing(model_id.to_string()))
    }

    pub fn cost(&self, model_id: &str, usage: &UsageCounters, tier: PricingTier) -> Result<f64> {
        let category = self.get(model_id)?;
        let prices = match tier {
            PricingTier::OnDemand => category.on_demand,
            PricingTier::Batch => category.batch,
        };
        Ok(prices.input * usage.prompt_tokens as f64 / 1000.0
            + prices.output * usage.completion_tokens as f64 / 1000.0)
    }
}

/// Fixed ten-decimal rendering used for cost display.
pub fn format_cost(cost: f64) -> String {
    format!("{cost:.10}")
}
