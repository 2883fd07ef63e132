//! Base Agent Types
//!
//! The closed set of calculators the master agent can consult, the report
//! each one hands back, and the prompt templates shared by routing and
//! synthesis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The calculators a question can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Demand,
    Transfer,
    Supplier,
    Capital,
    Inventory,
    Pricing,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Demand,
        AgentKind::Transfer,
        AgentKind::Supplier,
        AgentKind::Capital,
        AgentKind::Inventory,
        AgentKind::Pricing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Demand => "demand",
            AgentKind::Transfer => "transfer",
            AgentKind::Supplier => "supplier",
            AgentKind::Capital => "capital",
            AgentKind::Inventory => "inventory",
            AgentKind::Pricing => "pricing",
        }
    }

    /// Accepts the canonical names plus the longer forms an LLM tends to emit
    /// ("demand_forecast", "Pricing Agent", ...). Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '[' || c == ']')
            .to_lowercase()
            .replace([' ', '-'], "_");
        let normalized = normalized.trim_end_matches("_agent");

        match normalized {
            "demand" | "demand_forecast" | "forecast" | "forecasting" => Some(AgentKind::Demand),
            "transfer" | "transfers" | "store_transfer" => Some(AgentKind::Transfer),
            "supplier" | "suppliers" | "supplier_scoring" => Some(AgentKind::Supplier),
            "capital" | "working_capital" | "finance" => Some(AgentKind::Capital),
            "inventory" | "stock" => Some(AgentKind::Inventory),
            "pricing" | "price" | "discount" => Some(AgentKind::Pricing),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AgentKind::Demand => "sales forecasting, demand prediction, seasonal surges",
            AgentKind::Transfer => "stock balancing and transfers between stores",
            AgentKind::Supplier => "supplier scoring, risk and order splitting",
            AgentKind::Capital => "working capital, budget checks, purchase ROI",
            AgentKind::Inventory => "stock levels, reorder points, dead stock, expiry",
            AgentKind::Pricing => "discounts, clearance pricing, margin simulation, bundles",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a calculator hands back to the master agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    /// Which calculator produced the report
    pub agent: AgentKind,
    /// Operation that ran, e.g. "dead_stock"
    pub operation: String,
    /// One-paragraph plain-text summary
    pub summary: String,
    /// Whether anything in the report needs attention today
    pub requires_attention: bool,
    /// Full structured result
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AgentReport {
    pub fn new(agent: AgentKind, operation: &str, summary: impl Into<String>) -> Self {
        Self {
            agent,
            operation: operation.to_string(),
            summary: summary.into(),
            requires_attention: false,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_attention(mut self, requires: bool) -> Self {
        self.requires_attention = requires;
        self
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> crate::error::Result<Self> {
        self.data = serde_json::to_value(data)?;
        Ok(self)
    }
}

/// Parse a JSON object out of an LLM response that may wrap it in prose or
/// markdown fences.
pub fn parse_llm_json<T: serde::de::DeserializeOwned>(response: &str) -> crate::error::Result<T> {
    let json_str = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &response[start..=end],
        _ => response,
    };

    Ok(serde_json::from_str(json_str)?)
}

/// Truncate to at most `max_chars` characters, appending "..." when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// LLM prompt templates for agents
pub mod prompts {
    use super::AgentKind;

    /// Ask the model which calculators a question needs
    pub fn routing_prompt(question: &str, recent_context: &str) -> String {
        let agents = AgentKind::ALL
            .iter()
            .map(|k| format!("- {}: {}", k.as_str(), k.description()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You are the routing layer of a pharmacy operations assistant. Decide which analysis agents are needed to answer the question.

Available agents:
{}

Recent conversation:
{}

Question: {}

Respond with a JSON object only:
{{
    "agents": ["agent_name", ...],
    "parameters": {{"sku": "optional sku", "days": 30, "quantity": 1000}},
    "type": "single" or "multi",
    "reasoning": "one sentence"
}}"#,
            agents,
            if recent_context.is_empty() { "(none)" } else { recent_context },
            question
        )
    }

    /// Ask the model to turn calculator outputs into one answer
    pub fn synthesis_prompt(question: &str, agent_results: &str) -> String {
        format!(
            r#"You are a pharmacy operations advisor. Answer the manager's question using only the analysis results below.

Question: {}

Analysis results:
{}

Write a concise answer with:
1. A direct answer to the question
2. The key numbers that support it
3. Up to three concrete actions, most urgent first

Do not invent products, stores or figures that are not in the results."#,
            question, agent_results
        )
    }
}
