//! Query Router
//!
//! Decides which calculators a free-text question needs. The LLM is asked
//! first for a JSON routing plan; when it is unreachable or answers with
//! nothing usable, a deterministic keyword table takes over.

use super::base::{parse_llm_json, prompts, truncate_chars, AgentKind};
use super::master::ConversationTurn;
use crate::services::{LlmService, RotationCursor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Turns of history included in the routing prompt
pub const CONTEXT_TURNS: usize = 3;

/// Characters of each earlier answer included in the routing prompt
pub const CONTEXT_ANSWER_CHARS: usize = 200;

/// Largest order quantity accepted from a routing plan
pub const MAX_PLAN_QUANTITY: u64 = 10_000_000;

const KEYWORDS: [(AgentKind, &[&str]); 6] = [
    (AgentKind::Demand, &["demand", "forecast", "predict", "future", "next month", "sales"]),
    (AgentKind::Transfer, &["transfer", "move stock", "between stores", "relocate"]),
    (AgentKind::Supplier, &["supplier", "vendor", "order from", "purchase"]),
    (AgentKind::Capital, &["budget", "afford", "capital", "cash flow", "roi"]),
    (AgentKind::Inventory, &["inventory", "stock", "reorder", "expiry", "expiring", "dead stock"]),
    (AgentKind::Pricing, &["discount", "price", "pricing", "margin", "clearance"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Single,
    Multi,
}

impl RouteKind {
    fn for_count(count: usize) -> Self {
        if count <= 1 {
            RouteKind::Single
        } else {
            RouteKind::Multi
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Ai,
    Keyword,
}

/// Which calculators to consult and with what parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPlan {
    pub agents: Vec<AgentKind>,
    pub parameters: BTreeMap<String, String>,
    pub kind: RouteKind,
    pub reasoning: String,
    pub source: RouteSource,
}

impl RoutingPlan {
    pub fn sku(&self) -> Option<&str> {
        self.parameters.get("sku").map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    pub fn days(&self) -> Option<i64> {
        self.parameters.get("days").and_then(|d| parse_number(d)).map(|d| d as i64)
    }

    /// Order quantity; values outside `0..=MAX_PLAN_QUANTITY` are dropped
    pub fn quantity(&self) -> Option<u64> {
        self.parameters
            .get("quantity")
            .and_then(|q| parse_number(q))
            .filter(|q| (0.0..=MAX_PLAN_QUANTITY as f64).contains(q))
            .map(|q| q as u64)
    }
}

/// Leading whitespace-delimited token as a finite number ("14 days", "1,000 units")
fn parse_number(text: &str) -> Option<f64> {
    let token: String = text.split_whitespace().next()?.chars().filter(|c| *c != ',').collect();
    token.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Deterministic keyword routing; Inventory when nothing matches
pub fn keyword_route(question: &str) -> RoutingPlan {
    let lower = question.to_lowercase();
    let mut agents: Vec<AgentKind> = KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(kind, _)| *kind)
        .collect();

    let kind = RouteKind::for_count(agents.len());
    if agents.is_empty() {
        agents.push(AgentKind::Inventory);
    }

    RoutingPlan {
        agents,
        parameters: BTreeMap::new(),
        kind,
        reasoning: "Keyword-based routing (fallback)".to_string(),
        source: RouteSource::Keyword,
    }
}

/// Condensed last few turns for the routing prompt
pub fn recent_context(history: &[ConversationTurn]) -> String {
    let start = history.len().saturating_sub(CONTEXT_TURNS);
    history[start..]
        .iter()
        .map(|turn| {
            format!(
                "User: {}\nAnswer: {}\n",
                turn.question,
                truncate_chars(&turn.answer, CONTEXT_ANSWER_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Route with the LLM, falling back to keywords
pub async fn route(
    llm: &LlmService,
    cursor: RotationCursor,
    question: &str,
    history: &[ConversationTurn],
) -> (RoutingPlan, RotationCursor) {
    let prompt = prompts::routing_prompt(question, &recent_context(history));
    let completion = llm.complete(cursor, &prompt).await;

    let response = match completion.result {
        Ok(text) => text,
        Err(e) => {
            warn!("Routing model unavailable, using keywords: {}", e);
            return (keyword_route(question), completion.cursor);
        }
    };
    debug!("Routing response: {}", truncate_chars(&response, 300));

    match parse_ai_route(&response) {
        Some(plan) => {
            info!("Routed to {:?} ({:?})", plan.agents, plan.kind);
            (plan, completion.cursor)
        }
        None => {
            warn!("Routing response named no known agents, using keywords");
            (keyword_route(question), completion.cursor)
        }
    }
}

// ============================================================================
// Response parsing
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct AiRoute {
    #[serde(default)]
    agents: Vec<String>,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    reasoning: String,
}

/// JSON first, then `AGENTS:`-style lines. `None` when no known agent is named.
pub fn parse_ai_route(response: &str) -> Option<RoutingPlan> {
    let (agents, parameters, kind, reasoning) = match parse_llm_json::<AiRoute>(response) {
        Ok(route) => {
            let parameters = route
                .parameters
                .into_iter()
                .filter_map(|(k, v)| value_to_string(v).map(|v| (k, v)))
                .collect();
            (route.agents, parameters, route.kind, route.reasoning)
        }
        Err(_) => parse_line_prefixes(response)?,
    };

    let mut known = Vec::new();
    for name in &agents {
        match AgentKind::from_name(name) {
            Some(kind) if !known.contains(&kind) => known.push(kind),
            Some(_) => {}
            None => debug!("Dropping unknown agent '{}'", name),
        }
    }
    if known.is_empty() {
        return None;
    }

    let kind = match kind.as_deref().map(|k| k.trim().to_lowercase()) {
        Some(k) if k == "multi" => RouteKind::Multi,
        Some(k) if k == "single" => RouteKind::Single,
        _ => RouteKind::for_count(known.len()),
    };

    Some(RoutingPlan {
        agents: known,
        parameters,
        kind,
        reasoning,
        source: RouteSource::Ai,
    })
}

type ParsedRoute = (Vec<String>, BTreeMap<String, String>, Option<String>, String);

fn parse_line_prefixes(response: &str) -> Option<ParsedRoute> {
    let mut agents = None;
    let mut parameters = BTreeMap::new();
    let mut kind = None;
    let mut reasoning = String::new();

    for line in response.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("AGENTS:") {
            agents = Some(
                rest.split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect::<Vec<_>>(),
            );
        } else if let Some(rest) = line.strip_prefix("PARAMETERS:") {
            for pair in rest.split(',') {
                if let Some((k, v)) = pair.split_once('=') {
                    parameters.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("TYPE:") {
            kind = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("REASONING:") {
            reasoning = rest.trim().to_string();
        }
    }

    agents.map(|a| (a, parameters, kind, reasoning))
}

fn value_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
