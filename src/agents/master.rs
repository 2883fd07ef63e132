//! Master Agent
//!
//! Answers free-text questions by routing them to the calculators, running
//! each one against the snapshot and asking the LLM to turn the results into
//! one answer. Keeps the conversation history and the credential rotation
//! cursor between questions.

use super::base::{prompts, truncate_chars, AgentKind, AgentReport};
use super::router::{self, RouteKind, RoutingPlan};
use super::{capital, forecast, inventory, pricing, supplier, transfer};
use crate::config::{CapitalConfig, PolicyConfig};
use crate::data::Snapshot;
use crate::error::{AgentError, Result};
use crate::services::{LlmService, RotationCursor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_DAYS: i64 = 30;
pub const DEFAULT_QUANTITY: u64 = 1000;

/// Characters of each calculator result embedded in the synthesis prompt
const RESULT_PROMPT_CHARS: usize = 500;

const REORDER_TOP_N: usize = 10;
const BUNDLE_TOP_N: usize = 5;
const RESCUE_THRESHOLD_DAYS: i64 = 30;

/// One answered question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    pub agents: Vec<AgentKind>,
}

/// Outcome of consulting one calculator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Consultation {
    Completed(AgentReport),
    Failed { agent: AgentKind, message: String },
}

impl Consultation {
    pub fn agent(&self) -> AgentKind {
        match self {
            Consultation::Completed(report) => report.agent,
            Consultation::Failed { agent, .. } => *agent,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Consultation::Completed(_))
    }

    fn summary(&self) -> String {
        match self {
            Consultation::Completed(report) => report.summary.clone(),
            Consultation::Failed { message, .. } => format!("unavailable ({})", message),
        }
    }

    fn prompt_block(&self) -> String {
        let body = match self {
            Consultation::Completed(report) => match serde_json::to_string(report) {
                Ok(json) => json,
                Err(_) => report.summary.clone(),
            },
            Consultation::Failed { message, .. } => format!("failed: {}", message),
        };
        format!(
            "{} AGENT:\n{}",
            self.agent().as_str().to_uppercase(),
            truncate_chars(&body, RESULT_PROMPT_CHARS)
        )
    }
}

/// Answer to one question together with how it was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterAnswer {
    pub question: String,
    pub answer: String,
    pub plan: RoutingPlan,
    pub consultations: Vec<Consultation>,
    /// False when the LLM was unavailable and the calculator summaries were joined instead
    pub synthesized: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for MasterAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        writeln!(f, "{}", rule)?;
        writeln!(f, "📊 ANSWER")?;
        writeln!(f, "{}\n", rule)?;
        writeln!(f, "{}\n", self.answer.trim())?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "🔧 CONSULTATION DETAILS")?;
        writeln!(f, "{}", rule)?;
        for c in &self.consultations {
            let mark = if c.succeeded() { "✓" } else { "✗" };
            writeln!(f, "  {} {} agent", mark, c.agent())?;
        }
        let kind = match self.plan.kind {
            RouteKind::Single => "Single",
            RouteKind::Multi => "Multi",
        };
        writeln!(f, "Question type: {} ({:?} routing)", kind, self.plan.source)?;
        writeln!(f, "Timestamp: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"))?;
        write!(f, "{}", rule)
    }
}

/// Routes questions to the calculators and synthesizes their results
pub struct MasterAgent {
    snapshot: Snapshot,
    llm: LlmService,
    policy: PolicyConfig,
    capital: CapitalConfig,
    cursor: RotationCursor,
    history: Vec<ConversationTurn>,
}

impl MasterAgent {
    pub fn new(snapshot: Snapshot, llm: LlmService) -> Self {
        Self {
            snapshot,
            llm,
            policy: PolicyConfig::default(),
            capital: CapitalConfig::default(),
            cursor: RotationCursor::default(),
            history: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_capital(mut self, capital: CapitalConfig) -> Self {
        self.capital = capital;
        self
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn cursor(&self) -> RotationCursor {
        self.cursor
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        info!("Conversation history cleared");
    }

    /// Route, consult and synthesize. Calculator failures are reported per
    /// agent; an unreachable LLM degrades to the joined calculator summaries.
    pub async fn ask(&mut self, question: &str) -> MasterAnswer {
        info!("Question: {}", question);

        let (plan, cursor) = router::route(&self.llm, self.cursor, question, &self.history).await;
        self.cursor = cursor;
        info!("Consulting {:?}: {}", plan.agents, plan.reasoning);

        let consultations: Vec<Consultation> = plan
            .agents
            .iter()
            .map(|agent| match self.consult(*agent, &plan, question) {
                Ok(report) => Consultation::Completed(report),
                Err(e) => {
                    warn!("{} agent failed: {}", agent, e);
                    Consultation::Failed {
                        agent: *agent,
                        message: e.to_string(),
                    }
                }
            })
            .collect();

        let (answer, synthesized) = self.synthesize(question, &plan, &consultations).await;

        let timestamp = Utc::now();
        self.history.push(ConversationTurn {
            id: Uuid::new_v4(),
            timestamp,
            question: question.to_string(),
            answer: answer.clone(),
            agents: plan.agents.clone(),
        });

        MasterAnswer {
            question: question.to_string(),
            answer,
            plan,
            consultations,
            synthesized,
            timestamp,
        }
    }

    async fn synthesize(&mut self, question: &str, plan: &RoutingPlan, consultations: &[Consultation]) -> (String, bool) {
        let consulted = plan.agents.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ");
        let mut results = format!("Agents consulted: {}\nRouting reasoning: {}\n", consulted, plan.reasoning);
        for c in consultations {
            results.push('\n');
            results.push_str(&c.prompt_block());
            results.push('\n');
        }

        let prompt = prompts::synthesis_prompt(question, &results);
        let completion = self.llm.complete(self.cursor, &prompt).await;
        self.cursor = completion.cursor;

        match completion.result {
            Ok(text) => (text, true),
            Err(e) => {
                warn!("Synthesis unavailable, joining agent summaries: {}", e);
                let mut answer = format!("Based on consultation with {} agent(s):\n\n", consulted);
                for c in consultations {
                    answer.push_str(&format!("**{}:** {}\n\n", c.agent().as_str().to_uppercase(), c.summary()));
                }
                (answer, false)
            }
        }
    }

    fn default_sku(&self, plan: &RoutingPlan) -> Result<String> {
        match plan.sku() {
            Some(sku) => Ok(sku.to_string()),
            None => self
                .snapshot
                .skus()
                .first()
                .map(|s| s.to_string())
                .ok_or_else(|| AgentError::InvalidInput("no inventory loaded".to_string())),
        }
    }

    /// Run one calculator for a routed question
    pub fn consult(&self, agent: AgentKind, plan: &RoutingPlan, question: &str) -> Result<AgentReport> {
        match agent {
            AgentKind::Demand => self.consult_demand(plan),
            AgentKind::Transfer => self.consult_transfer(),
            AgentKind::Supplier => self.consult_supplier(plan),
            AgentKind::Capital => self.consult_capital(plan),
            AgentKind::Inventory => self.consult_inventory(plan, question),
            AgentKind::Pricing => self.consult_pricing(plan, question),
        }
    }

    fn consult_demand(&self, plan: &RoutingPlan) -> Result<AgentReport> {
        let sku = self.default_sku(plan)?;
        let horizon = plan.days().unwrap_or(DEFAULT_DAYS).clamp(1, 365) as usize;
        let result = forecast::forecast(&self.snapshot, &sku, horizon)?;

        let summary = format!(
            "{} ({}): {:.1} units/day forecast over {} days ({:+.1}% vs history), {} mover, {} surge day(s). {}",
            result.product_name,
            result.sku,
            result.statistics.average_daily_predicted,
            result.horizon_days,
            result.statistics.trend_percentage,
            result.velocity_class.label(),
            result.surge_alerts.len(),
            result.reorder_timing.message
        );
        let attention = result.reorder_timing.urgency != forecast::ReorderUrgency::Normal || !result.surge_alerts.is_empty();

        AgentReport::new(AgentKind::Demand, "forecast", summary)
            .with_attention(attention)
            .with_data(&result)
    }

    fn consult_transfer(&self) -> Result<AgentReport> {
        let suggestions = inventory::transfer_suggestions(&self.snapshot, &self.policy);
        let rescues = transfer::expiry_rescue(&self.snapshot, RESCUE_THRESHOLD_DAYS);
        let expiry_driven = transfer::expiry_driven_transfers(&self.snapshot);

        let high = suggestions
            .iter()
            .filter(|s| s.urgency != transfer::TransferUrgency::Medium)
            .count();
        let summary = format!(
            "{} balancing transfer(s) ({} high urgency), {} expiry-driven transfer(s), {} expiry rescue transfer(s)",
            suggestions.len(),
            high,
            expiry_driven.len(),
            rescues.len()
        );

        AgentReport::new(AgentKind::Transfer, "transfer_suggestions", summary)
            .with_attention(high > 0 || !rescues.is_empty() || !expiry_driven.is_empty())
            .with_data(&serde_json::json!({
                "balance_suggestions": suggestions,
                "expiry_driven": expiry_driven,
                "expiry_rescue": rescues,
            }))
    }

    fn consult_supplier(&self, plan: &RoutingPlan) -> Result<AgentReport> {
        let sku = self.default_sku(plan)?;
        let ranking = supplier::rank_suppliers(&self.snapshot, &sku)?;
        let split = supplier::split_order(&self.snapshot, &sku, plan.quantity().unwrap_or(DEFAULT_QUANTITY))?;
        let alerts = supplier::risk_alerts(&self.snapshot);

        let best = &ranking.suppliers[0];
        let allocation = split
            .allocation
            .iter()
            .map(|a| format!("{} units from {}", a.quantity, a.supplier_name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut summary = format!(
            "Best supplier for {}: {} (score {:.1}, {:?} risk) of {} candidate(s). Order of {}: {}",
            sku,
            best.supplier_name,
            best.composite_score,
            best.risk_level,
            ranking.suppliers.len(),
            split.total_quantity,
            allocation
        );
        if !alerts.is_empty() {
            summary.push_str(&format!(". {} supplier(s) flagged for risk", alerts.len()));
        }

        AgentReport::new(AgentKind::Supplier, "rank_suppliers", summary)
            .with_attention(best.risk_level != supplier::RiskLevel::Low)
            .with_data(&serde_json::json!({
                "ranking": ranking,
                "split_order": split,
                "risk_alerts": alerts,
            }))
    }

    fn consult_capital(&self, plan: &RoutingPlan) -> Result<AgentReport> {
        let cost_ratio = self.policy.cost_ratio;
        let position = capital::capital_position(&self.snapshot, &self.capital, cost_ratio);
        let optimization = capital::capital_recommendations(&self.snapshot, &self.capital, cost_ratio);
        let horizon = plan.days().unwrap_or(DEFAULT_DAYS).clamp(1, 365) as u32;
        let cash_flow = capital::cash_flow_forecast(&self.snapshot, cost_ratio, horizon);

        let mut summary = format!(
            "Inventory ${:.2}, DIO {:.1} days vs target {:.0} ({}), budget ${:.2} available",
            position.total_inventory_value,
            position.dio,
            position.target_dio,
            if position.on_target { "on target" } else { "above target" },
            position.available_budget
        );

        // A positive quantity in the question means a purchase to validate
        let validation = match plan.quantity().filter(|q| *q > 0) {
            Some(quantity) => {
                let sku = self.default_sku(plan)?;
                let unit_price = self
                    .snapshot
                    .inventory_for(&sku)
                    .map(|r| r.unit_price)
                    .next()
                    .ok_or_else(|| AgentError::SkuNotFound(sku.clone()))?;
                let v = capital::validate_purchase(
                    &self.snapshot,
                    &self.capital,
                    cost_ratio,
                    &sku,
                    quantity,
                    unit_price * cost_ratio,
                )?;
                summary.push_str(&format!(
                    ". Purchase of {} x {}: {:?} ({})",
                    quantity, sku, v.decision, v.recommendation
                ));
                Some(v)
            }
            None => None,
        };

        let attention = !position.on_target
            || validation
                .as_ref()
                .map_or(false, |v| v.decision != capital::PurchaseDecision::Approved);

        AgentReport::new(AgentKind::Capital, "capital_position", summary)
            .with_attention(attention)
            .with_data(&serde_json::json!({
                "position": position,
                "optimization": optimization,
                "cash_flow": cash_flow,
                "purchase_validation": validation,
            }))
    }

    fn consult_inventory(&self, plan: &RoutingPlan, question: &str) -> Result<AgentReport> {
        let lower = question.to_lowercase();

        if lower.contains("dead stock") {
            let report = inventory::dead_stock(&self.snapshot, self.policy.dead_stock_days, self.policy.dead_stock_min_value);
            let summary = format!(
                "{} dead stock item(s) with no sales in {} days, ${:.2} locked",
                report.items.len(),
                report.window_days,
                report.total_value_locked
            );
            AgentReport::new(AgentKind::Inventory, "dead_stock", summary)
                .with_attention(!report.items.is_empty())
                .with_data(&report)
        } else if lower.contains("expir") {
            let report = inventory::expiry_report(&self.snapshot, self.policy.expiry_threshold_days);
            let summary = format!(
                "{} critical, {} warning, {} watch item(s) expiring within {} days; ${:.2} at risk",
                report.critical_count,
                report.warning_count,
                report.watch_count,
                report.threshold_days,
                report.total_value_at_risk
            );
            AgentReport::new(AgentKind::Inventory, "expiry_report", summary)
                .with_attention(report.critical_count > 0)
                .with_data(&report)
        } else if lower.contains("reorder") {
            let report = inventory::reorder_recommendations(&self.snapshot, &self.policy, REORDER_TOP_N);
            let urgent = report
                .recommendations
                .iter()
                .filter(|r| r.priority == inventory::ReorderPriority::Urgent)
                .count();
            let summary = format!(
                "{} sku(s) at or below reorder point, {} urgent",
                report.total_reorder_needed, urgent
            );
            AgentReport::new(AgentKind::Inventory, "reorder_recommendations", summary)
                .with_attention(urgent > 0)
                .with_data(&report)
        } else {
            let view = inventory::stock_visibility(&self.snapshot, plan.sku(), None)?;
            let summary = format!(
                "{:.0} units worth ${:.2} across {} store(s) and {} product(s)",
                view.total_units, view.total_value, view.stores_count, view.products_count
            );
            AgentReport::new(AgentKind::Inventory, "stock_visibility", summary).with_data(&view)
        }
    }

    fn consult_pricing(&self, plan: &RoutingPlan, question: &str) -> Result<AgentReport> {
        let lower = question.to_lowercase();

        if lower.contains("clearance") {
            let items = pricing::clearance_pricing(&self.snapshot, self.policy.clearance_threshold_days, &self.policy);
            let revenue: f64 = items.iter().map(|i| i.potential_revenue).sum();
            let summary = format!(
                "{} item(s) for clearance within {} days of expiry, ${:.2} recoverable",
                items.len(),
                self.policy.clearance_threshold_days,
                revenue
            );
            return AgentReport::new(AgentKind::Pricing, "clearance_pricing", summary)
                .with_attention(!items.is_empty())
                .with_data(&items);
        }

        if lower.contains("bundle") {
            let bundles = pricing::bundle_offers(&self.snapshot, BUNDLE_TOP_N);
            let summary = match bundles.first() {
                Some(b) => format!(
                    "{} bundle offer(s); top pair {} + {} bought together {} time(s), ${:.2}",
                    bundles.len(),
                    b.product_1,
                    b.product_2,
                    b.bought_together_count,
                    b.bundle_price
                ),
                None => "No products are bought together often enough to bundle".to_string(),
            };
            return AgentReport::new(AgentKind::Pricing, "bundle_offers", summary).with_data(&bundles);
        }

        let sku = self.default_sku(plan)?;

        if lower.contains("simulat") || lower.contains("scenario") || lower.contains("what if") {
            let sim = pricing::simulate_margin(&self.snapshot, &sku, &pricing::DEFAULT_SCENARIOS, &self.policy)?;
            let summary = format!(
                "{} ({}): margin peaks at {:.0}% discount (${:.2} vs ${:.2} today)",
                sim.product_name, sim.sku, sim.optimal_discount, sim.optimal_margin, sim.baseline.total_margin
            );
            return AgentReport::new(AgentKind::Pricing, "simulate_margin", summary).with_data(&sim);
        }

        let rec = pricing::recommend_discount(&self.snapshot, &sku, &self.policy)?;

        let summary = if rec.recommended_discount_pct > 0.0 {
            format!(
                "{} ({}): discount {:.1}% to ${:.2} ({}); margin {:.1}%, expected uplift {:.1}%",
                rec.product_name,
                rec.sku,
                rec.recommended_discount_pct,
                rec.discounted_price,
                rec.reason,
                rec.projected_margin_pct,
                rec.projected_uplift_pct
            )
        } else {
            format!("{} ({}): hold price at ${:.2}, no discount warranted", rec.product_name, rec.sku, rec.current_price)
        };

        AgentReport::new(AgentKind::Pricing, "recommend_discount", summary)
            .with_attention(rec.recommended_discount_pct > 0.0)
            .with_data(&rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::*;
    use crate::data::SupplierProfile;
    use crate::services::llm::testing::ScriptedBackend;
    use crate::services::CompletionError;
    use std::sync::Arc;

    fn snapshot() -> Snapshot {
        let as_of = date(2024, 6, 1);
        let mut sales = daily_sales(as_of, "MED001", "S1", 60, |i| 8.0 + (i % 7) as f64);
        sales.extend(daily_sales(as_of, "MED001", "S2", 60, |_| 2.0));
        let inventory = vec![
            stock("MED001", "S1", 40.0, 12.0, date(2024, 6, 10)),
            stock("MED001", "S2", 400.0, 12.0, date(2025, 6, 1)),
            stock("MED002", "S1", 50.0, 30.0, date(2025, 6, 1)),
        ];
        let supplier = SupplierProfile {
            supplier_id: "SUP001".into(),
            supplier_name: "Acme Pharma".into(),
            fill_rate: 0.95,
            cancellation_rate: 0.01,
            delay_rate: 0.02,
            avg_lead_time_days: 3.0,
            lead_time_variance: 0.4,
            on_time_delivery_rate: 0.93,
            price_competitiveness: 0.8,
            avg_shelf_life_pct: 90.0,
            expired_on_arrival_rate: 0.001,
            gmp_certified: true,
            iso_certified: true,
            fda_approved: true,
            audit_score: 95.0,
            compliance_violations: 0,
            skus: String::new(),
        };
        Snapshot::new(as_of, sales, inventory).with_suppliers(vec![supplier])
    }

    fn agent<F>(responder: F) -> MasterAgent
    where
        F: Fn(&str, &str, &str) -> std::result::Result<String, CompletionError> + Send + Sync + 'static,
    {
        let llm = LlmService::new(Arc::new(ScriptedBackend::new(responder)), vec!["k1".into(), "k2".into()], vec!["m".into()], 0.7);
        MasterAgent::new(snapshot(), llm)
    }

    fn is_routing(prompt: &str) -> bool {
        prompt.contains("routing layer")
    }

    #[tokio::test]
    async fn test_ask_routes_and_synthesizes() {
        let mut master = agent(|_, _, prompt| {
            if is_routing(prompt) {
                Ok(r#"{"agents": ["demand", "supplier"], "parameters": {"sku": "MED001", "days": 14}, "type": "multi", "reasoning": "forecast and source"}"#.into())
            } else {
                Ok("Order 300 units from Acme Pharma.".into())
            }
        });

        let answer = master.ask("How much MED001 should I buy and from whom?").await;
        assert_eq!(answer.plan.agents, vec![AgentKind::Demand, AgentKind::Supplier]);
        assert!(answer.synthesized);
        assert_eq!(answer.answer, "Order 300 units from Acme Pharma.");
        assert!(answer.consultations.iter().all(|c| c.succeeded()));
        assert_eq!(master.history().len(), 1);
        assert_eq!(master.history()[0].agents, answer.plan.agents);
    }

    #[tokio::test]
    async fn test_exhausted_service_joins_summaries() {
        let mut master = agent(|_, _, _| Err(CompletionError::QuotaExceeded("429".into())));

        let answer = master.ask("Any dead stock in inventory?").await;
        assert_eq!(answer.plan.agents, vec![AgentKind::Inventory]);
        assert!(!answer.synthesized);
        assert!(answer.answer.starts_with("Based on consultation with inventory agent(s)"));
        assert!(answer.answer.contains("**INVENTORY:**"));
        match &answer.consultations[0] {
            Consultation::Completed(report) => assert_eq!(report.operation, "dead_stock"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(master.cursor(), RotationCursor(0));
    }

    #[tokio::test]
    async fn test_calculator_failure_does_not_abort() {
        let mut master = agent(|_, _, prompt| {
            if is_routing(prompt) {
                Ok(r#"{"agents": ["demand", "inventory"], "parameters": {"sku": "MED002"}}"#.into())
            } else {
                Ok("partial answer".into())
            }
        });

        let answer = master.ask("forecast MED002").await;
        assert_eq!(answer.consultations.len(), 2);
        match &answer.consultations[0] {
            Consultation::Failed { agent, message } => {
                assert_eq!(*agent, AgentKind::Demand);
                assert!(message.contains("Insufficient history"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(answer.consultations[1].succeeded());
        assert!(answer.synthesized);
    }

    #[tokio::test]
    async fn test_cursor_moves_to_working_key() {
        let mut master = agent(|key, _, _| {
            if key == "k1" {
                Err(CompletionError::QuotaExceeded("429".into()))
            } else {
                Ok("AGENTS: pricing\nTYPE: single".into())
            }
        });
        master.ask("should I discount MED001?").await;
        assert_eq!(master.cursor(), RotationCursor(1));
    }

    #[tokio::test]
    async fn test_history_and_clear() {
        let mut master = agent(|_, _, _| Err(CompletionError::Transport("down".into())));
        master.ask("stock levels").await;
        master.ask("expiring items").await;
        assert_eq!(master.history().len(), 2);
        assert_eq!(master.history()[1].question, "expiring items");
        master.clear_history();
        assert!(master.history().is_empty());
    }

    #[test]
    fn test_inventory_sub_dispatch() {
        let master = agent(|_, _, _| Ok(String::new()));
        let plan = router::keyword_route("inventory");
        let op = |q: &str| master.consult(AgentKind::Inventory, &plan, q).unwrap().operation;
        assert_eq!(op("show dead stock"), "dead_stock");
        assert_eq!(op("what is expiring soon"), "expiry_report");
        assert_eq!(op("reorder list please"), "reorder_recommendations");
        assert_eq!(op("stock overview"), "stock_visibility");
    }

    #[test]
    fn test_capital_validates_quantity() {
        let master = agent(|_, _, _| Ok(String::new()));
        let mut plan = router::keyword_route("budget");
        plan.parameters.insert("quantity".into(), "100".into());
        let report = master.consult(AgentKind::Capital, &plan, "can we afford 100 units?").unwrap();
        assert!(report.summary.contains("Purchase of 100 x MED001"));
        assert!(!report.data["purchase_validation"].is_null());
    }

    #[test]
    fn test_defaults_to_first_sku() {
        let master = agent(|_, _, _| Ok(String::new()));
        let plan = router::keyword_route("discount");
        let report = master.consult(AgentKind::Pricing, &plan, "discount").unwrap();
        assert_eq!(report.data["sku"], "MED001");
    }

    #[test]
    fn test_pricing_sub_dispatch() {
        let master = agent(|_, _, _| Ok(String::new()));
        let plan = router::keyword_route("price");
        let op = |q: &str| master.consult(AgentKind::Pricing, &plan, q).unwrap().operation;
        assert_eq!(op("clearance for near-expiry stock"), "clearance_pricing");
        assert_eq!(op("which bundle offers make sense"), "bundle_offers");
        assert_eq!(op("simulate a markdown"), "simulate_margin");
        assert_eq!(op("should I discount"), "recommend_discount");

        let clearance = master.consult(AgentKind::Pricing, &plan, "clearance").unwrap();
        assert_eq!(clearance.data.as_array().map(Vec::len), Some(1));
    }

    fn agent_over(snapshot: Snapshot) -> MasterAgent {
        let backend = ScriptedBackend::new(|_, _, _| Ok(String::new()));
        let llm = LlmService::new(Arc::new(backend), vec!["k1".into()], vec!["m".into()], 0.7);
        MasterAgent::new(snapshot, llm)
    }

    #[test]
    fn test_clearance_uses_clearance_window() {
        let as_of = date(2024, 6, 1);
        let inventory = vec![
            stock("MED001", "S1", 20.0, 10.0, as_of + chrono::Duration::days(30)),
            stock("MED002", "S1", 20.0, 10.0, as_of + chrono::Duration::days(31)),
            stock("MED003", "S1", 85.0, 10.0, as_of + chrono::Duration::days(60)),
        ];
        let master = agent_over(Snapshot::new(as_of, vec![], inventory));
        let plan = router::keyword_route("price");

        let report = master.consult(AgentKind::Pricing, &plan, "clearance").unwrap();
        let items = report.data.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["sku"], "MED001");
        assert!(report.summary.starts_with("1 item(s) for clearance within 30 days"));

        let far_only = agent_over(Snapshot::new(
            as_of,
            vec![],
            vec![stock("MED003", "S1", 85.0, 10.0, as_of + chrono::Duration::days(60))],
        ));
        let report = far_only.consult(AgentKind::Pricing, &plan, "clearance").unwrap();
        assert_eq!(report.data.as_array().map(Vec::len), Some(0));
        assert!(!report.requires_attention);
    }

    #[test]
    fn test_capital_zero_quantity_skips_validation() {
        let master = agent(|_, _, _| Ok(String::new()));
        let mut plan = router::keyword_route("budget");
        plan.parameters.insert("quantity".into(), "0".into());
        let report = master.consult(AgentKind::Capital, &plan, "budget for 0 units").unwrap();
        assert!(report.data["purchase_validation"].is_null());
        assert!(!report.data["position"].is_null());
        assert!(!report.summary.contains("Purchase of"));
    }

    #[tokio::test]
    async fn test_oversized_quantity_does_not_abort() {
        let mut master = agent(|_, _, prompt| {
            if is_routing(prompt) {
                Ok("AGENTS: supplier\nPARAMETERS: sku=MED001, quantity=100000000000000000000\nTYPE: single".into())
            } else {
                Ok("ok".into())
            }
        });
        let answer = master.ask("split a huge order of MED001").await;
        assert!(answer.consultations[0].succeeded());
        assert_eq!(answer.plan.quantity(), None);
    }
}
