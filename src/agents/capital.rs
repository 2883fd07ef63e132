//! Working Capital Agent
//!
//! Inventory capital position (value, COGS, days inventory outstanding),
//! purchase order validation against budget, DIO and ROI targets, and
//! working capital optimization opportunities.

use crate::config::CapitalConfig;
use crate::data::{mean, Snapshot};
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Trailing window used for cost of goods sold
pub const COGS_WINDOW_DAYS: i64 = 30;

/// Days a purchase is assumed to sit in stock before it sells
pub const HOLDING_DAYS: f64 = 60.0;

/// Minimum expected return on a purchase, in percent
pub const MIN_ROI_PCT: f64 = 10.0;

/// Allowed overshoot of the DIO target for a new purchase
const DIO_TOLERANCE: f64 = 1.1;

// ============================================================================
// Capital position
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalPosition {
    pub total_inventory_value: f64,
    pub monthly_cogs: f64,
    pub daily_cogs: f64,
    /// Days inventory outstanding; 0 when nothing sold in the window
    pub dio: f64,
    pub target_dio: f64,
    pub on_target: bool,
    pub allocated_to_inventory: f64,
    pub capital_utilization_pct: f64,
    pub available_budget: f64,
}

/// Current inventory capital metrics
pub fn capital_position(snapshot: &Snapshot, params: &CapitalConfig, cost_ratio: f64) -> CapitalPosition {
    let total_inventory_value: f64 = snapshot.inventory.iter().map(|r| r.stock_value()).sum();

    let cutoff = snapshot.as_of - chrono::Duration::days(COGS_WINDOW_DAYS);
    let units_sold: f64 = snapshot
        .sales
        .iter()
        .filter(|s| s.date >= cutoff)
        .map(|s| s.quantity_sold)
        .sum();
    let avg_price = mean(snapshot.inventory.iter().map(|r| r.unit_price));

    let monthly_cogs = units_sold * avg_price * cost_ratio;
    let daily_cogs = monthly_cogs / COGS_WINDOW_DAYS as f64;
    let dio = if daily_cogs > 0.0 { total_inventory_value / daily_cogs } else { 0.0 };

    let capital_utilization_pct = if params.allocated_to_inventory > 0.0 {
        total_inventory_value / params.allocated_to_inventory * 100.0
    } else {
        0.0
    };

    CapitalPosition {
        total_inventory_value,
        monthly_cogs,
        daily_cogs,
        dio,
        target_dio: params.target_dio,
        on_target: dio <= params.target_dio,
        allocated_to_inventory: params.allocated_to_inventory,
        capital_utilization_pct,
        available_budget: params.available_budget,
    }
}

// ============================================================================
// Purchase validation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseDecision {
    Approved,
    ApprovedWithConditions,
    Rejected,
    ReviewRequired,
}

impl PurchaseDecision {
    fn from_checks(budget_ok: bool, dio_ok: bool, roi_ok: bool) -> Self {
        match (budget_ok, dio_ok, roi_ok) {
            (true, true, true) => PurchaseDecision::Approved,
            (true, true, false) => PurchaseDecision::ApprovedWithConditions,
            (false, _, _) => PurchaseDecision::Rejected,
            _ => PurchaseDecision::ReviewRequired,
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            PurchaseDecision::Approved => "Proceed with order",
            PurchaseDecision::ApprovedWithConditions => "Approve but monitor ROI closely",
            PurchaseDecision::Rejected => "Insufficient budget - defer or reduce quantity",
            PurchaseDecision::ReviewRequired => "Review with finance team",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub check: String,
    pub passed: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseValidation {
    pub sku: String,
    pub quantity: u64,
    pub unit_price: f64,
    pub order_value: f64,
    pub checks: Vec<ValidationCheck>,
    pub decision: PurchaseDecision,
    pub recommendation: String,
    /// `None` when there is no recent cost of goods to measure against
    pub projected_dio: Option<f64>,
    pub expected_roi_pct: f64,
    /// Largest quantity the budget covers, set only when over budget
    pub max_affordable_quantity: Option<u64>,
}

/// Check a purchase order against budget, DIO target and minimum ROI
pub fn validate_purchase(
    snapshot: &Snapshot,
    params: &CapitalConfig,
    cost_ratio: f64,
    sku: &str,
    quantity: u64,
    unit_price: f64,
) -> Result<PurchaseValidation> {
    if quantity == 0 || !(unit_price > 0.0) {
        return Err(AgentError::InvalidInput(format!(
            "purchase needs a positive quantity and unit price (got {} @ {})",
            quantity, unit_price
        )));
    }
    if !(cost_ratio > 0.0) {
        return Err(AgentError::InvalidInput(format!("cost ratio must be positive, got {}", cost_ratio)));
    }

    let position = capital_position(snapshot, params, cost_ratio);
    let order_value = quantity as f64 * unit_price;
    let mut checks = Vec::with_capacity(3);

    let budget_ok = order_value <= position.available_budget;
    checks.push(ValidationCheck {
        check: "Budget Availability".to_string(),
        passed: budget_ok,
        details: if budget_ok {
            format!("Order ${:.2} within budget ${:.2}", order_value, position.available_budget)
        } else {
            format!(
                "Order ${:.2} exceeds budget ${:.2} (shortfall ${:.2})",
                order_value,
                position.available_budget,
                order_value - position.available_budget
            )
        },
    });

    let projected_dio = if position.daily_cogs > 0.0 {
        Some((position.total_inventory_value + order_value) / position.daily_cogs)
    } else {
        None
    };
    let dio_ok = projected_dio.map_or(false, |dio| dio <= params.target_dio * DIO_TOLERANCE);
    checks.push(ValidationCheck {
        check: "DIO Impact".to_string(),
        passed: dio_ok,
        details: match projected_dio {
            Some(dio) if dio_ok => format!("Projected DIO {:.1} within target", dio),
            Some(dio) => format!("Projected DIO {:.1} above target {}", dio, params.target_dio),
            None => "No recent cost of goods sold; DIO cannot be projected".to_string(),
        },
    });

    let expected_revenue = order_value / cost_ratio;
    let capital_cost = order_value * (params.cost_of_capital_annual / 365.0) * HOLDING_DAYS;
    let net_profit = expected_revenue - order_value - capital_cost;
    let expected_roi_pct = net_profit / order_value * 100.0;
    let roi_ok = expected_roi_pct > MIN_ROI_PCT;
    checks.push(ValidationCheck {
        check: "ROI Validation".to_string(),
        passed: roi_ok,
        details: if roi_ok {
            format!("Expected ROI {:.1}% exceeds minimum {}%", expected_roi_pct, MIN_ROI_PCT)
        } else {
            format!("Expected ROI {:.1}% below target {}%", expected_roi_pct, MIN_ROI_PCT)
        },
    });

    let decision = PurchaseDecision::from_checks(budget_ok, dio_ok, roi_ok);
    let max_affordable_quantity = if budget_ok {
        None
    } else {
        Some((position.available_budget.max(0.0) / unit_price).floor() as u64)
    };

    info!("Purchase {} x{} (${:.2}): {:?}", sku, quantity, order_value, decision);

    Ok(PurchaseValidation {
        sku: sku.to_string(),
        quantity,
        unit_price,
        order_value,
        checks,
        decision,
        recommendation: decision.recommendation().to_string(),
        projected_dio,
        expected_roi_pct,
        max_affordable_quantity,
    })
}

// ============================================================================
// Optimization
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationPriority {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalRecommendation {
    pub area: String,
    pub priority: RecommendationPriority,
    pub action: String,
    pub method: String,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalPlan {
    pub current_dio: f64,
    pub target_dio: f64,
    pub turnover_rate: f64,
    pub target_turnover: f64,
    pub recommendations: Vec<CapitalRecommendation>,
}

/// Working capital optimization opportunities
pub fn capital_recommendations(snapshot: &Snapshot, params: &CapitalConfig, cost_ratio: f64) -> CapitalPlan {
    let position = capital_position(snapshot, params, cost_ratio);
    let mut recommendations = Vec::new();

    if position.dio > params.target_dio {
        let excess_value = (position.dio - params.target_dio) * position.daily_cogs;
        recommendations.push(CapitalRecommendation {
            area: "Inventory Reduction".to_string(),
            priority: RecommendationPriority::High,
            action: format!("Reduce inventory by ${:.2}", excess_value),
            method: "Discount slow-moving items, improve demand forecasting".to_string(),
            impact: format!("Free up ${:.2} working capital", excess_value),
        });
    }

    recommendations.push(CapitalRecommendation {
        area: "Payment Terms".to_string(),
        priority: RecommendationPriority::Medium,
        action: "Negotiate extended payment terms with suppliers".to_string(),
        method: format!("Target 45-60 day terms instead of {} days", params.payment_terms_days),
        impact: "Improve cash flow by 15-20%".to_string(),
    });

    let turnover_rate = if position.dio > 0.0 { 365.0 / position.dio } else { 0.0 };
    let target_turnover = if params.target_dio > 0.0 { 365.0 / params.target_dio } else { 0.0 };
    if turnover_rate < target_turnover {
        recommendations.push(CapitalRecommendation {
            area: "Stock Turnover".to_string(),
            priority: RecommendationPriority::High,
            action: format!("Increase turnover from {:.1}x to {:.1}x", turnover_rate, target_turnover),
            method: "Focus on fast-moving items, reduce safety stock".to_string(),
            impact: "Reduce capital tied up in inventory".to_string(),
        });
    }

    CapitalPlan {
        current_dio: position.dio,
        target_dio: params.target_dio,
        turnover_rate,
        target_turnover,
        recommendations,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowForecast {
    pub days_ahead: u32,
    pub projected_inflow: f64,
    pub projected_outflow: f64,
    pub net_cash_flow: f64,
    pub daily_margin: f64,
}

/// Straight-line cash flow projection from average daily unit sales
pub fn cash_flow_forecast(snapshot: &Snapshot, cost_ratio: f64, days_ahead: u32) -> CashFlowForecast {
    let mut per_day = std::collections::BTreeMap::new();
    for sale in &snapshot.sales {
        *per_day.entry(sale.date).or_insert(0.0) += sale.quantity_sold;
    }
    let daily_units = mean(per_day.values().copied());
    let avg_price = mean(snapshot.inventory.iter().map(|r| r.unit_price));

    let daily_revenue = daily_units * avg_price;
    let daily_cogs = daily_revenue * cost_ratio;
    let projected_inflow = daily_revenue * days_ahead as f64;
    let projected_outflow = daily_cogs * days_ahead as f64;

    CashFlowForecast {
        days_ahead,
        projected_inflow,
        projected_outflow,
        net_cash_flow: projected_inflow - projected_outflow,
        daily_margin: daily_revenue - daily_cogs,
    }
}
