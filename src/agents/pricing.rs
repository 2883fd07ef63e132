//! Discount & Pricing Agent
//!
//! Margin-protected discount recommendations, clearance pricing for
//! near-expiry stock, margin simulation across discount levels and bundle
//! offers mined from same-day baskets.

use crate::config::PolicyConfig;
use crate::data::{Snapshot, DEFAULT_ELASTICITY};
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Discount levels simulated when the caller supplies none
pub const DEFAULT_SCENARIOS: [f64; 6] = [0.0, 5.0, 10.0, 15.0, 20.0, 25.0];

const VELOCITY_WINDOW_DAYS: i64 = 30;
const BUNDLE_DISCOUNT_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElasticityCategory {
    HighlyElastic,
    ModeratelyElastic,
    Inelastic,
}

impl ElasticityCategory {
    pub fn from_elasticity(elasticity: f64) -> Self {
        if elasticity < -2.0 {
            ElasticityCategory::HighlyElastic
        } else if elasticity < -1.5 {
            ElasticityCategory::ModeratelyElastic
        } else {
            ElasticityCategory::Inelastic
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricePosition {
    Premium,
    Competitive,
    Discount,
}

impl PricePosition {
    pub fn classify(our_price: f64, competitor_price: f64) -> Self {
        if our_price > competitor_price * 1.05 {
            PricePosition::Premium
        } else if our_price >= competitor_price * 0.95 {
            PricePosition::Competitive
        } else {
            PricePosition::Discount
        }
    }
}

// ============================================================================
// Discount decision
// ============================================================================

/// Everything the discount rule looks at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountInputs {
    pub current_price: f64,
    pub competitor_price: f64,
    pub elasticity: f64,
    pub days_to_expiry: i64,
    pub days_of_supply: f64,
    /// Gross margin at the current price, in percent
    pub margin_pct: f64,
    pub min_margin_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountDecision {
    pub discount_pct: f64,
    pub reason_factors: Vec<String>,
}

/// Margin-protected discount rule
pub struct DiscountPolicy;

impl DiscountPolicy {
    /// Largest discount among the triggered factors, capped so the margin never
    /// drops below the minimum and never negative.
    pub fn decide(inputs: &DiscountInputs) -> DiscountDecision {
        let headroom = inputs.margin_pct - inputs.min_margin_pct;
        let mut discount: f64 = 0.0;
        let mut factors = Vec::new();

        if inputs.days_to_expiry <= 30 {
            discount = discount.max(headroom.min(30.0));
            factors.push(format!("Expiry in {} days", inputs.days_to_expiry));
        }

        if inputs.competitor_price > 0.0 {
            let gap_pct = (inputs.current_price - inputs.competitor_price) / inputs.competitor_price * 100.0;
            if gap_pct > 10.0 {
                discount = discount.max((gap_pct / 2.0).min(headroom));
                factors.push(format!("Price {:.0}% above market", gap_pct));
            }
        }

        if inputs.days_of_supply > 90.0 {
            discount = discount.max(headroom.min(15.0));
            factors.push(format!("Overstocked ({:.0} days supply)", inputs.days_of_supply));
        }

        if factors.is_empty() && ElasticityCategory::from_elasticity(inputs.elasticity) == ElasticityCategory::HighlyElastic {
            discount = 5.0;
            factors.push("High price sensitivity - small discount drives sales".to_string());
        }

        DiscountDecision {
            discount_pct: discount.min(headroom).max(0.0),
            reason_factors: factors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountRecommendation {
    pub sku: String,
    pub product_name: String,
    pub current_price: f64,
    pub recommended_discount_pct: f64,
    pub discounted_price: f64,
    pub reason_factors: Vec<String>,
    pub reason: String,
    pub inputs: DiscountInputs,
    pub elasticity_category: ElasticityCategory,
    pub price_position: PricePosition,
    pub projected_margin_pct: f64,
    pub margin_change: f64,
    pub projected_uplift_pct: f64,
}

fn margin_pct(price: f64, unit_cost: f64) -> f64 {
    if price > 0.0 {
        (price - unit_cost) / price * 100.0
    } else {
        0.0
    }
}

pub fn recommend_discount(snapshot: &Snapshot, sku: &str, policy: &PolicyConfig) -> Result<DiscountRecommendation> {
    let rows: Vec<_> = snapshot.inventory_for(sku).collect();
    let first = rows.first().ok_or_else(|| AgentError::SkuNotFound(sku.to_string()))?;

    let current_price = first.unit_price;
    let unit_cost = current_price * policy.cost_ratio;
    let current_stock: f64 = rows.iter().map(|r| r.current_stock).sum();
    let days_to_expiry = rows
        .iter()
        .map(|r| snapshot.days_until(r.expiry_date))
        .min()
        .unwrap_or(i64::MAX);

    let signal = snapshot.pricing_signal(sku);
    let elasticity = signal.map_or(DEFAULT_ELASTICITY, |s| s.price_elasticity);
    let competitor_price = signal.map_or(current_price, |s| s.competitor_avg_price);

    let velocity = snapshot.recent_velocity(sku, VELOCITY_WINDOW_DAYS);
    let days_of_supply = if velocity > 0.0 { current_stock / velocity } else { 999.0 };

    let inputs = DiscountInputs {
        current_price,
        competitor_price,
        elasticity,
        days_to_expiry,
        days_of_supply,
        margin_pct: margin_pct(current_price, unit_cost),
        min_margin_pct: policy.min_margin_pct,
    };
    let decision = DiscountPolicy::decide(&inputs);

    let discounted_price = current_price * (1.0 - decision.discount_pct / 100.0);
    let projected_margin_pct = margin_pct(discounted_price, unit_cost);

    Ok(DiscountRecommendation {
        sku: sku.to_string(),
        product_name: snapshot.product_name(sku),
        current_price,
        recommended_discount_pct: decision.discount_pct,
        discounted_price,
        reason: if decision.reason_factors.is_empty() {
            "Optimal pricing maintained".to_string()
        } else {
            decision.reason_factors.join(" | ")
        },
        reason_factors: decision.reason_factors,
        elasticity_category: ElasticityCategory::from_elasticity(elasticity),
        price_position: PricePosition::classify(current_price, competitor_price),
        projected_margin_pct,
        margin_change: projected_margin_pct - inputs.margin_pct,
        projected_uplift_pct: elasticity.abs() * decision.discount_pct,
        inputs,
    })
}

// ============================================================================
// Clearance
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearanceUrgency {
    Critical,
    High,
    Medium,
}

/// Clearance discount for stock `days_to_expiry` days from expiry at the given margin
pub fn clearance_discount(days_to_expiry: i64, margin_pct: f64) -> (f64, ClearanceUrgency) {
    let (discount, urgency) = if days_to_expiry <= 7 {
        (40.0_f64.min(margin_pct - 10.0), ClearanceUrgency::Critical)
    } else if days_to_expiry <= 14 {
        (30.0_f64.min(margin_pct - 12.0), ClearanceUrgency::High)
    } else {
        (20.0_f64.min(margin_pct - 15.0), ClearanceUrgency::Medium)
    };
    (discount.max(0.0), urgency)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearanceItem {
    pub sku: String,
    pub product_name: String,
    pub store_id: String,
    pub days_to_expiry: i64,
    pub stock: f64,
    pub original_price: f64,
    pub discount_pct: f64,
    pub clearance_price: f64,
    pub potential_revenue: f64,
    pub urgency: ClearanceUrgency,
}

/// Clearance plan for every inventory row within `threshold_days` of expiry
pub fn clearance_pricing(snapshot: &Snapshot, threshold_days: i64, policy: &PolicyConfig) -> Vec<ClearanceItem> {
    let mut items: Vec<ClearanceItem> = snapshot
        .inventory
        .iter()
        .filter_map(|row| {
            let days = snapshot.days_until(row.expiry_date);
            if days > threshold_days {
                return None;
            }
            let margin = margin_pct(row.unit_price, row.unit_price * policy.cost_ratio);
            let (discount_pct, urgency) = clearance_discount(days, margin);
            let clearance_price = row.unit_price * (1.0 - discount_pct / 100.0);
            Some(ClearanceItem {
                sku: row.sku.clone(),
                product_name: row.product_name.clone(),
                store_id: row.store_id.clone(),
                days_to_expiry: days,
                stock: row.current_stock,
                original_price: row.unit_price,
                discount_pct,
                clearance_price,
                potential_revenue: clearance_price * row.current_stock,
                urgency,
            })
        })
        .collect();

    items.sort_by_key(|i| i.days_to_expiry);
    items
}

// ============================================================================
// Margin simulation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginScenario {
    pub discount_pct: f64,
    pub new_price: f64,
    pub margin_pct: f64,
    pub predicted_units: f64,
    pub volume_increase_pct: f64,
    pub total_revenue: f64,
    pub total_margin: f64,
    pub revenue_vs_baseline_pct: f64,
    pub margin_vs_baseline_pct: f64,
    pub recommended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginSimulation {
    pub sku: String,
    pub product_name: String,
    pub current_price: f64,
    pub elasticity: f64,
    pub monthly_units: f64,
    pub baseline: MarginScenario,
    pub scenarios: Vec<MarginScenario>,
    pub optimal_discount: f64,
    pub optimal_margin: f64,
}

pub fn simulate_margin(
    snapshot: &Snapshot,
    sku: &str,
    scenarios: &[f64],
    policy: &PolicyConfig,
) -> Result<MarginSimulation> {
    let first = snapshot
        .inventory_for(sku)
        .next()
        .ok_or_else(|| AgentError::SkuNotFound(sku.to_string()))?;
    if scenarios.is_empty() {
        return Err(AgentError::InvalidInput("at least one discount scenario is required".to_string()));
    }

    let current_price = first.unit_price;
    let unit_cost = current_price * policy.cost_ratio;
    let elasticity = snapshot
        .pricing_signal(sku)
        .map_or(DEFAULT_ELASTICITY, |s| s.price_elasticity);
    let monthly_units = snapshot.recent_units(sku, VELOCITY_WINDOW_DAYS);

    let run = |discount_pct: f64| {
        let new_price = current_price * (1.0 - discount_pct / 100.0);
        let volume_increase_pct = elasticity.abs() * discount_pct;
        let predicted_units = monthly_units * (1.0 + volume_increase_pct / 100.0);
        let margin_per_unit = new_price - unit_cost;
        MarginScenario {
            discount_pct,
            new_price,
            margin_pct: margin_pct(new_price, unit_cost),
            predicted_units,
            volume_increase_pct,
            total_revenue: new_price * predicted_units,
            total_margin: margin_per_unit * predicted_units,
            revenue_vs_baseline_pct: 0.0,
            margin_vs_baseline_pct: 0.0,
            recommended: false,
        }
    };

    let baseline = run(0.0);
    let vs_baseline = |value: f64, base: f64| if base != 0.0 { (value - base) / base.abs() * 100.0 } else { 0.0 };

    let mut results: Vec<MarginScenario> = scenarios
        .iter()
        .map(|&d| {
            let mut s = run(d);
            s.revenue_vs_baseline_pct = vs_baseline(s.total_revenue, baseline.total_revenue);
            s.margin_vs_baseline_pct = vs_baseline(s.total_margin, baseline.total_margin);
            s
        })
        .collect();

    let mut best = 0;
    for (i, s) in results.iter().enumerate() {
        if s.total_margin > results[best].total_margin {
            best = i;
        }
    }
    results[best].recommended = true;

    Ok(MarginSimulation {
        sku: sku.to_string(),
        product_name: snapshot.product_name(sku),
        current_price,
        elasticity,
        monthly_units,
        optimal_discount: results[best].discount_pct,
        optimal_margin: results[best].total_margin,
        baseline,
        scenarios: results,
    })
}

// ============================================================================
// Bundles
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleOffer {
    pub sku_1: String,
    pub product_1: String,
    pub price_1: f64,
    pub sku_2: String,
    pub product_2: String,
    pub price_2: f64,
    pub bundle_price: f64,
    pub savings: f64,
    pub bought_together_count: usize,
}

/// Top sku pairs sold on the same day, priced with a flat bundle discount
pub fn bundle_offers(snapshot: &Snapshot, top_n: usize) -> Vec<BundleOffer> {
    let mut baskets: BTreeMap<chrono::NaiveDate, BTreeSet<&str>> = BTreeMap::new();
    for sale in &snapshot.sales {
        baskets.entry(sale.date).or_default().insert(sale.sku.as_str());
    }

    let mut pair_counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for basket in baskets.values() {
        let skus: Vec<&str> = basket.iter().copied().collect();
        for (i, a) in skus.iter().enumerate() {
            for b in &skus[i + 1..] {
                *pair_counts.entry((*a, *b)).or_insert(0) += 1;
            }
        }
    }

    let mut pairs: Vec<((&str, &str), usize)> = pair_counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1));

    pairs
        .into_iter()
        .filter_map(|((a, b), count)| {
            let first = snapshot.inventory_for(a).next()?;
            let second = snapshot.inventory_for(b).next()?;
            let total = first.unit_price + second.unit_price;
            let bundle_price = total * (1.0 - BUNDLE_DISCOUNT_PCT / 100.0);
            Some(BundleOffer {
                sku_1: a.to_string(),
                product_1: first.product_name.clone(),
                price_1: first.unit_price,
                sku_2: b.to_string(),
                product_2: second.product_name.clone(),
                price_2: second.unit_price,
                bundle_price,
                savings: total - bundle_price,
                bought_together_count: count,
            })
        })
        .take(top_n)
        .collect()
}
