//! Inventory Optimization Agent
//!
//! Stock visibility, statistical safety stock and reorder points, reorder
//! recommendations, dead stock and expiry tracking.

use super::forecast::MIN_HISTORY_DAYS;
use super::transfer::{self, TransferSuggestion};
use crate::config::PolicyConfig;
use crate::data::{mean, sample_std, Snapshot};
use crate::error::{AgentError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Days remaining reported when a sku has no demand
pub const NO_DEMAND_DAYS: f64 = 999.0;

// ============================================================================
// Stock visibility
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockVisibility {
    pub total_units: f64,
    pub total_value: f64,
    pub stores_count: usize,
    pub products_count: usize,
    pub by_location: Vec<LocationStock>,
    /// Top products by stock value
    pub by_product: Vec<ProductStock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationStock {
    pub store_id: String,
    pub total_units: f64,
    pub product_count: usize,
    pub inventory_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductStock {
    pub sku: String,
    pub product_name: String,
    pub total_stock: f64,
    pub unit_price: f64,
    pub stores_count: usize,
    pub total_value: f64,
}

/// Stock totals across locations, optionally narrowed to one sku and/or store
pub fn stock_visibility(snapshot: &Snapshot, sku: Option<&str>, store_id: Option<&str>) -> Result<StockVisibility> {
    let rows: Vec<_> = snapshot
        .inventory
        .iter()
        .filter(|r| sku.map_or(true, |s| r.sku == s))
        .filter(|r| store_id.map_or(true, |s| r.store_id == s))
        .collect();

    if rows.is_empty() {
        let what = match (sku, store_id) {
            (Some(sku), Some(store)) => format!("{} at {}", sku, store),
            (Some(sku), None) => sku.to_string(),
            (None, Some(store)) => format!("any sku at {}", store),
            (None, None) => "any sku".to_string(),
        };
        return Err(AgentError::SkuNotFound(what));
    }

    let mut locations: BTreeMap<&str, LocationStock> = BTreeMap::new();
    let mut products: Vec<ProductStock> = Vec::new();

    for row in &rows {
        let location = locations.entry(row.store_id.as_str()).or_insert_with(|| LocationStock {
            store_id: row.store_id.clone(),
            total_units: 0.0,
            product_count: 0,
            inventory_value: 0.0,
        });
        location.total_units += row.current_stock;
        location.product_count += 1;
        location.inventory_value += row.stock_value();

        match products.iter_mut().find(|p| p.sku == row.sku) {
            Some(product) => {
                product.total_stock += row.current_stock;
                product.stores_count += 1;
                product.total_value += row.stock_value();
            }
            None => products.push(ProductStock {
                sku: row.sku.clone(),
                product_name: row.product_name.clone(),
                total_stock: row.current_stock,
                unit_price: row.unit_price,
                stores_count: 1,
                total_value: row.stock_value(),
            }),
        }
    }

    let products_count = products.len();
    products.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));
    products.truncate(10);

    Ok(StockVisibility {
        total_units: rows.iter().map(|r| r.current_stock).sum(),
        total_value: rows.iter().map(|r| r.stock_value()).sum(),
        stores_count: locations.len(),
        products_count,
        by_location: locations.into_values().collect(),
        by_product: products,
    })
}

// ============================================================================
// Safety stock
// ============================================================================

/// Reorder policy derived from demand statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InventoryPolicy {
    pub safety_stock: f64,
    pub reorder_point: f64,
    pub max_stock: f64,
}

impl InventoryPolicy {
    pub fn from_demand(mean: f64, std: f64, lead_time_days: f64, z: f64) -> Self {
        let std = if std.is_finite() { std } else { 0.0 };
        let safety_stock = z * std * lead_time_days.sqrt();
        let reorder_point = mean * lead_time_days + safety_stock;
        Self {
            safety_stock,
            reorder_point,
            max_stock: reorder_point + mean * lead_time_days,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyStockResult {
    pub sku: String,
    pub product_name: String,
    pub avg_daily: f64,
    pub std_dev: f64,
    pub max_daily: f64,
    pub lead_time_days: f64,
    pub service_z: f64,
    pub policy: InventoryPolicy,
}

pub fn safety_stock(snapshot: &Snapshot, sku: &str, policy: &PolicyConfig) -> Result<SafetyStockResult> {
    if !snapshot.knows_sku(sku) {
        return Err(AgentError::SkuNotFound(sku.to_string()));
    }

    let daily: Vec<f64> = snapshot.daily_demand(sku).into_values().collect();
    if daily.len() < MIN_HISTORY_DAYS {
        return Err(AgentError::InsufficientHistory {
            sku: sku.to_string(),
            required: MIN_HISTORY_DAYS,
            available: daily.len(),
        });
    }

    let avg_daily = mean(daily.iter().copied());
    let std_dev = sample_std(&daily);
    let max_daily = daily.iter().copied().fold(0.0, f64::max);

    Ok(SafetyStockResult {
        sku: sku.to_string(),
        product_name: snapshot.product_name(sku),
        avg_daily,
        std_dev,
        max_daily,
        lead_time_days: policy.lead_time_days,
        service_z: policy.service_z,
        policy: InventoryPolicy::from_demand(avg_daily, std_dev, policy.lead_time_days, policy.service_z),
    })
}

// ============================================================================
// Reorder recommendations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorderPriority {
    Urgent,
    High,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRecommendation {
    pub sku: String,
    pub product_name: String,
    pub current_stock: f64,
    pub reorder_point: f64,
    pub recommended_order_qty: f64,
    pub days_remaining: f64,
    pub priority: ReorderPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderReport {
    /// Every sku at or below its reorder point, before truncation
    pub total_reorder_needed: usize,
    pub recommendations: Vec<ReorderRecommendation>,
}

pub fn reorder_recommendations(snapshot: &Snapshot, policy: &PolicyConfig, top_n: usize) -> ReorderReport {
    let mut recommendations = Vec::new();

    for sku in snapshot.skus() {
        let stats = match safety_stock(snapshot, sku, policy) {
            Ok(stats) => stats,
            Err(e) => {
                debug!("Skipping {} for reorder: {}", sku, e);
                continue;
            }
        };

        let current_stock = snapshot.total_stock(sku);
        if current_stock > stats.policy.reorder_point {
            continue;
        }

        let days_remaining = if stats.avg_daily > 0.0 {
            current_stock / stats.avg_daily
        } else {
            NO_DEMAND_DAYS
        };
        let order_qty = (stats.policy.reorder_point + stats.policy.safety_stock - current_stock)
            .max(stats.avg_daily * 14.0);

        recommendations.push(ReorderRecommendation {
            sku: sku.to_string(),
            product_name: stats.product_name,
            current_stock,
            reorder_point: stats.policy.reorder_point,
            recommended_order_qty: order_qty.round(),
            days_remaining,
            priority: if days_remaining < 3.0 {
                ReorderPriority::Urgent
            } else if days_remaining < 7.0 {
                ReorderPriority::High
            } else {
                ReorderPriority::Normal
            },
        });
    }

    recommendations.sort_by(|a, b| a.days_remaining.total_cmp(&b.days_remaining));
    let total_reorder_needed = recommendations.len();
    recommendations.truncate(top_n);

    info!("{} sku(s) at or below reorder point", total_reorder_needed);
    ReorderReport {
        total_reorder_needed,
        recommendations,
    }
}

// ============================================================================
// Dead stock
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadStockItem {
    pub sku: String,
    pub product_name: String,
    pub total_stock: f64,
    pub total_value: f64,
    pub days_since_last_sale: i64,
    pub last_sale_date: Option<NaiveDate>,
    pub stores_count: usize,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadStockReport {
    pub window_days: i64,
    pub total_value_locked: f64,
    pub items: Vec<DeadStockItem>,
}

/// Skus with no sales inside the window that still tie up at least `min_value`
pub fn dead_stock(snapshot: &Snapshot, window_days: i64, min_value: f64) -> DeadStockReport {
    let cutoff = snapshot.as_of - Duration::days(window_days);
    let mut items = Vec::new();

    for sku in snapshot.skus() {
        if snapshot.sales_for(sku).any(|s| s.date >= cutoff) {
            continue;
        }

        let rows: Vec<_> = snapshot.inventory_for(sku).collect();
        let total_value: f64 = rows.iter().map(|r| r.stock_value()).sum();
        if total_value < min_value {
            continue;
        }

        let last_sale_date = snapshot.last_sale_date(sku);
        let days_since_last_sale = last_sale_date
            .map(|d| (snapshot.as_of - d).num_days())
            .unwrap_or(NO_DEMAND_DAYS as i64);

        items.push(DeadStockItem {
            sku: sku.to_string(),
            product_name: snapshot.product_name(sku),
            total_stock: rows.iter().map(|r| r.current_stock).sum(),
            total_value,
            days_since_last_sale,
            last_sale_date,
            stores_count: rows.len(),
            recommended_action: dead_stock_action(days_since_last_sale, total_value).to_string(),
        });
    }

    items.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));

    DeadStockReport {
        window_days,
        total_value_locked: items.iter().map(|i| i.total_value).sum(),
        items,
    }
}

pub fn dead_stock_action(days_since_last_sale: i64, value: f64) -> &'static str {
    if days_since_last_sale > 180 {
        if value > 1000.0 {
            "Return to supplier or heavy discount (40-50%)"
        } else {
            "Liquidate or donate"
        }
    } else if days_since_last_sale > 120 {
        "Aggressive discount (30-40%) or bundle"
    } else {
        "Monitor and consider promotion (20-30% discount)"
    }
}

// ============================================================================
// Expiry tracking
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryTier {
    Critical,
    Warning,
    Watch,
}

impl ExpiryTier {
    pub fn for_days(days_to_expiry: i64) -> Self {
        if days_to_expiry <= 30 {
            ExpiryTier::Critical
        } else if days_to_expiry <= 60 {
            ExpiryTier::Warning
        } else {
            ExpiryTier::Watch
        }
    }

    pub fn action(self) -> &'static str {
        match self {
            ExpiryTier::Critical => "Clear now: markdown, transfer to a faster store or return to supplier",
            ExpiryTier::Warning => "Schedule a promotion or rebalance to higher-velocity stores",
            ExpiryTier::Watch => "Monitor sell-through and hold replenishment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiringItem {
    pub sku: String,
    pub product_name: String,
    pub store_id: String,
    pub stock: f64,
    pub expiry_date: NaiveDate,
    pub days_to_expiry: i64,
    pub value_at_risk: f64,
    pub tier: ExpiryTier,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationAlert {
    pub sku: String,
    pub product_name: String,
    pub store_id: String,
    pub stock: f64,
    pub days_to_expiry: i64,
    pub value_at_risk: f64,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryReport {
    pub threshold_days: i64,
    pub critical_count: usize,
    pub warning_count: usize,
    pub watch_count: usize,
    pub critical_value: f64,
    pub warning_value: f64,
    pub watch_value: f64,
    pub total_value_at_risk: f64,
    pub items: Vec<ExpiringItem>,
    pub liquidation_alerts: Vec<LiquidationAlert>,
}

/// Inventory rows expiring within `threshold_days`, soonest first
pub fn expiry_report(snapshot: &Snapshot, threshold_days: i64) -> ExpiryReport {
    let mut items: Vec<ExpiringItem> = snapshot
        .inventory
        .iter()
        .filter_map(|row| {
            let days = snapshot.days_until(row.expiry_date);
            if days > threshold_days {
                return None;
            }
            let tier = ExpiryTier::for_days(days);
            Some(ExpiringItem {
                sku: row.sku.clone(),
                product_name: row.product_name.clone(),
                store_id: row.store_id.clone(),
                stock: row.current_stock,
                expiry_date: row.expiry_date,
                days_to_expiry: days,
                value_at_risk: row.stock_value(),
                tier,
                action: tier.action().to_string(),
            })
        })
        .collect();
    items.sort_by_key(|i| i.days_to_expiry);

    let tier_totals = |tier: ExpiryTier| {
        items
            .iter()
            .filter(|i| i.tier == tier)
            .fold((0usize, 0.0), |(n, v), i| (n + 1, v + i.value_at_risk))
    };
    let (critical_count, critical_value) = tier_totals(ExpiryTier::Critical);
    let (warning_count, warning_value) = tier_totals(ExpiryTier::Warning);
    let (watch_count, watch_value) = tier_totals(ExpiryTier::Watch);

    let liquidation_alerts = items
        .iter()
        .filter(|i| i.tier == ExpiryTier::Critical)
        .map(|i| LiquidationAlert {
            sku: i.sku.clone(),
            product_name: i.product_name.clone(),
            store_id: i.store_id.clone(),
            stock: i.stock,
            days_to_expiry: i.days_to_expiry,
            value_at_risk: i.value_at_risk,
            recommended_action: if i.days_to_expiry <= 7 {
                "IMMEDIATE CLEARANCE".to_string()
            } else {
                "DISCOUNT 20-30%".to_string()
            },
        })
        .collect();

    ExpiryReport {
        threshold_days,
        critical_count,
        warning_count,
        watch_count,
        critical_value,
        warning_value,
        watch_value,
        total_value_at_risk: critical_value + warning_value + watch_value,
        items,
        liquidation_alerts,
    }
}

/// Store-balancing transfers at the configured overstock threshold
pub fn transfer_suggestions(snapshot: &Snapshot, policy: &PolicyConfig) -> Vec<TransferSuggestion> {
    transfer::balance_suggestions(snapshot, policy.overstock_days)
}
