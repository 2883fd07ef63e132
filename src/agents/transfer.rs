//! Store Transfer Agent
//!
//! Moves stock between stores instead of placing new orders: balances
//! days-of-supply, matches expiring overstock with stores about to run out,
//! and rescues near-expiry items by sending them where they sell.

use crate::data::{InventoryRecord, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Trailing window used for per-store velocity
pub const VELOCITY_WINDOW_DAYS: i64 = 30;

/// Days of supply reported for a store with no sales
pub const NO_VELOCITY_DAYS: f64 = 999.0;

const TARGET_DAYS_OF_SUPPLY: f64 = 14.0;
const MIN_BALANCE_QTY: f64 = 10.0;
const MIN_RESCUE_QTY: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransferUrgency {
    Critical,
    High,
    Medium,
}

/// Store-to-store move that evens out days of supply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSuggestion {
    pub sku: String,
    pub product_name: String,
    pub from_store: String,
    pub to_store: String,
    pub quantity: f64,
    pub urgency: TransferUrgency,
    pub rationale: String,
    pub from_days_supply: f64,
    pub to_days_supply: f64,
}

fn days_of_supply(stock: f64, velocity: f64) -> f64 {
    if velocity > 0.0 {
        stock / velocity
    } else {
        NO_VELOCITY_DAYS
    }
}

/// Inventory rows grouped by sku, first-seen order
fn rows_by_sku(snapshot: &Snapshot) -> Vec<(&str, Vec<&InventoryRecord>)> {
    snapshot
        .skus()
        .into_iter()
        .map(|sku| (sku, snapshot.inventory_for(sku).collect()))
        .collect()
}

// ============================================================================
// Balancing
// ============================================================================

/// Pair stores holding more than `overstock_days` of supply with stores under
/// two weeks. Highest urgency first, then the emptiest target.
pub fn balance_suggestions(snapshot: &Snapshot, overstock_days: f64) -> Vec<TransferSuggestion> {
    let mut suggestions = Vec::new();

    for (sku, rows) in rows_by_sku(snapshot) {
        if rows.len() < 2 {
            continue;
        }
        let product_name = snapshot.product_name(sku);

        let stores: Vec<(&InventoryRecord, f64, f64)> = rows
            .iter()
            .map(|row| {
                let velocity = snapshot.store_velocity(sku, &row.store_id, VELOCITY_WINDOW_DAYS);
                (*row, velocity, days_of_supply(row.current_stock, velocity))
            })
            .collect();

        for (source, source_velocity, source_dos) in &stores {
            if *source_dos <= overstock_days || *source_velocity <= 0.0 {
                continue;
            }

            for (target, target_velocity, target_dos) in &stores {
                if target.store_id == source.store_id || *target_dos >= TARGET_DAYS_OF_SUPPLY {
                    continue;
                }

                let quantity = (source.current_stock * 0.5).min(target_velocity * TARGET_DAYS_OF_SUPPLY);
                if quantity < MIN_BALANCE_QTY {
                    continue;
                }

                suggestions.push(TransferSuggestion {
                    sku: sku.to_string(),
                    product_name: product_name.clone(),
                    from_store: source.store_id.clone(),
                    to_store: target.store_id.clone(),
                    quantity: quantity.floor(),
                    urgency: if *target_dos < 7.0 {
                        TransferUrgency::High
                    } else {
                        TransferUrgency::Medium
                    },
                    rationale: format!(
                        "Balance inventory: {} holds {:.0} days of supply, {} only {:.1}",
                        source.store_id, source_dos, target.store_id, target_dos
                    ),
                    from_days_supply: *source_dos,
                    to_days_supply: *target_dos,
                });
            }
        }
    }

    suggestions.sort_by(|a, b| {
        a.urgency
            .cmp(&b.urgency)
            .then(a.to_days_supply.total_cmp(&b.to_days_supply))
    });
    debug!("{} balancing transfer(s) proposed", suggestions.len());
    suggestions
}

// ============================================================================
// Imbalances
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImbalanceIssue {
    /// Will expire before it sells
    Overstocked,
    /// Will stock out within a week
    Understocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreImbalance {
    pub sku: String,
    pub product_name: String,
    pub store_id: String,
    pub current_stock: f64,
    pub unit_price: f64,
    pub daily_velocity: f64,
    pub days_of_supply: f64,
    pub days_to_expiry: i64,
    pub issue: ImbalanceIssue,
    pub urgency: TransferUrgency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImbalanceReport {
    pub overstocked: Vec<StoreImbalance>,
    pub understocked: Vec<StoreImbalance>,
}

impl ImbalanceReport {
    pub fn total(&self) -> usize {
        self.overstocked.len() + self.understocked.len()
    }
}

/// Store rows that will expire before selling through, or stock out within a week
pub fn imbalances(snapshot: &Snapshot) -> ImbalanceReport {
    let mut overstocked = Vec::new();
    let mut understocked = Vec::new();

    for (sku, rows) in rows_by_sku(snapshot) {
        if rows.len() < 2 {
            continue;
        }
        let product_name = snapshot.product_name(sku);

        for row in rows {
            let velocity = snapshot.store_velocity(sku, &row.store_id, VELOCITY_WINDOW_DAYS);
            let dos = days_of_supply(row.current_stock, velocity);
            let days_to_expiry = snapshot.days_until(row.expiry_date);

            let (issue, urgency) = if dos > days_to_expiry as f64 && days_to_expiry < 90 {
                let urgency = if days_to_expiry < 30 {
                    TransferUrgency::High
                } else {
                    TransferUrgency::Medium
                };
                (ImbalanceIssue::Overstocked, urgency)
            } else if dos < 7.0 && velocity > 0.0 {
                let urgency = if dos < 3.0 {
                    TransferUrgency::High
                } else {
                    TransferUrgency::Medium
                };
                (ImbalanceIssue::Understocked, urgency)
            } else {
                continue;
            };

            let entry = StoreImbalance {
                sku: sku.to_string(),
                product_name: product_name.clone(),
                store_id: row.store_id.clone(),
                current_stock: row.current_stock,
                unit_price: row.unit_price,
                daily_velocity: velocity,
                days_of_supply: dos,
                days_to_expiry,
                issue,
                urgency,
            };
            match issue {
                ImbalanceIssue::Overstocked => overstocked.push(entry),
                ImbalanceIssue::Understocked => understocked.push(entry),
            }
        }
    }

    for list in [&mut overstocked, &mut understocked] {
        list.sort_by(|a, b| a.urgency.cmp(&b.urgency).then(a.days_to_expiry.cmp(&b.days_to_expiry)));
    }

    ImbalanceReport {
        overstocked,
        understocked,
    }
}

// ============================================================================
// Expiry-driven transfers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryTransfer {
    pub sku: String,
    pub product_name: String,
    pub from_store: String,
    pub to_store: String,
    pub quantity: f64,
    pub days_to_expiry: i64,
    pub urgency: TransferUrgency,
    pub estimated_savings: f64,
    pub timeline: String,
    pub reason: String,
}

/// Send expiring overstock to understocked stores of the same sku
pub fn expiry_driven_transfers(snapshot: &Snapshot) -> Vec<ExpiryTransfer> {
    let report = imbalances(snapshot);
    let mut transfers = Vec::new();

    for source in &report.overstocked {
        let mut available = source.current_stock;

        for target in report
            .understocked
            .iter()
            .filter(|u| u.sku == source.sku && u.store_id != source.store_id)
        {
            let quantity = (available * 0.7)
                .min(target.daily_velocity * TARGET_DAYS_OF_SUPPLY)
                .min(target.daily_velocity * source.days_to_expiry.max(0) as f64);
            if quantity < MIN_BALANCE_QTY {
                continue;
            }

            transfers.push(ExpiryTransfer {
                sku: source.sku.clone(),
                product_name: source.product_name.clone(),
                from_store: source.store_id.clone(),
                to_store: target.store_id.clone(),
                quantity: quantity.floor(),
                days_to_expiry: source.days_to_expiry,
                urgency: if source.days_to_expiry < 30 {
                    TransferUrgency::High
                } else {
                    TransferUrgency::Medium
                },
                estimated_savings: quantity.floor() * source.unit_price,
                timeline: if source.urgency == TransferUrgency::High {
                    "24-48 hours".to_string()
                } else {
                    "3-5 days".to_string()
                },
                reason: format!(
                    "Prevent expiry at {}, fulfill demand at {}",
                    source.store_id, target.store_id
                ),
            });

            available -= quantity;
            if available < MIN_BALANCE_QTY {
                break;
            }
        }
    }

    transfers.sort_by(|a, b| {
        a.urgency
            .cmp(&b.urgency)
            .then(b.estimated_savings.total_cmp(&a.estimated_savings))
    });
    transfers
}

// ============================================================================
// Expiry rescue
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueTransfer {
    pub sku: String,
    pub product_name: String,
    pub from_store: String,
    pub to_store: String,
    pub quantity: f64,
    pub days_to_expiry: i64,
    /// Units the target sold over the trailing window
    pub target_demand: f64,
    pub urgency: TransferUrgency,
    pub value_saved: f64,
}

/// Move items expiring within `threshold_days` to the store selling the most of them
pub fn expiry_rescue(snapshot: &Snapshot, threshold_days: i64) -> Vec<RescueTransfer> {
    let cutoff = snapshot.as_of - chrono::Duration::days(VELOCITY_WINDOW_DAYS);
    let mut rescues = Vec::new();

    for row in &snapshot.inventory {
        let days_to_expiry = snapshot.days_until(row.expiry_date);
        if days_to_expiry > threshold_days {
            continue;
        }

        let mut store_demand: BTreeMap<&str, f64> = BTreeMap::new();
        for sale in snapshot.sales_for(&row.sku).filter(|s| s.date >= cutoff) {
            *store_demand.entry(sale.store_id.as_str()).or_insert(0.0) += sale.quantity_sold;
        }

        let best = store_demand
            .iter()
            .filter(|(store, _)| **store != row.store_id)
            .fold(None::<(&str, f64)>, |best, (store, demand)| match best {
                Some((_, d)) if d >= *demand => best,
                _ if *demand > 0.0 => Some((*store, *demand)),
                _ => best,
            });

        let (to_store, demand) = match best {
            Some(best) if best.1 > row.current_stock => best,
            _ => continue,
        };

        let quantity = row.current_stock.min(demand * 0.5);
        if quantity < MIN_RESCUE_QTY {
            continue;
        }

        rescues.push(RescueTransfer {
            sku: row.sku.clone(),
            product_name: row.product_name.clone(),
            from_store: row.store_id.clone(),
            to_store: to_store.to_string(),
            quantity: quantity.floor(),
            days_to_expiry,
            target_demand: demand,
            urgency: if days_to_expiry <= 7 {
                TransferUrgency::Critical
            } else {
                TransferUrgency::High
            },
            value_saved: quantity.floor() * row.unit_price,
        });
    }

    rescues.sort_by_key(|r| r.days_to_expiry);
    rescues
}
