//! Input data for the pharmacy agents
//!
//! Typed CSV records and the immutable [`Snapshot`] every calculator reads from.

pub mod loader;

pub use loader::{load_snapshot, read_inventory, read_pricing_signals, read_sales, read_suppliers};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Records
// ============================================================================

/// One line of the sales history export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRecord {
    #[serde(deserialize_with = "loader::deserialize_date")]
    pub date: NaiveDate,
    pub sku: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub category: String,
    pub quantity_sold: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub total_sale: f64,
    pub store_id: String,
    #[serde(default, deserialize_with = "loader::deserialize_bool")]
    pub is_prescription: bool,
}

/// One sku/store row of the current inventory export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub sku: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub category: String,
    pub unit_price: f64,
    pub store_id: String,
    pub current_stock: f64,
    #[serde(deserialize_with = "loader::deserialize_date")]
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub reorder_point: Option<f64>,
    #[serde(default)]
    pub supplier_id: Option<String>,
}

impl InventoryRecord {
    pub fn stock_value(&self) -> f64 {
        self.current_stock * self.unit_price
    }
}

/// Supplier performance and compliance reference data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierProfile {
    pub supplier_id: String,
    #[serde(default)]
    pub supplier_name: String,
    pub fill_rate: f64,
    pub cancellation_rate: f64,
    pub delay_rate: f64,
    #[serde(default)]
    pub avg_lead_time_days: f64,
    pub lead_time_variance: f64,
    pub on_time_delivery_rate: f64,
    pub price_competitiveness: f64,
    /// Share of total shelf life remaining on arrival, in percent
    pub avg_shelf_life_pct: f64,
    pub expired_on_arrival_rate: f64,
    #[serde(deserialize_with = "loader::deserialize_bool")]
    pub gmp_certified: bool,
    #[serde(deserialize_with = "loader::deserialize_bool")]
    pub iso_certified: bool,
    #[serde(deserialize_with = "loader::deserialize_bool")]
    pub fda_approved: bool,
    pub audit_score: f64,
    pub compliance_violations: u32,
    /// `;`-separated skus; empty or `*` means every sku
    #[serde(default)]
    pub skus: String,
}

impl SupplierProfile {
    pub fn supplies(&self, sku: &str) -> bool {
        let list = self.skus.trim();
        list.is_empty() || list == "*" || list.split(';').any(|s| s.trim() == sku)
    }

    pub fn display_name(&self) -> &str {
        if self.supplier_name.is_empty() {
            &self.supplier_id
        } else {
            &self.supplier_name
        }
    }
}

/// Market signals feeding the pricing calculator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSignal {
    pub sku: String,
    pub price_elasticity: f64,
    pub competitor_avg_price: f64,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Elasticity assumed when a sku has no pricing signal
pub const DEFAULT_ELASTICITY: f64 = -1.5;

/// Immutable view of the data at evaluation time
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub as_of: NaiveDate,
    pub sales: Vec<SalesRecord>,
    pub inventory: Vec<InventoryRecord>,
    pub suppliers: Vec<SupplierProfile>,
    pub pricing_signals: HashMap<String, PricingSignal>,
}

impl Snapshot {
    pub fn new(as_of: NaiveDate, sales: Vec<SalesRecord>, inventory: Vec<InventoryRecord>) -> Self {
        Self {
            as_of,
            sales,
            inventory,
            suppliers: Vec::new(),
            pricing_signals: HashMap::new(),
        }
    }

    pub fn with_suppliers(mut self, suppliers: Vec<SupplierProfile>) -> Self {
        self.suppliers = suppliers;
        self
    }

    pub fn with_pricing_signals(mut self, signals: Vec<PricingSignal>) -> Self {
        self.pricing_signals = signals.into_iter().map(|s| (s.sku.clone(), s)).collect();
        self
    }

    /// Distinct inventory skus in first-seen order
    pub fn skus(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for row in &self.inventory {
            if !seen.contains(&row.sku.as_str()) {
                seen.push(row.sku.as_str());
            }
        }
        seen
    }

    pub fn sales_for<'a>(&'a self, sku: &'a str) -> impl Iterator<Item = &'a SalesRecord> + 'a {
        self.sales.iter().filter(move |s| s.sku == sku)
    }

    pub fn inventory_for<'a>(&'a self, sku: &'a str) -> impl Iterator<Item = &'a InventoryRecord> + 'a {
        self.inventory.iter().filter(move |r| r.sku == sku)
    }

    pub fn knows_sku(&self, sku: &str) -> bool {
        self.inventory.iter().any(|r| r.sku == sku) || self.sales.iter().any(|s| s.sku == sku)
    }

    /// Product name from inventory, then sales; empty if unknown
    pub fn product_name(&self, sku: &str) -> String {
        self.inventory_for(sku)
            .map(|r| r.product_name.clone())
            .chain(self.sales_for(sku).map(|s| s.product_name.clone()))
            .find(|n| !n.is_empty())
            .unwrap_or_default()
    }

    /// Units on hand for a sku summed over all stores
    pub fn total_stock(&self, sku: &str) -> f64 {
        self.inventory_for(sku).map(|r| r.current_stock).sum()
    }

    /// Quantity sold per date for a sku, dates with sales only
    pub fn daily_demand(&self, sku: &str) -> BTreeMap<NaiveDate, f64> {
        let mut daily = BTreeMap::new();
        for sale in self.sales_for(sku) {
            *daily.entry(sale.date).or_insert(0.0) += sale.quantity_sold;
        }
        daily
    }

    /// Mean daily units sold at one store over the trailing window, averaged
    /// over the days that had sales. Zero when nothing sold.
    pub fn store_velocity(&self, sku: &str, store_id: &str, window_days: i64) -> f64 {
        let cutoff = self.as_of - Duration::days(window_days);
        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for sale in self.sales_for(sku) {
            if sale.store_id == store_id && sale.date >= cutoff {
                *daily.entry(sale.date).or_insert(0.0) += sale.quantity_sold;
            }
        }
        mean(daily.values().copied())
    }

    /// Mean daily units sold across all stores over the trailing window
    pub fn recent_velocity(&self, sku: &str, window_days: i64) -> f64 {
        let cutoff = self.as_of - Duration::days(window_days);
        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for sale in self.sales_for(sku) {
            if sale.date >= cutoff {
                *daily.entry(sale.date).or_insert(0.0) += sale.quantity_sold;
            }
        }
        mean(daily.values().copied())
    }

    /// Units sold in the trailing window across all stores
    pub fn recent_units(&self, sku: &str, window_days: i64) -> f64 {
        let cutoff = self.as_of - Duration::days(window_days);
        self.sales_for(sku)
            .filter(|s| s.date >= cutoff)
            .map(|s| s.quantity_sold)
            .sum()
    }

    pub fn last_sale_date(&self, sku: &str) -> Option<NaiveDate> {
        self.sales_for(sku).map(|s| s.date).max()
    }

    pub fn days_until(&self, date: NaiveDate) -> i64 {
        (date - self.as_of).num_days()
    }

    pub fn pricing_signal(&self, sku: &str) -> Option<&PricingSignal> {
        self.pricing_signals.get(sku)
    }
}

/// Arithmetic mean; zero for an empty sequence
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Sample standard deviation (n - 1); zero when fewer than two values
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    if var.is_finite() {
        var.sqrt()
    } else {
        0.0
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_daily_demand_sums_per_date() {
        let d = date(2024, 3, 1);
        let snapshot = Snapshot::new(
            date(2024, 3, 10),
            vec![sale(d, "A", "S1", 3.0, 1.0), sale(d, "A", "S2", 4.0, 1.0), sale(d, "B", "S1", 9.0, 1.0)],
            vec![],
        );
        let daily = snapshot.daily_demand("A");
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[&d], 7.0);
    }

    #[test]
    fn test_store_velocity_uses_window() {
        let as_of = date(2024, 3, 31);
        let mut sales = daily_sales(as_of, "A", "S1", 10, |_| 4.0);
        sales.push(sale(date(2024, 1, 1), "A", "S1", 500.0, 1.0));
        let snapshot = Snapshot::new(as_of, sales, vec![]);
        assert_eq!(snapshot.store_velocity("A", "S1", 30), 4.0);
        assert_eq!(snapshot.store_velocity("A", "S2", 30), 0.0);
    }

    #[test]
    fn test_sample_std_matches_n_minus_one() {
        let std = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((std - 2.138).abs() < 0.001);
        assert_eq!(sample_std(&[5.0]), 0.0);
    }

    #[test]
    fn test_supplier_sku_list() {
        let mut profile = SupplierProfile {
            supplier_id: "SUP001".into(),
            supplier_name: String::new(),
            fill_rate: 0.9,
            cancellation_rate: 0.0,
            delay_rate: 0.0,
            avg_lead_time_days: 3.0,
            lead_time_variance: 0.5,
            on_time_delivery_rate: 0.9,
            price_competitiveness: 0.9,
            avg_shelf_life_pct: 85.0,
            expired_on_arrival_rate: 0.0,
            gmp_certified: true,
            iso_certified: true,
            fda_approved: true,
            audit_score: 90.0,
            compliance_violations: 0,
            skus: String::new(),
        };
        assert!(profile.supplies("MED001"));
        assert_eq!(profile.display_name(), "SUP001");

        profile.skus = "MED001; MED002".into();
        assert!(profile.supplies("MED002"));
        assert!(!profile.supplies("MED003"));
    }
}
