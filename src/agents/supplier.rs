//! Supplier Intelligence Agent
//!
//! Supplier evaluation for pharmacy procurement:
//! - Weighted composite score (reliability, lead time, cost, freshness, compliance)
//! - Risk assessment and alerts
//! - Ranked suppliers per SKU
//! - Split ordering across the top two suppliers

use crate::data::{Snapshot, SupplierProfile};
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

const WEIGHT_RELIABILITY: f64 = 0.30;
const WEIGHT_LEAD_TIME: f64 = 0.20;
const WEIGHT_COST: f64 = 0.15;
const WEIGHT_FRESHNESS: f64 = 0.20;
const WEIGHT_COMPLIANCE: f64 = 0.15;

/// Expired-on-arrival rate that zeroes the freshness defect component
const DEFECT_CEILING: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorScores {
    pub reliability: f64,
    pub lead_time_consistency: f64,
    pub cost_competitiveness: f64,
    pub expiry_freshness: f64,
    pub compliance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierEvaluation {
    pub supplier_id: String,
    pub supplier_name: String,
    pub composite_score: f64,
    pub factor_scores: FactorScores,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub avg_lead_time_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierRanking {
    pub sku: String,
    pub suppliers: Vec<SupplierEvaluation>,
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn score(value: f64) -> f64 {
    (value * 100.0).clamp(0.0, 100.0)
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Score one supplier profile
pub fn evaluate_supplier(profile: &SupplierProfile) -> SupplierEvaluation {
    let reliability = score(
        unit(profile.fill_rate) * 0.4
            + (1.0 - unit(profile.cancellation_rate)) * 0.3
            + (1.0 - unit(profile.delay_rate)) * 0.3,
    );
    let lead_time_consistency = score(
        unit(profile.on_time_delivery_rate) * 0.7 + (1.0 - (profile.lead_time_variance.max(0.0) / 2.0).min(1.0)) * 0.3,
    );
    let cost_competitiveness = score(unit(profile.price_competitiveness));
    let expiry_freshness = score(
        unit(profile.avg_shelf_life_pct / 100.0) * 0.6
            + unit(1.0 - unit(profile.expired_on_arrival_rate) / DEFECT_CEILING) * 0.4,
    );
    let compliance = score(
        flag(profile.gmp_certified) * 0.3
            + flag(profile.iso_certified) * 0.2
            + flag(profile.fda_approved) * 0.2
            + unit(profile.audit_score / 100.0) * 0.2
            + (1.0 - (profile.compliance_violations as f64 / 10.0).min(1.0)) * 0.1,
    );

    let composite_score = (reliability * WEIGHT_RELIABILITY
        + lead_time_consistency * WEIGHT_LEAD_TIME
        + cost_competitiveness * WEIGHT_COST
        + expiry_freshness * WEIGHT_FRESHNESS
        + compliance * WEIGHT_COMPLIANCE)
        .clamp(0.0, 100.0);

    let (risk_level, risk_factors) = assess_risk(profile);

    SupplierEvaluation {
        supplier_id: profile.supplier_id.clone(),
        supplier_name: profile.display_name().to_string(),
        composite_score,
        factor_scores: FactorScores {
            reliability,
            lead_time_consistency,
            cost_competitiveness,
            expiry_freshness,
            compliance,
        },
        risk_level,
        risk_factors,
        avg_lead_time_days: profile.avg_lead_time_days,
    }
}

fn assess_risk(profile: &SupplierProfile) -> (RiskLevel, Vec<String>) {
    let mut level = RiskLevel::Low;
    let mut factors = Vec::new();

    if profile.delay_rate > 0.10 {
        level = RiskLevel::High;
        factors.push("High delay rate".to_string());
    }
    if profile.cancellation_rate > 0.05 {
        level = level.escalate();
        factors.push("Frequent cancellations".to_string());
    }
    if profile.expired_on_arrival_rate > 0.01 {
        level = level.escalate();
        factors.push("Expiry issues".to_string());
    }
    if profile.compliance_violations > 2 {
        level = RiskLevel::High;
        factors.push("Compliance violations".to_string());
    }

    (level, factors)
}

/// Suppliers carrying `sku`, best composite score first
pub fn rank_suppliers(snapshot: &Snapshot, sku: &str) -> Result<SupplierRanking> {
    let mut suppliers: Vec<SupplierEvaluation> = snapshot
        .suppliers
        .iter()
        .filter(|p| p.supplies(sku))
        .map(evaluate_supplier)
        .collect();

    if suppliers.is_empty() {
        return Err(AgentError::NoSuppliers(sku.to_string()));
    }

    suppliers.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
    Ok(SupplierRanking {
        sku: sku.to_string(),
        suppliers,
    })
}

// ============================================================================
// Risk alerts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierRiskAlert {
    pub supplier_id: String,
    pub supplier_name: String,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub composite_score: f64,
    pub action: String,
}

/// Medium and High risk suppliers, High first then weakest score first
pub fn risk_alerts(snapshot: &Snapshot) -> Vec<SupplierRiskAlert> {
    let mut alerts: Vec<SupplierRiskAlert> = snapshot
        .suppliers
        .iter()
        .map(evaluate_supplier)
        .filter(|e| e.risk_level != RiskLevel::Low)
        .map(|e| SupplierRiskAlert {
            action: if e.risk_level == RiskLevel::High {
                "Review and consider alternatives".to_string()
            } else {
                "Monitor closely".to_string()
            },
            supplier_id: e.supplier_id,
            supplier_name: e.supplier_name,
            risk_level: e.risk_level,
            risk_factors: e.risk_factors,
            composite_score: e.composite_score,
        })
        .collect();

    alerts.sort_by(|a, b| {
        b.risk_level
            .cmp(&a.risk_level)
            .then(a.composite_score.total_cmp(&b.composite_score))
    });
    alerts
}

// ============================================================================
// Split ordering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    SingleSupplier,
    SplitOrdering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierAllocation {
    pub supplier_id: String,
    pub supplier_name: String,
    pub quantity: u64,
    pub percentage: f64,
    pub score: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOrder {
    pub sku: String,
    pub total_quantity: u64,
    pub strategy: SplitStrategy,
    pub allocation: Vec<SupplierAllocation>,
    pub note: Option<String>,
}

/// Split `quantity` between the two best suppliers: 70/30 when the primary is
/// low risk, 60/40 otherwise. Allocations always sum to `quantity`.
pub fn split_order(snapshot: &Snapshot, sku: &str, quantity: u64) -> Result<SplitOrder> {
    let ranking = rank_suppliers(snapshot, sku)?;
    let primary = &ranking.suppliers[0];

    let allocation = match ranking.suppliers.get(1) {
        None => vec![SupplierAllocation {
            supplier_id: primary.supplier_id.clone(),
            supplier_name: primary.supplier_name.clone(),
            quantity,
            percentage: 100.0,
            score: primary.composite_score,
            risk_level: primary.risk_level,
        }],
        Some(backup) => {
            let primary_pct: u64 = if primary.risk_level == RiskLevel::Low { 70 } else { 60 };
            // Split before multiplying so the share cannot overflow
            let primary_qty = quantity / 100 * primary_pct + quantity % 100 * primary_pct / 100;
            vec![
                SupplierAllocation {
                    supplier_id: primary.supplier_id.clone(),
                    supplier_name: primary.supplier_name.clone(),
                    quantity: primary_qty,
                    percentage: primary_pct as f64,
                    score: primary.composite_score,
                    risk_level: primary.risk_level,
                },
                SupplierAllocation {
                    supplier_id: backup.supplier_id.clone(),
                    supplier_name: backup.supplier_name.clone(),
                    quantity: quantity - primary_qty,
                    percentage: (100 - primary_pct) as f64,
                    score: backup.composite_score,
                    risk_level: backup.risk_level,
                },
            ]
        }
    };

    let (strategy, note) = if allocation.len() == 1 {
        (SplitStrategy::SingleSupplier, Some("Only one supplier available".to_string()))
    } else {
        (SplitStrategy::SplitOrdering, None)
    };
    info!("Split order for {} x{}: {:?} across {} supplier(s)", sku, quantity, strategy, allocation.len());

    Ok(SplitOrder {
        sku: sku.to_string(),
        total_quantity: quantity,
        strategy,
        allocation,
        note,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::date;

    fn profile(id: &str) -> SupplierProfile {
        SupplierProfile {
            supplier_id: id.to_string(),
            supplier_name: format!("{} Pharma", id),
            fill_rate: 0.95,
            cancellation_rate: 0.01,
            delay_rate: 0.03,
            avg_lead_time_days: 3.0,
            lead_time_variance: 0.5,
            on_time_delivery_rate: 0.92,
            price_competitiveness: 0.85,
            avg_shelf_life_pct: 88.0,
            expired_on_arrival_rate: 0.002,
            gmp_certified: true,
            iso_certified: true,
            fda_approved: true,
            audit_score: 92.0,
            compliance_violations: 0,
            skus: String::new(),
        }
    }

    fn snapshot(suppliers: Vec<SupplierProfile>) -> Snapshot {
        Snapshot::new(date(2024, 1, 1), vec![], vec![]).with_suppliers(suppliers)
    }

    #[test]
    fn test_scores_within_bounds() {
        let extremes = [
            SupplierProfile {
                fill_rate: 1.5,
                cancellation_rate: -0.2,
                delay_rate: 0.0,
                lead_time_variance: 0.0,
                on_time_delivery_rate: 1.0,
                price_competitiveness: 1.2,
                avg_shelf_life_pct: 140.0,
                expired_on_arrival_rate: 0.0,
                audit_score: 120.0,
                ..profile("MAX")
            },
            SupplierProfile {
                fill_rate: 0.0,
                cancellation_rate: 1.0,
                delay_rate: 1.0,
                lead_time_variance: 9.0,
                on_time_delivery_rate: 0.0,
                price_competitiveness: 0.0,
                avg_shelf_life_pct: 0.0,
                expired_on_arrival_rate: 0.5,
                gmp_certified: false,
                iso_certified: false,
                fda_approved: false,
                audit_score: 0.0,
                compliance_violations: 50,
                ..profile("MIN")
            },
        ];

        for p in &extremes {
            let e = evaluate_supplier(p);
            let f = &e.factor_scores;
            for s in [
                e.composite_score,
                f.reliability,
                f.lead_time_consistency,
                f.cost_competitiveness,
                f.expiry_freshness,
                f.compliance,
            ] {
                assert!((0.0..=100.0).contains(&s), "score {} out of range for {}", s, p.supplier_id);
            }
        }
        assert_eq!(evaluate_supplier(&extremes[1]).composite_score, 0.0);
    }

    #[test]
    fn test_factor_formulas() {
        let e = evaluate_supplier(&profile("A"));
        // 0.95*0.4 + 0.99*0.3 + 0.97*0.3
        assert!((e.factor_scores.reliability - 96.8).abs() < 1e-9);
        // 0.92*0.7 + 0.75*0.3
        assert!((e.factor_scores.lead_time_consistency - 86.9).abs() < 1e-9);
        // 0.88*0.6 + 0.9*0.4
        assert!((e.factor_scores.expiry_freshness - 88.8).abs() < 1e-9);
        // 0.3 + 0.2 + 0.2 + 0.184 + 0.1
        assert!((e.factor_scores.compliance - 98.4).abs() < 1e-9);
        assert_eq!(e.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_risk_escalation() {
        let cancel = SupplierProfile {
            cancellation_rate: 0.06,
            ..profile("C")
        };
        assert_eq!(evaluate_supplier(&cancel).risk_level, RiskLevel::Medium);

        let cancel_and_defect = SupplierProfile {
            expired_on_arrival_rate: 0.015,
            ..cancel.clone()
        };
        assert_eq!(evaluate_supplier(&cancel_and_defect).risk_level, RiskLevel::High);

        let violations = SupplierProfile {
            compliance_violations: 3,
            ..profile("V")
        };
        let e = evaluate_supplier(&violations);
        assert_eq!(e.risk_level, RiskLevel::High);
        assert_eq!(e.risk_factors, vec!["Compliance violations"]);

        let delayed = SupplierProfile {
            delay_rate: 0.2,
            ..profile("D")
        };
        assert_eq!(evaluate_supplier(&delayed).risk_level, RiskLevel::High);
    }

    #[test]
    fn test_rank_filters_by_sku() {
        let strong = profile("STRONG");
        let weak = SupplierProfile {
            fill_rate: 0.6,
            price_competitiveness: 0.4,
            ..profile("WEAK")
        };
        let other = SupplierProfile {
            skus: "MED999".into(),
            ..profile("OTHER")
        };
        let snap = snapshot(vec![weak, other, strong]);

        let ranking = rank_suppliers(&snap, "MED001").unwrap();
        let ids: Vec<&str> = ranking.suppliers.iter().map(|s| s.supplier_id.as_str()).collect();
        assert_eq!(ids, vec!["STRONG", "WEAK"]);

        assert!(matches!(rank_suppliers(&snapshot(vec![]), "MED001"), Err(AgentError::NoSuppliers(_))));
    }

    #[test]
    fn test_split_sums_to_total() {
        let risky = SupplierProfile {
            cancellation_rate: 0.06,
            ..profile("RISKY")
        };
        let snap = snapshot(vec![profile("A"), profile("B")]);
        let split = split_order(&snap, "MED001", 1001).unwrap();
        assert_eq!(split.strategy, SplitStrategy::SplitOrdering);
        assert_eq!(split.allocation[0].quantity, 700);
        assert_eq!(split.allocation[1].quantity, 301);

        let snap = snapshot(vec![risky]);
        let single = split_order(&snap, "MED001", 250).unwrap();
        assert_eq!(single.strategy, SplitStrategy::SingleSupplier);
        assert_eq!(single.allocation[0].quantity, 250);
        assert_eq!(single.allocation[0].percentage, 100.0);
    }

    #[test]
    fn test_split_sixty_forty_for_risky_primary() {
        let risky_best = SupplierProfile {
            cancellation_rate: 0.06,
            ..profile("RISKY")
        };
        let weaker = SupplierProfile {
            fill_rate: 0.5,
            price_competitiveness: 0.3,
            ..profile("WEAK")
        };
        let split = split_order(&snapshot(vec![weaker, risky_best]), "MED001", 1000).unwrap();
        assert_eq!(split.allocation[0].supplier_id, "RISKY");
        assert_eq!(split.allocation[0].quantity, 600);
        assert_eq!(split.allocation[1].quantity, 400);
    }

    #[test]
    fn test_risk_alerts_order() {
        let medium = SupplierProfile {
            cancellation_rate: 0.06,
            ..profile("MED")
        };
        let high = SupplierProfile {
            compliance_violations: 5,
            ..profile("HIGH")
        };
        let weak_medium = SupplierProfile {
            cancellation_rate: 0.06,
            fill_rate: 0.6,
            ..profile("WEAK_MED")
        };
        let alerts = risk_alerts(&snapshot(vec![profile("OK"), medium, high, weak_medium]));
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].supplier_id, "HIGH");
        assert_eq!(alerts[0].action, "Review and consider alternatives");
        // Weakest supplier leads within a tier
        assert_eq!(alerts[1].supplier_id, "WEAK_MED");
        assert_eq!(alerts[2].supplier_id, "MED");
        assert_eq!(alerts[2].action, "Monitor closely");
    }

    #[test]
    fn test_split_huge_quantity_does_not_overflow() {
        let snap = snapshot(vec![profile("A"), profile("B")]);
        let quantity = u64::MAX - 7;
        let split = split_order(&snap, "MED001", quantity).unwrap();
        let primary = split.allocation[0].quantity;
        let backup = split.allocation[1].quantity;
        assert_eq!(primary.checked_add(backup), Some(quantity));
        assert_eq!(primary, (quantity as u128 * 70 / 100) as u64);
    }

    #[test]
    fn test_split_zero_quantity() {
        let split = split_order(&snapshot(vec![profile("A"), profile("B")]), "MED001", 0).unwrap();
        assert_eq!(split.total_quantity, 0);
        assert!(split.allocation.iter().all(|a| a.quantity == 0));
    }
}
