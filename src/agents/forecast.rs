//! Demand Forecasting Agent
//!
//! SKU-level demand prediction:
//! - Additive Holt-Winters over the daily sales series (weekly season)
//! - Seasonal uplifts for flu, allergy and festival months
//! - Velocity classification and surge detection
//! - Reorder timing against current stock

use crate::data::{mean, Snapshot};
use crate::error::{AgentError, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Distinct sale dates required before a sku is forecast
pub(crate) const MIN_HISTORY_DAYS: usize = 30;

/// Weekly seasonality
const SEASON_LENGTH: usize = 7;

const BAND_LOWER: f64 = 0.8;
const BAND_UPPER: f64 = 1.2;

/// Full forecast for one sku
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub sku: String,
    pub product_name: String,
    pub horizon_days: usize,
    pub predictions: Vec<ForecastPoint>,
    pub velocity_class: VelocityClass,
    pub statistics: ForecastStatistics,
    pub surge_alerts: Vec<SurgeAlert>,
    pub reorder_timing: ReorderTiming,
    /// False when the smoothing model could not be fit and the historical mean was used
    pub model_fitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VelocityClass {
    Slow,
    Medium,
    Fast,
}

impl VelocityClass {
    pub fn label(self) -> &'static str {
        match self {
            VelocityClass::Fast => "Fast-Moving",
            VelocityClass::Medium => "Medium-Moving",
            VelocityClass::Slow => "Slow-Moving",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastStatistics {
    pub average_daily_predicted: f64,
    pub total_predicted: f64,
    pub historical_daily_average: f64,
    pub trend_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurgeSeverity {
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeAlert {
    pub date: NaiveDate,
    pub predicted_demand: f64,
    pub historical_avg: f64,
    pub surge_pct: f64,
    pub severity: SurgeSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorderUrgency {
    Urgent,
    Soon,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderTiming {
    pub urgency: ReorderUrgency,
    pub current_stock: f64,
    /// `None` when no demand is predicted
    pub days_until_stockout: Option<f64>,
    pub order_in_days: Option<i64>,
    pub message: String,
}

/// Forecast daily demand for `sku` over the next `horizon` days
pub fn forecast(snapshot: &Snapshot, sku: &str, horizon: usize) -> Result<ForecastResult> {
    if !snapshot.knows_sku(sku) {
        return Err(AgentError::SkuNotFound(sku.to_string()));
    }

    let daily = snapshot.daily_demand(sku);
    if daily.len() < MIN_HISTORY_DAYS {
        return Err(AgentError::InsufficientHistory {
            sku: sku.to_string(),
            required: MIN_HISTORY_DAYS,
            available: daily.len(),
        });
    }

    // Non-empty: checked above
    let (first, last) = match (daily.keys().next(), daily.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(AgentError::SkuNotFound(sku.to_string())),
    };

    let historical_avg = mean(daily.values().copied());

    let mut series = Vec::new();
    let mut day = first;
    while day <= last {
        series.push(daily.get(&day).copied().unwrap_or(0.0));
        day += Duration::days(1);
    }

    let fitted = HoltWinters::fit(&series, SEASON_LENGTH);
    let model_fitted = fitted.is_some();
    let base: Vec<f64> = match &fitted {
        Some(model) => (1..=horizon).map(|h| model.forecast(h)).collect(),
        None => {
            debug!("Holt-Winters fit unavailable for {}, using historical mean", sku);
            vec![historical_avg; horizon]
        }
    };

    let product_name = snapshot.product_name(sku);
    let predictions: Vec<ForecastPoint> = base
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let date = last + Duration::days(i as i64 + 1);
            let point = (value.max(0.0)) * seasonal_multiplier(&product_name, date);
            ForecastPoint {
                date,
                point,
                lower: point * BAND_LOWER,
                upper: point * BAND_UPPER,
            }
        })
        .collect();

    let average_daily_predicted = mean(predictions.iter().map(|p| p.point));
    let total_predicted: f64 = predictions.iter().map(|p| p.point).sum();
    let trend_percentage = if historical_avg > 0.0 {
        (average_daily_predicted - historical_avg) / historical_avg * 100.0
    } else {
        0.0
    };

    let surge_alerts = detect_surges(&predictions, historical_avg);
    let reorder_timing = reorder_timing(snapshot.total_stock(sku), average_daily_predicted);

    info!(
        "Forecast {} over {} days: avg {:.1}/day, {} surge alert(s)",
        sku,
        horizon,
        average_daily_predicted,
        surge_alerts.len()
    );

    Ok(ForecastResult {
        sku: sku.to_string(),
        product_name,
        horizon_days: horizon,
        predictions,
        velocity_class: classify_velocity(historical_avg),
        statistics: ForecastStatistics {
            average_daily_predicted,
            total_predicted,
            historical_daily_average: historical_avg,
            trend_percentage,
        },
        surge_alerts,
        reorder_timing,
        model_fitted,
    })
}

/// Velocity class for a mean daily quantity
pub fn classify_velocity(avg_daily: f64) -> VelocityClass {
    if avg_daily >= 10.0 {
        VelocityClass::Fast
    } else if avg_daily >= 3.0 {
        VelocityClass::Medium
    } else {
        VelocityClass::Slow
    }
}

/// Compound seasonal uplift for a product on a date
pub fn seasonal_multiplier(product_name: &str, date: NaiveDate) -> f64 {
    let name = product_name.to_lowercase();
    let month = date.month();
    let mut multiplier = 1.0;

    if matches!(month, 11 | 12 | 1 | 2) && name.contains("flu") {
        multiplier *= 1.5;
    }
    if matches!(month, 3..=5) && name.contains("allerg") {
        multiplier *= 1.3;
    }
    // Festival period
    if matches!(month, 10..=12) {
        multiplier *= 1.1;
    }
    multiplier
}

fn detect_surges(predictions: &[ForecastPoint], historical_avg: f64) -> Vec<SurgeAlert> {
    if historical_avg <= 0.0 {
        return Vec::new();
    }

    predictions
        .iter()
        .filter(|p| p.point > historical_avg * 1.5)
        .map(|p| SurgeAlert {
            date: p.date,
            predicted_demand: p.point,
            historical_avg,
            surge_pct: (p.point / historical_avg - 1.0) * 100.0,
            severity: if p.point >= historical_avg * 2.0 {
                SurgeSeverity::High
            } else {
                SurgeSeverity::Medium
            },
        })
        .collect()
}

fn reorder_timing(current_stock: f64, avg_predicted: f64) -> ReorderTiming {
    if avg_predicted <= 0.0 {
        return ReorderTiming {
            urgency: ReorderUrgency::Normal,
            current_stock,
            days_until_stockout: None,
            order_in_days: None,
            message: "NORMAL - No demand predicted".to_string(),
        };
    }

    let days = current_stock / avg_predicted;
    let (urgency, order_in_days, message) = if days < 7.0 {
        (ReorderUrgency::Urgent, Some(0), "URGENT - Order within 24 hours".to_string())
    } else if days < 14.0 {
        (ReorderUrgency::Soon, Some(3), "SOON - Order within 3 days".to_string())
    } else {
        let wait = (days - 7.0) as i64;
        (ReorderUrgency::Normal, Some(wait), format!("NORMAL - Order in {} days", wait))
    };

    ReorderTiming {
        urgency,
        current_stock,
        days_until_stockout: Some(days),
        order_in_days,
        message,
    }
}

// ============================================================================
// Holt-Winters (additive trend, additive season)
// ============================================================================

const ALPHA_GRID: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];
const BETA_GRID: [f64; 4] = [0.01, 0.05, 0.1, 0.3];
const GAMMA_GRID: [f64; 4] = [0.05, 0.1, 0.3, 0.5];

#[derive(Debug, Clone)]
struct HoltWinters {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    /// Observations consumed; indexes the seasonal cycle for the forecast
    n: usize,
}

impl HoltWinters {
    /// Grid-search the smoothing parameters by one-step in-sample SSE.
    /// `None` when the series is shorter than two seasons or no fit is finite.
    fn fit(series: &[f64], period: usize) -> Option<Self> {
        if period == 0 || series.len() < 2 * period {
            return None;
        }

        let mut best: Option<(f64, HoltWinters)> = None;
        for &alpha in &ALPHA_GRID {
            for &beta in &BETA_GRID {
                for &gamma in &GAMMA_GRID {
                    let (sse, model) = Self::run(series, period, alpha, beta, gamma);
                    if !sse.is_finite() || !model.level.is_finite() || !model.trend.is_finite() {
                        continue;
                    }
                    if best.as_ref().map_or(true, |(b, _)| sse < *b) {
                        best = Some((sse, model));
                    }
                }
            }
        }

        best.map(|(_, model)| model)
    }

    fn run(series: &[f64], period: usize, alpha: f64, beta: f64, gamma: f64) -> (f64, HoltWinters) {
        let first_season = mean(series[..period].iter().copied());
        let second_season = mean(series[period..2 * period].iter().copied());

        let mut level = first_season;
        let mut trend = (second_season - first_season) / period as f64;
        let mut seasonal: Vec<f64> = series[..period].iter().map(|y| y - first_season).collect();

        let mut sse = 0.0;
        for (t, &y) in series.iter().enumerate() {
            let s = seasonal[t % period];
            let predicted = level + trend + s;
            sse += (y - predicted).powi(2);

            let new_level = alpha * (y - s) + (1.0 - alpha) * (level + trend);
            trend = beta * (new_level - level) + (1.0 - beta) * trend;
            seasonal[t % period] = gamma * (y - new_level) + (1.0 - gamma) * s;
            level = new_level;
        }

        (
            sse,
            HoltWinters {
                level,
                trend,
                seasonal,
                n: series.len(),
            },
        )
    }

    /// Point forecast `h` steps (h >= 1) past the end of the series
    fn forecast(&self, h: usize) -> f64 {
        let period = self.seasonal.len();
        self.level + h as f64 * self.trend + self.seasonal[(self.n + h - 1) % period]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::*;

    #[test]
    fn test_velocity_is_monotonic() {
        assert_eq!(classify_velocity(0.0), VelocityClass::Slow);
        assert_eq!(classify_velocity(2.99), VelocityClass::Slow);
        assert_eq!(classify_velocity(3.0), VelocityClass::Medium);
        assert_eq!(classify_velocity(10.0), VelocityClass::Fast);

        let mut previous = classify_velocity(0.0);
        for i in 0..200 {
            let current = classify_velocity(i as f64 * 0.1);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_seasonal_multipliers_compound() {
        assert!((seasonal_multiplier("Flu Relief", date(2024, 12, 1)) - 1.65).abs() < 1e-9);
        assert!((seasonal_multiplier("Flu Relief", date(2024, 1, 15)) - 1.5).abs() < 1e-9);
        assert!((seasonal_multiplier("Allergy Spray", date(2024, 4, 1)) - 1.3).abs() < 1e-9);
        assert!((seasonal_multiplier("Vitamin C", date(2024, 10, 1)) - 1.1).abs() < 1e-9);
        assert_eq!(seasonal_multiplier("Vitamin C", date(2024, 7, 1)), 1.0);
    }

    #[test]
    fn test_insufficient_history() {
        let as_of = date(2024, 7, 1);
        let sales = daily_sales(as_of, "A", "S1", 20, |_| 5.0);
        let snapshot = Snapshot::new(as_of, sales, vec![]);
        match forecast(&snapshot, "A", 14) {
            Err(AgentError::InsufficientHistory { required, available, .. }) => {
                assert_eq!(required, MIN_HISTORY_DAYS);
                assert_eq!(available, 20);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_sku() {
        let snapshot = Snapshot::new(date(2024, 7, 1), vec![], vec![]);
        assert!(matches!(forecast(&snapshot, "NOPE", 7), Err(AgentError::SkuNotFound(_))));
    }

    #[test]
    fn test_constant_series_forecasts_constant() {
        let as_of = date(2024, 7, 1);
        let sales = daily_sales(as_of, "A", "S1", 60, |_| 5.0);
        let snapshot = Snapshot::new(as_of, sales, vec![stock("A", "S1", 100.0, 10.0, date(2025, 1, 1))]);

        let result = forecast(&snapshot, "A", 14).unwrap();
        assert_eq!(result.predictions.len(), 14);
        assert_eq!(result.predictions[0].date, as_of);
        for p in &result.predictions {
            assert!((p.point - 5.0).abs() < 1e-6, "point {}", p.point);
            assert!((p.lower - 0.8 * p.point).abs() < 1e-9);
            assert!((p.upper - 1.2 * p.point).abs() < 1e-9);
        }
        assert_eq!(result.velocity_class, VelocityClass::Medium);
        assert!(result.surge_alerts.is_empty());
        // 100 units at 5/day is 20 days of cover
        assert_eq!(result.reorder_timing.urgency, ReorderUrgency::Normal);
        assert_eq!(result.reorder_timing.order_in_days, Some(13));
    }

    #[test]
    fn test_zero_demand_forecast() {
        let as_of = date(2024, 7, 1);
        let sales = daily_sales(as_of, "A", "S1", 40, |_| 0.0);
        let snapshot = Snapshot::new(as_of, sales, vec![stock("A", "S1", 50.0, 10.0, date(2025, 1, 1))]);

        let result = forecast(&snapshot, "A", 7).unwrap();
        assert!(result.predictions.iter().all(|p| p.point == 0.0));
        assert!(result.surge_alerts.is_empty());
        assert_eq!(result.statistics.trend_percentage, 0.0);
        assert_eq!(result.reorder_timing.urgency, ReorderUrgency::Normal);
        assert_eq!(result.reorder_timing.days_until_stockout, None);
    }

    #[test]
    fn test_gaps_are_zero_filled() {
        let as_of = date(2024, 7, 1);
        // Sales every other day: 30 distinct dates spanning 59 days
        let sales: Vec<_> = (0..30)
            .map(|i| sale(as_of - Duration::days(60 - 2 * i), "A", "S1", 8.0, 10.0))
            .collect();
        let snapshot = Snapshot::new(as_of, sales, vec![]);

        let result = forecast(&snapshot, "A", 7).unwrap();
        assert!(result.model_fitted);
        assert_eq!(result.statistics.historical_daily_average, 8.0);
        // Filled series averages roughly 4/day, well under the observed-day mean
        assert!(result.statistics.average_daily_predicted < 8.0);
        assert!(result.predictions.iter().all(|p| p.point >= 0.0));
    }

    #[test]
    fn test_surge_severity() {
        let predictions: Vec<ForecastPoint> = [10.0, 16.0, 20.0]
            .iter()
            .enumerate()
            .map(|(i, &point)| ForecastPoint {
                date: date(2024, 1, 1 + i as u32),
                point,
                lower: point * 0.8,
                upper: point * 1.2,
            })
            .collect();

        let alerts = detect_surges(&predictions, 10.0);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, SurgeSeverity::Medium);
        assert_eq!(alerts[1].severity, SurgeSeverity::High);
        assert!(detect_surges(&predictions, 0.0).is_empty());
    }

    #[test]
    fn test_holt_winters_tracks_weekly_pattern() {
        let series: Vec<f64> = (0..56).map(|i| if i % 7 == 5 { 20.0 } else { 5.0 }).collect();
        let model = HoltWinters::fit(&series, 7).unwrap();
        // Next index 56 has phase 0; the spike phase 5 is six steps ahead
        assert!(model.forecast(6) > model.forecast(1) + 10.0);
        assert!(HoltWinters::fit(&series[..10], 7).is_none());
    }
}
