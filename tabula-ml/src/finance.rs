//! Dataset profile, summary statistics, and profit/loss helpers.

use crate::data::{ColumnKind, RefinedDataset};
use crate::stats::{DataQualityReport, round_to};
use serde::{Deserialize, Serialize};

const HIGH_VOLUME_ROWS: usize = 100;
const NOISY_QUALITY: f64 = 80.0;
const NOISY_ANOMALY_SHARE: f64 = 0.05;

const REVENUE_HINTS: &[&str] = &["revenue", "sales", "income"];
const COST_HINTS: &[&str] = &["cost", "expense", "spending"];
const DATE_HINTS: &[&str] = &["date", "time", "stamp"];
const SERIES_VALUE_HINTS: &[&str] = &["price", "revenue", "sales", "total", "value", "amount"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitLoss {
    pub total_revenue: f64,
    pub total_cost: f64,
    pub net_profit: f64,
    pub margin_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_rows: usize,
    pub total_columns: usize,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub temporal_columns: Vec<String>,
}

impl SummaryStats {
    pub fn of(ds: &RefinedDataset) -> Self {
        Self {
            total_rows: ds.n_rows(),
            total_columns: ds.n_cols(),
            numeric_columns: ds.names_of_kind(ColumnKind::Numeric),
            categorical_columns: ds.names_of_kind(ColumnKind::Categorical),
            temporal_columns: ds.names_of_kind(ColumnKind::Temporal),
        }
    }
}

fn matches_any(name: &str, hints: &[&str]) -> bool {
    let lower = name.to_lowercase();
    hints.iter().any(|h| lower.contains(h))
}

/// Revenue and cost totals from the last columns named like revenue and
/// cost. `None` unless both are present and numeric.
pub fn profit_loss(ds: &RefinedDataset) -> Option<ProfitLoss> {
    let mut revenue = None;
    let mut cost = None;
    for column in ds.columns() {
        if matches_any(&column.name, REVENUE_HINTS) {
            revenue = Some(column);
        }
        if matches_any(&column.name, COST_HINTS) {
            cost = Some(column);
        }
    }
    let total_revenue: f64 = revenue?.as_numeric()?.iter().sum();
    let total_cost: f64 = cost?.as_numeric()?.iter().sum();
    let net_profit = total_revenue - total_cost;
    let margin = if total_revenue != 0.0 {
        net_profit / total_revenue * 100.0
    } else {
        0.0
    };
    let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
    Some(ProfitLoss {
        total_revenue: round_to(finite(total_revenue), 2),
        total_cost: round_to(finite(total_cost), 2),
        net_profit: round_to(finite(net_profit), 2),
        margin_percentage: round_to(finite(margin), 2),
    })
}

/// Label such as `"High-Volume | Refined"`.
pub fn detection_profile(
    rows: usize,
    quality: Option<&DataQualityReport>,
    anomaly_count: usize,
) -> String {
    let volume = if rows > HIGH_VOLUME_ROWS {
        "High-Volume"
    } else {
        "Micro-Dataset"
    };
    let score = quality.map(|q| q.score).unwrap_or(100.0);
    let noisy = score < NOISY_QUALITY || anomaly_count as f64 > rows as f64 * NOISY_ANOMALY_SHARE;
    let state = if noisy { "Unrefined (Noisy)" } else { "Refined" };
    format!("{} | {}", volume, state)
}

/// Date and value columns for the dashboard forecast, if any.
pub fn time_series_columns(ds: &RefinedDataset) -> Option<(String, String)> {
    let date = ds
        .columns()
        .iter()
        .find(|c| c.kind() == ColumnKind::Temporal || matches_any(&c.name, DATE_HINTS))?;
    let numeric: Vec<&str> = ds
        .numeric_columns()
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| *name != date.name)
        .collect();
    let value = numeric
        .iter()
        .find(|name| matches_any(name, SERIES_VALUE_HINTS))
        .or_else(|| numeric.first())?;
    Some((date.name.clone(), value.to_string()))
}
