//! Feature importance against an auto-selected target column.

use super::{mean, pearson, round_to};
use crate::algorithms::forest::{ForestConfig, RandomForestRegressor};
use crate::data::RefinedDataset;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TARGET_HINTS: &[&str] = &["revenue", "sales", "price", "profit"];
pub const MAX_RESULTS: usize = 5;

/// How much one feature drives the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceMetric {
    pub feature: String,
    pub importance: f64,
    /// "High", "Medium" or "Low".
    pub impact: String,
    /// "Positive", "Negative" or "Neutral".
    pub contribution: String,
}

/// First numeric column whose name looks like a business target, else the last numeric column.
pub fn select_target<'a>(numeric: &[(&'a str, &[f64])]) -> Option<&'a str> {
    numeric
        .iter()
        .find(|(name, _)| {
            let lower = name.to_lowercase();
            TARGET_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .or_else(|| numeric.last())
        .map(|(name, _)| *name)
}

fn impact_tier(importance: f64) -> &'static str {
    if importance > 0.4 {
        "High"
    } else if importance > 0.1 {
        "Medium"
    } else {
        "Low"
    }
}

fn contribution(corr: f64) -> &'static str {
    if corr > 0.1 {
        "Positive"
    } else if corr < -0.1 {
        "Negative"
    } else {
        "Neutral"
    }
}

/// Replace non-finite values with the column mean of the finite ones (or 0).
fn clean(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let fill = if finite.is_empty() { 0.0 } else { mean(&finite) };
    values
        .iter()
        .map(|v| if v.is_finite() { *v } else { fill })
        .collect()
}

/// Rank the remaining numeric columns by random forest importance for the target.
pub fn feature_importance(ds: &RefinedDataset, config: &ForestConfig) -> Vec<FeatureImportanceMetric> {
    let numeric = ds.numeric_columns();
    if numeric.len() < 2 || ds.n_rows() == 0 {
        return Vec::new();
    }
    let Some(target_name) = select_target(&numeric) else {
        return Vec::new();
    };
    let target = numeric
        .iter()
        .find(|(name, _)| *name == target_name)
        .map(|(_, v)| clean(v))
        .unwrap_or_default();
    let features: Vec<(&str, Vec<f64>)> = numeric
        .iter()
        .filter(|(name, _)| *name != target_name)
        .map(|(name, v)| (*name, clean(v)))
        .collect();

    let rows: Vec<Vec<f64>> = (0..ds.n_rows())
        .map(|r| features.iter().map(|(_, col)| col[r]).collect())
        .collect();

    let mut forest = RandomForestRegressor::new(config.clone());
    if let Err(e) = forest.fit(&rows, &target) {
        warn!(error = %e, target = target_name, "Feature importance fit failed");
        return Vec::new();
    }
    debug!(target = target_name, features = features.len(), "Fitted importance forest");

    let mut metrics: Vec<FeatureImportanceMetric> = features
        .iter()
        .zip(forest.feature_importances())
        .map(|((name, col), &importance)| {
            let corr = pearson(col, &target);
            FeatureImportanceMetric {
                feature: name.to_string(),
                importance: round_to(importance, 3),
                impact: impact_tier(importance).to_string(),
                contribution: contribution(if corr.is_nan() { 0.0 } else { corr }).to_string(),
            }
        })
        .collect();
    metrics.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    metrics.truncate(MAX_RESULTS);
    metrics
}
