//! Pairwise correlation ranking.

use super::{pearson, round_to};
use crate::data::RefinedDataset;
use serde::{Deserialize, Serialize};

/// Minimum |r| for a pair to be reported.
pub const THRESHOLD: f64 = 0.5;
/// |r| above which a relationship is "Strong".
pub const STRONG: f64 = 0.7;
pub const MAX_RESULTS: usize = 5;

/// A notable correlation between two numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMetric {
    pub column_a: String,
    pub column_b: String,
    pub coefficient: f64,
    pub description: String,
}

fn describe(r: f64) -> String {
    let strength = if r.abs() > STRONG { "Strong" } else { "Moderate" };
    let direction = if r > 0.0 { "positive" } else { "negative" };
    format!("{} {} relationship", strength, direction)
}

/// Top pairs by |r|. Each unordered pair appears at most once.
pub fn top_correlations(ds: &RefinedDataset) -> Vec<CorrelationMetric> {
    let numeric = ds.numeric_columns();
    let mut metrics = Vec::new();
    for (i, (name_a, a)) in numeric.iter().enumerate() {
        for (name_b, b) in numeric.iter().skip(i + 1) {
            let r = pearson(a, b);
            if r.is_nan() || r == 0.0 || r.abs() <= THRESHOLD {
                continue;
            }
            metrics.push(CorrelationMetric {
                column_a: name_a.to_string(),
                column_b: name_b.to_string(),
                coefficient: round_to(r, 4),
                description: describe(r),
            });
        }
    }
    metrics.sort_by(|x, y| y.coefficient.abs().total_cmp(&x.coefficient.abs()));
    metrics.truncate(MAX_RESULTS);
    metrics
}
