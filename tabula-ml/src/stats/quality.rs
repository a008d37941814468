//! Data quality scoring.

use super::{round_to, variance};
use crate::data::RefinedDataset;
use serde::{Deserialize, Serialize};

const MISSING_WEIGHT: f64 = 0.5;
const DUPLICATE_WEIGHT: f64 = 0.3;
const ZERO_VARIANCE_WEIGHT: f64 = 10.0;

/// Overall data quality of a refined dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// 0 to 100, higher is better.
    pub score: f64,
    pub missing_cells: usize,
    pub duplicate_rows: usize,
    /// Mean sample variance across numeric columns.
    pub variance_score: f64,
    pub issues: Vec<String>,
}

impl DataQualityReport {
    pub fn perfect() -> Self {
        Self {
            score: 100.0,
            missing_cells: 0,
            duplicate_rows: 0,
            variance_score: 0.0,
            issues: Vec::new(),
        }
    }
}

/// Score the dataset. Always produces a report; an empty dataset scores 100.
pub fn data_quality(ds: &RefinedDataset) -> DataQualityReport {
    if ds.is_empty() {
        return DataQualityReport::perfect();
    }
    let total_cells = (ds.n_rows() * ds.n_cols()) as f64;
    let missing_cells = ds.missing_cells();
    let duplicate_rows = ds.duplicate_rows();
    let missing_pct = missing_cells as f64 / total_cells * 100.0;
    let duplicate_pct = duplicate_rows as f64 / ds.n_rows() as f64 * 100.0;

    let numeric = ds.numeric_columns();
    let variances: Vec<f64> = numeric.iter().map(|(_, v)| variance(v, 1)).collect();
    let zero_variance: Vec<&str> = numeric
        .iter()
        .zip(&variances)
        .filter(|(_, var)| **var == 0.0)
        .map(|((name, _), _)| *name)
        .collect();
    let zero_fraction = if numeric.is_empty() {
        0.0
    } else {
        zero_variance.len() as f64 / numeric.len() as f64
    };

    let mut issues = Vec::new();
    if missing_pct > 5.0 {
        issues.push(format!("High missing data rate ({:.1}%)", missing_pct));
    }
    if duplicate_pct > 2.0 {
        issues.push(format!("Detected {} duplicate rows", duplicate_rows));
    }
    if let Some(first) = zero_variance.first() {
        issues.push(format!("Zero variance in column: {}", first));
    }

    let score = 100.0
        - MISSING_WEIGHT * missing_pct
        - DUPLICATE_WEIGHT * duplicate_pct
        - ZERO_VARIANCE_WEIGHT * zero_fraction;

    let finite: Vec<f64> = variances.into_iter().filter(|v| v.is_finite()).collect();
    let variance_score = if finite.is_empty() {
        0.0
    } else {
        round_to(finite.iter().sum::<f64>() / finite.len() as f64, 2)
    };

    DataQualityReport {
        score: round_to(score.clamp(0.0, 100.0), 1),
        missing_cells,
        duplicate_rows,
        variance_score,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, Column, RowIndex};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_is_perfect() {
        let report = data_quality(&RefinedDataset::default());
        assert_eq!(report.score, 100.0);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_clean_dataset() {
        let ds = RefinedDataset::from_numeric(vec![
            ("a", vec![1.0, 2.0, 3.0]),
            ("b", vec![2.0, 2.0, 5.0]),
        ])
        .unwrap();
        let report = data_quality(&ds);
        assert_eq!(report.score, 100.0);
        assert_eq!(report.variance_score, 1.5);
    }

    #[test]
    fn test_penalties_and_issues() {
        let ds = RefinedDataset::new(
            vec![
                Column::numeric("flat", vec![1.0; 4]),
                Column::numeric("x", vec![1.0, 1.0, 2.0, 3.0]),
                Column::categorical(
                    "tag",
                    vec![Cell::text("a"), Cell::text("a"), Cell::Null, Cell::Null],
                ),
            ],
            RowIndex::Range,
        )
        .unwrap();
        let report = data_quality(&ds);
        // missing 2/12 = 16.67%, duplicates 1/4 = 25%, zero variance 1/2
        assert_eq!(report.missing_cells, 2);
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.score, round_to(100.0 - 8.3333 - 7.5 - 5.0, 1));
        assert_eq!(
            report.issues,
            vec![
                "High missing data rate (16.7%)".to_string(),
                "Detected 1 duplicate rows".to_string(),
                "Zero variance in column: flat".to_string(),
            ]
        );
    }

    #[test]
    fn test_all_missing_column() {
        let ds = RefinedDataset::new(
            vec![Column::categorical("x", vec![Cell::Null; 10])],
            RowIndex::Range,
        )
        .unwrap();
        let report = data_quality(&ds);
        // 100% missing and 9 of 10 rows duplicated
        assert_eq!(report.score, 23.0);
        assert_eq!(report.variance_score, 0.0);
    }
}
