//! Z-score anomaly detection.

use super::{mean, std_dev};
use crate::data::RefinedDataset;
use serde::{Deserialize, Serialize};

pub const MODERATE_Z: f64 = 2.5;
pub const HIGH_Z: f64 = 3.5;
/// Alerts returned across all columns.
pub const MAX_ALERTS: usize = 10;
const MIN_VALUES: usize = 5;

/// A single flagged value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub column: String,
    /// Row position (or integer label); -1 when the row label is not an integer.
    pub row_index: i64,
    pub value: f64,
    pub severity: String,
    pub reason: String,
}

/// Flag values with |z| > 2.5, scanning columns in order until the cap is reached.
pub fn detect_anomalies(ds: &RefinedDataset) -> Vec<AnomalyAlert> {
    let mut alerts = Vec::new();
    for (name, values) in ds.numeric_columns() {
        if alerts.len() >= MAX_ALERTS {
            break;
        }
        if values.len() < MIN_VALUES {
            continue;
        }
        let m = mean(values);
        let sd = std_dev(values);
        if !sd.is_finite() || sd == 0.0 {
            continue;
        }
        for (row, &value) in values.iter().enumerate() {
            let z = (value - m) / sd;
            if z.abs() <= MODERATE_Z {
                continue;
            }
            let severity = if z.abs() > HIGH_Z { "High" } else { "Moderate" };
            alerts.push(AnomalyAlert {
                column: name.to_string(),
                row_index: ds.index().integer_label(row),
                value,
                severity: severity.to_string(),
                reason: format!(
                    "{} outlier detected ({:.1} standard deviations from mean)",
                    severity,
                    z
                ),
            });
            if alerts.len() >= MAX_ALERTS {
                break;
            }
        }
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, RowIndex};
    use pretty_assertions::assert_eq;

    fn spiked(n: usize, spike_at: usize, spike: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                if i == spike_at {
                    spike
                } else {
                    500.0 + ((i * 37) % 101) as f64 - 50.0
                }
            })
            .collect()
    }

    #[test]
    fn test_single_high_outlier() {
        let ds = RefinedDataset::from_numeric(vec![("sales", spiked(100, 10, 5000.0))]).unwrap();
        let alerts = detect_anomalies(&ds);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].row_index, 10);
        assert_eq!(alerts[0].severity, "High");
        assert!(alerts[0].reason.starts_with("High outlier detected ("));
    }

    #[test]
    fn test_low_outlier_reason_is_signed() {
        let ds = RefinedDataset::from_numeric(vec![("sales", spiked(100, 40, -4000.0))]).unwrap();
        let alerts = detect_anomalies(&ds);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].row_index, 40);
        assert_eq!(alerts[0].severity, "High");
        assert!(alerts[0].reason.starts_with("High outlier detected (-"));
        assert!(alerts[0].reason.ends_with(" standard deviations from mean)"));
    }

    #[test]
    fn test_constant_and_short_columns_skipped() {
        let flat = RefinedDataset::from_numeric(vec![("flat", vec![3.0; 50])]).unwrap();
        assert!(detect_anomalies(&flat).is_empty());
        let short = RefinedDataset::from_numeric(vec![("short", vec![1.0, 1.0, 1.0, 100.0])]).unwrap();
        assert!(detect_anomalies(&short).is_empty());
    }

    #[test]
    fn test_cap_across_columns() {
        let mut cols = Vec::new();
        let names = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"];
        for name in names {
            cols.push((name, spiked(60, 3, 9000.0)));
        }
        let alerts = detect_anomalies(&RefinedDataset::from_numeric(cols).unwrap());
        assert_eq!(alerts.len(), MAX_ALERTS);
        assert_eq!(alerts[9].column, "j");
    }

    #[test]
    fn test_non_integer_index_degrades() {
        let labels: Vec<String> = (0..30).map(|i| format!("r{}", i)).collect();
        let ds = RefinedDataset::new(
            vec![Column::numeric("x", spiked(30, 0, 10_000.0))],
            RowIndex::Labels(labels),
        )
        .unwrap();
        let alerts = detect_anomalies(&ds);
        assert_eq!(alerts[0].row_index, -1);
    }
}
