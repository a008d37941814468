//! Classical additive seasonal decomposition.

use super::series::MonthlySeries;
use serde::{Deserialize, Serialize};

/// Trend, seasonal and residual components aligned to the monthly index.
/// Edge values the moving average cannot reach are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesDecomposition {
    pub dates: Vec<String>,
    pub observed: Vec<f64>,
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
}

/// Largest usable period for `n` points. Keeps `requested` when two full
/// cycles fit, otherwise steps down; `None` below 4 points.
pub fn effective_period(requested: usize, n: usize) -> Option<usize> {
    if requested >= 2 && n >= 2 * requested {
        return Some(requested);
    }
    match n {
        n if n >= 24 => Some(12),
        n if n >= 12 => Some(6),
        n if n >= 8 => Some(4),
        n if n >= 4 => Some(2),
        _ => None,
    }
}

/// Centered moving average; 2×p for even periods. `None` at the edges.
fn centered_trend(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let half = period / 2;
    let weights: Vec<f64> = if period % 2 == 0 {
        let mut w = vec![1.0; period + 1];
        w[0] = 0.5;
        w[period] = 0.5;
        w.into_iter().map(|x| x / period as f64).collect()
    } else {
        vec![1.0 / period as f64; period]
    };
    (0..n)
        .map(|t| {
            if t < half || t + half >= n {
                return None;
            }
            let start = t - half;
            Some(
                weights
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * values[start + k])
                    .sum(),
            )
        })
        .collect()
}

/// Additive decomposition with the given period. Needs at least two cycles.
pub fn decompose_additive(series: &MonthlySeries, period: usize) -> Option<TimeSeriesDecomposition> {
    let n = series.len();
    if period < 2 || n < 2 * period {
        return None;
    }
    let trend = centered_trend(&series.values, period);

    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (t, tr) in trend.iter().enumerate() {
        if let Some(tr) = tr {
            sums[t % period] += series.values[t] - tr;
            counts[t % period] += 1;
        }
    }
    let mut averages: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
        .collect();
    let offset = averages.iter().sum::<f64>() / period as f64;
    for a in &mut averages {
        *a -= offset;
    }

    let seasonal: Vec<f64> = (0..n).map(|t| averages[t % period]).collect();
    let residual: Vec<f64> = (0..n)
        .map(|t| match trend[t] {
            Some(tr) => series.values[t] - tr - seasonal[t],
            None => 0.0,
        })
        .collect();

    Some(TimeSeriesDecomposition {
        dates: series
            .dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect(),
        observed: series.values.clone(),
        trend: trend.into_iter().map(|t| t.unwrap_or(0.0)).collect(),
        seasonal,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dates::add_months_end;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn monthly(values: Vec<f64>) -> MonthlySeries {
        let start = NaiveDate::from_ymd_opt(2022, 1, 31).unwrap();
        MonthlySeries {
            dates: (0..values.len() as u32).map(|i| add_months_end(start, i)).collect(),
            values,
        }
    }

    #[test]
    fn test_effective_period() {
        assert_eq!(effective_period(12, 36), Some(12));
        assert_eq!(effective_period(12, 24), Some(12));
        assert_eq!(effective_period(12, 20), Some(6));
        assert_eq!(effective_period(12, 9), Some(4));
        assert_eq!(effective_period(12, 5), Some(2));
        assert_eq!(effective_period(12, 3), None);
        assert_eq!(effective_period(6, 14), Some(6));
    }

    #[test]
    fn test_recovers_additive_components() {
        let pattern = [3.0, -1.0, -2.0, 0.0];
        let values: Vec<f64> = (0..16).map(|t| 10.0 + 2.0 * t as f64 + pattern[t % 4]).collect();
        let d = decompose_additive(&monthly(values), 4).unwrap();
        assert_eq!(d.dates[0], "2022-01-31");
        assert_eq!(d.dates[1], "2022-02-28");
        for t in 0..16 {
            assert!((d.seasonal[t] - pattern[t % 4]).abs() < 1e-9);
        }
        assert_eq!(d.trend[0], 0.0);
        assert_eq!(d.trend[15], 0.0);
        assert!((d.trend[5] - 20.0).abs() < 1e-9);
        assert!(d.residual[5].abs() < 1e-9);
    }

    #[test]
    fn test_too_short() {
        assert!(decompose_additive(&monthly(vec![1.0, 2.0, 3.0]), 2).is_none());
    }
}
