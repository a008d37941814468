//! Exponential smoothing models: Holt linear trend and additive Holt-Winters.
//!
//! Smoothing parameters are picked by grid search on the in-sample
//! one-step-ahead squared error.

use crate::error::MlError;
use crate::stats::mean;

const GRID: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

/// Model family and its smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    Holt { alpha: f64, beta: f64 },
    HoltWinters { alpha: f64, beta: f64, gamma: f64, period: usize },
}

impl Smoothing {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Holt { .. } => "Holt Linear Trend",
            Self::HoltWinters { .. } => "Holt-Winters Additive",
        }
    }
}

/// A fitted model: final state plus the in-sample one-step predictions.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub smoothing: Smoothing,
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    fitted: Vec<f64>,
    n: usize,
}

impl FittedModel {
    pub fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    /// Forecast `horizon` steps past the end of the training data.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        (1..=horizon)
            .map(|k| {
                let base = self.level + k as f64 * self.trend;
                if self.seasonal.is_empty() {
                    base
                } else {
                    base + self.seasonal[(self.n + k - 1) % self.seasonal.len()]
                }
            })
            .collect()
    }
}

fn sse(actual: &[f64], fitted: &[f64], skip: usize) -> f64 {
    actual
        .iter()
        .zip(fitted)
        .skip(skip)
        .map(|(a, f)| (a - f).powi(2))
        .sum()
}

fn run_holt(values: &[f64], alpha: f64, beta: f64) -> FittedModel {
    let mut level = values[0];
    let mut trend = values[1] - values[0];
    let mut fitted = vec![values[0]];
    for &y in &values[1..] {
        fitted.push(level + trend);
        let prev = level;
        level = alpha * y + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev) + (1.0 - beta) * trend;
    }
    FittedModel {
        smoothing: Smoothing::Holt { alpha, beta },
        level,
        trend,
        seasonal: Vec::new(),
        fitted,
        n: values.len(),
    }
}

fn run_holt_winters(values: &[f64], alpha: f64, beta: f64, gamma: f64, period: usize) -> FittedModel {
    let first = mean(&values[..period]);
    let second = mean(&values[period..2 * period]);
    let trend0 = (second - first) / period as f64;
    let center = (period as f64 - 1.0) / 2.0;
    let mut seasonal: Vec<f64> = (0..period)
        .map(|i| values[i] - (first + (i as f64 - center) * trend0))
        .collect();
    // Chosen so the first prediction reproduces the first observation.
    let mut level = first - (center + 1.0) * trend0;
    let mut trend = trend0;

    let mut fitted = Vec::with_capacity(values.len());
    for (t, &y) in values.iter().enumerate() {
        let s = seasonal[t % period];
        fitted.push(level + trend + s);
        let prev = level;
        level = alpha * (y - s) + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev) + (1.0 - beta) * trend;
        seasonal[t % period] = gamma * (y - level) + (1.0 - gamma) * s;
    }
    FittedModel {
        smoothing: Smoothing::HoltWinters {
            alpha,
            beta,
            gamma,
            period,
        },
        level,
        trend,
        seasonal,
        fitted,
        n: values.len(),
    }
}

/// Fit Holt-Winters when `period` is given and at least two full seasons are
/// available, otherwise Holt linear trend. Needs two or more points.
pub fn fit(values: &[f64], period: Option<usize>) -> Result<FittedModel, MlError> {
    if values.len() < 2 {
        return Err(MlError::insufficient(format!(
            "Exponential smoothing needs at least 2 points, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MlError::model("Series contains non-finite values"));
    }

    let mut best: Option<(f64, FittedModel)> = None;
    let mut consider = |model: FittedModel, skip: usize| {
        let score = sse(values, &model.fitted, skip);
        if score.is_finite() && best.as_ref().is_none_or(|(s, _)| score < *s) {
            best = Some((score, model));
        }
    };

    match period.filter(|p| *p >= 2 && values.len() >= 2 * p) {
        Some(p) => {
            for &alpha in GRID {
                for &beta in GRID {
                    for &gamma in GRID {
                        consider(run_holt_winters(values, alpha, beta, gamma, p), 0);
                    }
                }
            }
        }
        None => {
            for &alpha in GRID {
                for &beta in GRID {
                    consider(run_holt(values, alpha, beta), 1);
                }
            }
        }
    }

    best.map(|(_, model)| model)
        .ok_or_else(|| MlError::model("No finite smoothing fit found"))
}
