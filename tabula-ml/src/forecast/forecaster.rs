//! Monthly forecaster with an explicit load → train → predict lifecycle.

use super::decompose::{TimeSeriesDecomposition, decompose_additive, effective_period};
use super::holt_winters::{self, FittedModel};
use super::series::{MonthlySeries, monthly_series};
use crate::data::RefinedDataset;
use crate::data::dates::add_months_end;
use crate::error::MlError;
use crate::stats::{mean, round_to};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Seasonal terms need this many monthly points.
pub const SEASONAL_MIN_POINTS: usize = 24;
const SEASON_LENGTH: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: String,
    #[serde(alias = "price")]
    pub value: f64,
}

/// In-sample fit quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    #[serde(alias = "MAE")]
    pub mae: f64,
    #[serde(alias = "R2_Score")]
    pub r2_score: f64,
    #[serde(alias = "Model")]
    pub model: String,
}

impl ForecastMetrics {
    /// Neutral metrics reported when no model could be fitted.
    pub fn unavailable() -> Self {
        Self {
            mae: 0.0,
            r2_score: 0.0,
            model: "None".to_string(),
        }
    }
}

/// A standalone forecast for an explicit column pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub date_column: String,
    pub value_column: String,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
}

fn default_horizon() -> usize {
    3
}

impl ForecastRequest {
    pub fn new(date_column: impl Into<String>, value_column: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
            value_column: value_column.into(),
            horizon: default_horizon(),
        }
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub forecast: Vec<ForecastPoint>,
    pub metrics: ForecastMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decomposition: Option<TimeSeriesDecomposition>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Unloaded,
    Loaded(MonthlySeries),
    Trained {
        series: MonthlySeries,
        model: Option<FittedModel>,
    },
}

/// Forecaster over one monthly series.
#[derive(Debug, Default)]
pub struct Forecaster {
    state: State,
}

impl Forecaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and aggregate a (date, value) column pair. Resets any trained model.
    pub fn load(
        &mut self,
        ds: &RefinedDataset,
        date_column: &str,
        value_column: &str,
    ) -> Result<&MonthlySeries, MlError> {
        let series = monthly_series(ds, date_column, value_column)?;
        info!(months = series.len(), "Loaded monthly series");
        self.state = State::Loaded(series);
        self.series()
            .ok_or_else(|| MlError::internal("series missing right after load"))
    }

    pub fn series(&self) -> Option<&MonthlySeries> {
        match &self.state {
            State::Unloaded => None,
            State::Loaded(series) | State::Trained { series, .. } => Some(series),
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, State::Trained { .. })
    }

    /// Fit the smoothing model. A failed fit is not an error: the metrics
    /// come back neutral and predictions fall back to a flat line.
    pub fn train(&mut self) -> Result<ForecastMetrics, MlError> {
        let series = match std::mem::take(&mut self.state) {
            State::Unloaded => {
                return Err(MlError::invalid_state("Data not loaded. Call load() first."));
            }
            State::Loaded(series) | State::Trained { series, .. } => series,
        };

        let period = (series.len() >= SEASONAL_MIN_POINTS).then_some(SEASON_LENGTH);
        let (model, metrics) = match holt_winters::fit(&series.values, period) {
            Ok(model) => {
                let metrics = evaluate(&series.values, &model);
                debug!(model = %metrics.model, mae = metrics.mae, r2 = metrics.r2_score, "Trained forecaster");
                (Some(model), metrics)
            }
            Err(e) => {
                warn!(error = %e, "Forecast model unavailable, using neutral metrics");
                (None, ForecastMetrics::unavailable())
            }
        };
        self.state = State::Trained { series, model };
        Ok(metrics)
    }

    /// Forecast `months` month ends after the last observation.
    pub fn predict_next(&self, months: usize) -> Result<Vec<ForecastPoint>, MlError> {
        let State::Trained { series, model } = &self.state else {
            return Err(MlError::invalid_state("Model not trained. Call train() first."));
        };
        let (last_date, last_value) = series
            .last()
            .ok_or_else(|| MlError::forecast("Monthly series is empty"))?;

        let predicted = model
            .as_ref()
            .map(|m| m.forecast(months))
            .filter(|values| values.iter().all(|v| v.is_finite()));
        let values = match predicted {
            Some(values) => values,
            None => {
                warn!(months, "Forecast unavailable, projecting last value");
                vec![last_value; months]
            }
        };

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(i, value)| ForecastPoint {
                date: add_months_end(last_date, i as u32 + 1)
                    .format("%Y-%m-%d")
                    .to_string(),
                value: round_to(value, 2),
            })
            .collect())
    }

    /// Additive decomposition, downgrading the period to fit the history.
    /// `None` when the series is too short.
    pub fn decompose(&self, period: usize) -> Result<Option<TimeSeriesDecomposition>, MlError> {
        let series = self
            .series()
            .ok_or_else(|| MlError::invalid_state("Data not loaded. Call load() first."))?;
        let Some(actual) = effective_period(period, series.len()) else {
            warn!(months = series.len(), "Series too short for decomposition");
            return Ok(None);
        };
        if actual != period {
            debug!(requested = period, actual, "Downgraded decomposition period");
        }
        Ok(decompose_additive(series, actual))
    }
}

fn evaluate(actual: &[f64], model: &FittedModel) -> ForecastMetrics {
    let fitted = model.fitted_values();
    let n = actual.len();
    let mae = actual
        .iter()
        .zip(fitted)
        .map(|(a, f)| (a - f).abs())
        .sum::<f64>()
        / n as f64;
    ForecastMetrics {
        mae: round_to(mae, 4),
        r2_score: if n > 1 { round_to(r2_score(actual, fitted), 4) } else { 0.0 },
        model: model.smoothing.name().to_string(),
    }
}

/// Coefficient of determination; a constant target scores 1 only on a perfect fit.
fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let m = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - m).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Load, train, predict and decompose in one go.
pub fn run_forecast(
    ds: &RefinedDataset,
    request: &ForecastRequest,
    decomposition_period: usize,
) -> Result<ForecastReport, MlError> {
    let mut forecaster = Forecaster::new();
    forecaster.load(ds, &request.date_column, &request.value_column)?;
    let metrics = forecaster.train()?;
    let forecast = forecaster.predict_next(request.horizon)?;
    let decomposition = forecaster.decompose(decomposition_period)?;
    Ok(ForecastReport {
        forecast,
        metrics,
        decomposition,
    })
}
