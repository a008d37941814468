//! Monthly time-series forecasting and seasonal decomposition.

pub mod decompose;
pub mod forecaster;
pub mod holt_winters;
pub mod series;

pub use decompose::{TimeSeriesDecomposition, effective_period};
pub use forecaster::{
    ForecastMetrics, ForecastPoint, ForecastReport, ForecastRequest, Forecaster, run_forecast,
};
pub use series::{MonthlySeries, monthly_series, resolve_column};
