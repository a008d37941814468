//! Dashboard pipeline: refine once, fan the stages out over a bounded
//! worker pool, then run personas and the synthesis over the results.

use crate::algorithms::ForestConfig;
use crate::causal::{CausalNetwork, build_causal_network};
use crate::data::{DatasetSource, RawDataset, RefinedDataset, refine};
use crate::error::MlError;
use crate::finance::{ProfitLoss, SummaryStats, detection_profile, profit_loss, time_series_columns};
use crate::forecast::{ForecastPoint, ForecastReport, ForecastRequest, TimeSeriesDecomposition};
use crate::insights::{
    ChartSuggestion, GrowthSuggestion, PERSONAS, PersonaReport, analysis_context,
    describe_dataset, synthesize,
};
use crate::offload::{AuditResult, Engines, LocalEngine, RemoteEngine};
use crate::segment::DataSegment;
use crate::stats::{
    AnomalyAlert, CorrelationMetric, DataQualityReport, FeatureImportanceMetric,
    feature_importance, top_correlations,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tabula_core::{
    AnalysisConfig, Brain, OffloadClient, OffloadError, PipelineConfig, TabulaConfig,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything the dashboard shows for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub dataset_id: String,
    pub detection_profile: String,
    pub summary_stats: SummaryStats,
    pub profit_loss: Option<ProfitLoss>,
    pub correlations: Vec<CorrelationMetric>,
    pub anomalies: Vec<AnomalyAlert>,
    pub data_quality: Option<DataQualityReport>,
    pub feature_importance: Vec<FeatureImportanceMetric>,
    pub causal: CausalNetwork,
    pub segments: Vec<DataSegment>,
    pub forecast: Option<Vec<ForecastPoint>>,
    pub time_series_decomposition: Option<TimeSeriesDecomposition>,
    pub personas: Vec<PersonaReport>,
    pub charts: Vec<ChartSuggestion>,
    pub growth_suggestions: Vec<GrowthSuggestion>,
}

pub struct Pipeline {
    brain: Arc<Brain>,
    engines: Engines,
    analysis: AnalysisConfig,
    config: PipelineConfig,
}

impl Pipeline {
    /// A pipeline that runs every stage locally.
    pub fn new(brain: Arc<Brain>, analysis: AnalysisConfig, config: PipelineConfig) -> Self {
        let local = local_engine(&brain, &analysis, &config);
        Self {
            brain,
            engines: Engines::local(local),
            analysis,
            config,
        }
    }

    /// Build from configuration, wiring in the offload platform when enabled.
    pub fn from_config(
        config: &TabulaConfig,
        brain: Arc<Brain>,
        source: Arc<dyn DatasetSource>,
    ) -> Self {
        let remote = match OffloadClient::from_config(&config.offload) {
            Ok(client) => {
                info!(app = %config.offload.app_name, "Remote offload enabled");
                Some(RemoteEngine::new(Arc::new(client), source))
            }
            Err(OffloadError::Disabled) => None,
            Err(e) => {
                warn!(error = %e, "Offload client unavailable, running locally");
                None
            }
        };
        let local = local_engine(&brain, &config.analysis, &config.pipeline);
        Self {
            brain,
            engines: Engines::with_remote(remote, local),
            analysis: config.analysis.clone(),
            config: config.pipeline.clone(),
        }
    }

    pub fn with_engines(mut self, engines: Engines) -> Self {
        self.engines = engines;
        self
    }

    fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.analysis.forest_trees,
            seed: self.analysis.random_seed,
            ..ForestConfig::default()
        }
    }

    /// Load a dataset from `source` and run the dashboard pipeline on it.
    pub async fn run_source(
        &self,
        source: &dyn DatasetSource,
        dataset_id: &str,
    ) -> Result<PipelineResult, MlError> {
        let raw = source.load(dataset_id).await?;
        self.run(dataset_id, raw).await
    }

    /// Run the full dashboard pipeline. Stage failures degrade to neutral
    /// values; only an aborted stage task fails the run.
    pub async fn run(&self, dataset_id: &str, raw: RawDataset) -> Result<PipelineResult, MlError> {
        let started = Instant::now();
        let ds = refine_blocking(raw).await?;
        info!(
            dataset_id,
            rows = ds.n_rows(),
            columns = ds.n_cols(),
            "Refined dataset"
        );

        let workers = self.config.worker_count();
        let pool = Arc::new(Semaphore::new(workers));
        debug!(workers, "Starting stage pool");

        let audit = {
            let (engine, ds, id) = (self.engines.audit.clone(), ds.clone(), dataset_id.to_string());
            spawn_stage(&pool, async move { engine.audit(ds, &id).await })
        };
        let correlations = {
            let ds = ds.clone();
            spawn_stage(&pool, blocking_stage("correlations", move || top_correlations(&ds)))
        };
        let importance = {
            let (ds, forest) = (ds.clone(), self.forest_config());
            spawn_stage(
                &pool,
                blocking_stage("feature_importance", move || feature_importance(&ds, &forest)),
            )
        };
        let causal = {
            let ds = ds.clone();
            spawn_stage(&pool, blocking_stage("causal", move || build_causal_network(&ds)))
        };
        let segments = {
            let (engine, ds, id) = (
                self.engines.segmentation.clone(),
                ds.clone(),
                dataset_id.to_string(),
            );
            spawn_stage(&pool, async move { engine.segment(ds, &id).await })
        };
        let forecast = time_series_columns(&ds).map(|(date, value)| {
            debug!(date_column = %date, value_column = %value, "Dashboard forecast columns");
            let request = ForecastRequest::new(date, value).with_horizon(self.analysis.forecast_horizon);
            let (engine, ds, id) = (self.engines.forecast.clone(), ds.clone(), dataset_id.to_string());
            spawn_stage(&pool, async move { engine.forecast(ds, &id, &request).await })
        });

        let audit: Option<AuditResult> = join_stage("audit", audit).await?;
        let correlations = join_stage("correlations", correlations).await?.unwrap_or_default();
        let feature_importance = join_stage("feature_importance", importance).await?.unwrap_or_default();
        let causal = join_stage("causal", causal).await?.unwrap_or_default();
        let segments = join_stage("segmentation", segments).await?.unwrap_or_default();
        let forecast: Option<ForecastReport> = match forecast {
            Some(handle) => join_stage("forecast", handle).await?,
            None => None,
        };

        let (anomalies, data_quality) = match audit {
            Some(AuditResult { anomalies, quality }) => (anomalies, Some(quality)),
            None => (Vec::new(), None),
        };
        let profile = detection_profile(ds.n_rows(), data_quality.as_ref(), anomalies.len());
        let profit_loss = profit_loss(&ds);

        let data_info = describe_dataset(&ds);
        let context = analysis_context(&data_info, profit_loss.as_ref(), &correlations, &anomalies);
        let personas = match self.engines.personas.analyze(&context).await {
            Ok(reports) => reports,
            Err(e) => {
                warn!(error = %e, "Persona analysis failed");
                PERSONAS.iter().map(PersonaReport::unavailable).collect()
            }
        };
        let synthesis = synthesize(
            &self.brain,
            &personas,
            &data_info,
            self.config.language.as_deref(),
        )
        .await;

        let (forecast, time_series_decomposition) = match forecast {
            Some(report) => (Some(report.forecast), report.decomposition),
            None => (None, None),
        };
        info!(
            dataset_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            profile = %profile,
            "Dashboard pipeline complete"
        );

        Ok(PipelineResult {
            dataset_id: dataset_id.to_string(),
            detection_profile: profile,
            summary_stats: SummaryStats::of(&ds),
            profit_loss,
            correlations,
            anomalies,
            data_quality,
            feature_importance,
            causal,
            segments,
            forecast,
            time_series_decomposition,
            personas,
            charts: synthesis.charts,
            growth_suggestions: synthesis.growth_suggestions,
        })
    }

    /// Standalone forecast for an explicit column pair, offloaded when possible.
    pub async fn forecast(
        &self,
        dataset_id: &str,
        raw: RawDataset,
        request: &ForecastRequest,
    ) -> Result<ForecastReport, MlError> {
        let ds = refine_blocking(raw).await?;
        self.engines.forecast.forecast(ds, dataset_id, request).await
    }
}

fn local_engine(brain: &Arc<Brain>, analysis: &AnalysisConfig, config: &PipelineConfig) -> LocalEngine {
    LocalEngine::new(brain.clone())
        .with_decomposition_period(analysis.decomposition_period)
        .with_language(config.language.clone())
        .with_persona_max_tokens(config.persona_max_tokens)
}

async fn refine_blocking(raw: RawDataset) -> Result<Arc<RefinedDataset>, MlError> {
    tokio::task::spawn_blocking(move || refine(&raw))
        .await
        .map(Arc::new)
        .map_err(|e| {
            error!(error = %e, "Refinement task aborted");
            MlError::internal(format!("refinement task failed: {}", e))
        })
}

/// Run `f` on the blocking pool. A panic surfaces as [`MlError::Internal`].
async fn blocking_stage<T, F>(stage: &'static str, f: F) -> Result<T, MlError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MlError::internal(format!("{} task failed: {}", stage, e)))
}

/// Spawn a stage that holds a pool permit while it runs.
fn spawn_stage<T, Fut>(pool: &Arc<Semaphore>, stage: Fut) -> JoinHandle<Result<T, MlError>>
where
    Fut: Future<Output = Result<T, MlError>> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::spawn(async move {
        let _permit = pool
            .acquire_owned()
            .await
            .map_err(|e| MlError::internal(format!("worker pool closed: {}", e)))?;
        stage.await
    })
}

/// Collect a stage result. Ordinary failures become `None`; internal
/// failures and aborted tasks are fatal.
async fn join_stage<T>(
    stage: &'static str,
    handle: JoinHandle<Result<T, MlError>>,
) -> Result<Option<T>, MlError> {
    match handle.await {
        Ok(Ok(value)) => Ok(Some(value)),
        Ok(Err(e @ MlError::Internal(_))) => {
            error!(stage, error = %e, "Stage failed internally");
            Err(e)
        }
        Ok(Err(e)) => {
            warn!(stage, error = %e, "Stage failed, using neutral result");
            Ok(None)
        }
        Err(e) => {
            error!(stage, error = %e, "Stage task aborted");
            Err(MlError::internal(format!("{} task aborted: {}", stage, e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, RawColumn};
    use pretty_assertions::assert_eq;
    use tabula_core::MockLlmProvider;

    fn sales() -> RawDataset {
        let months = 30;
        let dates = (0..months)
            .map(|i| Cell::text(format!("{}-{:02}-15", 2022 + i / 12, i % 12 + 1)))
            .collect();
        let revenue = (0..months)
            .map(|i| Cell::text(format!("${},000", 10 + i % 5)))
            .collect();
        let cost = (0..months).map(|i| Cell::Number(6000.0 + (i % 3) as f64 * 100.0)).collect();
        let units = (0..months).map(|i| Cell::Number((i * 7 % 11) as f64)).collect();
        RawDataset::from_columns(vec![
            RawColumn::new("Date", dates),
            RawColumn::new("Revenue", revenue),
            RawColumn::new("Cost", cost),
            RawColumn::new("units", units),
        ])
        .unwrap()
    }

    fn pipeline(provider: MockLlmProvider) -> Pipeline {
        Pipeline::new(
            Arc::new(Brain::new(Arc::new(provider))),
            AnalysisConfig::default(),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_run_without_llm() {
        let result = pipeline(MockLlmProvider::failing())
            .run("sales", sales())
            .await
            .unwrap();
        assert_eq!(result.dataset_id, "sales");
        assert_eq!(result.summary_stats.total_rows, 30);
        assert_eq!(result.summary_stats.temporal_columns, vec!["Date"]);
        assert!(result.profit_loss.is_some());
        assert!(result.data_quality.is_some());
        assert_eq!(result.forecast.as_ref().map(Vec::len), Some(3));
        assert!(result.time_series_decomposition.is_some());
        assert_eq!(result.personas.len(), 3);
        assert!(result.personas.iter().all(|p| !p.is_available()));
        assert!(result.charts.is_empty());
        assert!(result.detection_profile.starts_with("Micro-Dataset"));
    }

    #[tokio::test]
    async fn test_empty_dataset_is_neutral() {
        let result = pipeline(MockLlmProvider::failing())
            .run("empty", RawDataset::default())
            .await
            .unwrap();
        assert!(result.correlations.is_empty());
        assert!(result.segments.is_empty());
        assert!(result.forecast.is_none());
        assert_eq!(result.data_quality.map(|q| q.score), Some(100.0));
        assert!(result.causal.error.is_some());
    }

    #[tokio::test]
    async fn test_standalone_forecast() {
        let report = pipeline(MockLlmProvider::failing())
            .forecast("sales", sales(), &ForecastRequest::new("Date", "Revenue").with_horizon(6))
            .await
            .unwrap();
        assert_eq!(report.forecast.len(), 6);
        assert_eq!(report.forecast[0].date, "2024-07-31");
    }

    #[tokio::test]
    async fn test_standalone_forecast_bad_column() {
        let ds = RawDataset::from_columns(vec![RawColumn::new("x", vec![Cell::Number(1.0)])]).unwrap();
        let err = pipeline(MockLlmProvider::failing())
            .forecast("x", ds, &ForecastRequest::new("when", "amount"))
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Forecast(_)));
    }
}
