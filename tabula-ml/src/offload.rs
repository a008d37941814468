//! Stage capabilities with local and remote implementations.
//!
//! Each pipeline stage is a capability trait. The local implementation runs
//! in-process; the remote adapter ships the dataset to the offload platform
//! and decodes the JSON result. [`OffloadFallback`] tries the remote side
//! first and falls back to the local side on any error.

use crate::data::{DatasetSource, RefinedDataset};
use crate::error::MlError;
use crate::forecast::{ForecastMetrics, ForecastPoint, ForecastReport, ForecastRequest, run_forecast};
use crate::insights::{PERSONAS, PersonaReport, run_personas};
use crate::segment::{DataSegment, segment};
use crate::stats::{AnomalyAlert, DataQualityReport, data_quality, detect_anomalies};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tabula_core::offload::functions;
use tabula_core::{Brain, OffloadError, RemoteCompute};
use tracing::{debug, info, warn};

/// Anomalies and quality computed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub anomalies: Vec<AnomalyAlert>,
    pub quality: DataQualityReport,
}

#[async_trait]
pub trait SegmentationEngine: Send + Sync {
    async fn segment(
        &self,
        ds: Arc<RefinedDataset>,
        dataset_id: &str,
    ) -> Result<Vec<DataSegment>, MlError>;
}

#[async_trait]
pub trait ForecastEngine: Send + Sync {
    async fn forecast(
        &self,
        ds: Arc<RefinedDataset>,
        dataset_id: &str,
        request: &ForecastRequest,
    ) -> Result<ForecastReport, MlError>;
}

#[async_trait]
pub trait AuditEngine: Send + Sync {
    async fn audit(&self, ds: Arc<RefinedDataset>, dataset_id: &str)
    -> Result<AuditResult, MlError>;
}

#[async_trait]
pub trait PersonaEngine: Send + Sync {
    async fn analyze(&self, context: &str) -> Result<Vec<PersonaReport>, MlError>;
}

// ---------------------------------------------------------------------------
// Local engines
// ---------------------------------------------------------------------------

/// In-process implementation of every stage.
#[derive(Clone)]
pub struct LocalEngine {
    brain: Arc<Brain>,
    decomposition_period: usize,
    language: Option<String>,
    persona_max_tokens: usize,
}

impl LocalEngine {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self {
            brain,
            decomposition_period: 12,
            language: None,
            persona_max_tokens: 800,
        }
    }

    pub fn with_decomposition_period(mut self, period: usize) -> Self {
        self.decomposition_period = period;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_persona_max_tokens(mut self, max_tokens: usize) -> Self {
        self.persona_max_tokens = max_tokens;
        self
    }
}

async fn blocking<T, F>(stage: &str, f: F) -> Result<T, MlError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MlError::internal(format!("{} task failed: {}", stage, e)))
}

#[async_trait]
impl SegmentationEngine for LocalEngine {
    async fn segment(
        &self,
        ds: Arc<RefinedDataset>,
        _dataset_id: &str,
    ) -> Result<Vec<DataSegment>, MlError> {
        Ok(segment(ds, &self.brain).await)
    }
}

#[async_trait]
impl ForecastEngine for LocalEngine {
    async fn forecast(
        &self,
        ds: Arc<RefinedDataset>,
        _dataset_id: &str,
        request: &ForecastRequest,
    ) -> Result<ForecastReport, MlError> {
        let request = request.clone();
        let period = self.decomposition_period;
        blocking("forecast", move || run_forecast(&ds, &request, period)).await?
    }
}

#[async_trait]
impl AuditEngine for LocalEngine {
    async fn audit(
        &self,
        ds: Arc<RefinedDataset>,
        _dataset_id: &str,
    ) -> Result<AuditResult, MlError> {
        blocking("audit", move || AuditResult {
            anomalies: detect_anomalies(&ds),
            quality: data_quality(&ds),
        })
        .await
    }
}

#[async_trait]
impl PersonaEngine for LocalEngine {
    async fn analyze(&self, context: &str) -> Result<Vec<PersonaReport>, MlError> {
        Ok(run_personas(
            &self.brain,
            context,
            self.language.as_deref(),
            self.persona_max_tokens,
        )
        .await)
    }
}

// ---------------------------------------------------------------------------
// Remote engines
// ---------------------------------------------------------------------------

/// Adapter that runs stages on the offload platform.
#[derive(Clone)]
pub struct RemoteEngine {
    compute: Arc<dyn RemoteCompute>,
    source: Arc<dyn DatasetSource>,
}

impl RemoteEngine {
    pub fn new(compute: Arc<dyn RemoteCompute>, source: Arc<dyn DatasetSource>) -> Self {
        Self { compute, source }
    }

    /// Make sure the platform holds the dataset, then invoke `function`.
    async fn call(&self, dataset_id: &str, function: &str, params: Value) -> Result<Value, MlError> {
        let bytes = self.source.read_bytes(dataset_id).await?.ok_or_else(|| {
            MlError::dataset(format!("Dataset '{}' has no file form to upload", dataset_id))
        })?;
        self.compute.sync_blob(dataset_id, &bytes).await?;

        let mut payload = json!({ "dataset_id": dataset_id });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), params) {
            target.extend(extra);
        }
        info!(dataset_id, function, "Offloading stage");
        Ok(self.compute.invoke(function, payload).await?)
    }
}

fn decode<T: serde::de::DeserializeOwned>(function: &str, value: Value) -> Result<T, MlError> {
    serde_json::from_value(value).map_err(|e| {
        OffloadError::Decode {
            message: format!("{}: {}", function, e),
        }
        .into()
    })
}

/// The field `key` of an object result, or the whole value when it is not an object.
fn unwrap_field(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

#[async_trait]
impl SegmentationEngine for RemoteEngine {
    async fn segment(
        &self,
        _ds: Arc<RefinedDataset>,
        dataset_id: &str,
    ) -> Result<Vec<DataSegment>, MlError> {
        let result = self.call(dataset_id, functions::SEGMENTATION, json!({})).await?;
        decode(functions::SEGMENTATION, unwrap_field(result, "segments"))
    }
}

#[async_trait]
impl ForecastEngine for RemoteEngine {
    async fn forecast(
        &self,
        _ds: Arc<RefinedDataset>,
        dataset_id: &str,
        request: &ForecastRequest,
    ) -> Result<ForecastReport, MlError> {
        let params = json!({
            "date_col": request.date_column,
            "value_col": request.value_column,
            "horizon": request.horizon,
        });
        let mut result = self.call(dataset_id, functions::FORECAST, params).await?;
        let forecast: Vec<ForecastPoint> = decode(
            functions::FORECAST,
            result.get_mut("forecast").map(Value::take).unwrap_or_default(),
        )?;
        let metrics = match result.get_mut("metrics").map(Value::take) {
            Some(m) if !m.is_null() => decode(functions::FORECAST, m)?,
            _ => ForecastMetrics::unavailable(),
        };
        let decomposition = match result.get_mut("decomposition").map(Value::take) {
            Some(d) if !d.is_null() => Some(decode(functions::FORECAST, d)?),
            _ => None,
        };
        Ok(ForecastReport {
            forecast,
            metrics,
            decomposition,
        })
    }
}

#[async_trait]
impl AuditEngine for RemoteEngine {
    async fn audit(
        &self,
        _ds: Arc<RefinedDataset>,
        dataset_id: &str,
    ) -> Result<AuditResult, MlError> {
        let result = self.call(dataset_id, functions::DATA_AUDIT, json!({})).await?;
        decode(functions::DATA_AUDIT, result)
    }
}

#[async_trait]
impl PersonaEngine for RemoteEngine {
    async fn analyze(&self, context: &str) -> Result<Vec<PersonaReport>, MlError> {
        let personas: Vec<Value> = PERSONAS
            .iter()
            .map(|p| json!({ "role": p.role, "focus": p.focus }))
            .collect();
        let payload = json!({ "personas": personas, "context": context });
        let result = self
            .compute
            .invoke(functions::AGENT_ANALYSIS, payload)
            .await?;
        let analyses: Vec<String> =
            decode(functions::AGENT_ANALYSIS, unwrap_field(result, "analyses"))?;
        if analyses.len() != PERSONAS.len() {
            return Err(OffloadError::Decode {
                message: format!(
                    "{}: expected {} analyses, got {}",
                    functions::AGENT_ANALYSIS,
                    PERSONAS.len(),
                    analyses.len()
                ),
            }
            .into());
        }
        Ok(PERSONAS
            .iter()
            .zip(analyses)
            .map(|(p, analysis)| PersonaReport {
                persona: p.key.to_string(),
                role: p.role.to_string(),
                analysis,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fallback decorator
// ---------------------------------------------------------------------------

/// Try `remote` when present, otherwise or on error run `local`.
pub struct OffloadFallback<R, L> {
    remote: Option<R>,
    local: L,
}

impl<R, L> OffloadFallback<R, L> {
    pub fn new(remote: Option<R>, local: L) -> Self {
        Self { remote, local }
    }

    pub fn local_only(local: L) -> Self {
        Self {
            remote: None,
            local,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

fn log_fallback(stage: &str, error: &MlError) {
    warn!(stage, error = %error, "Remote execution failed, using local fallback");
}

#[async_trait]
impl<R: SegmentationEngine, L: SegmentationEngine> SegmentationEngine for OffloadFallback<R, L> {
    async fn segment(
        &self,
        ds: Arc<RefinedDataset>,
        dataset_id: &str,
    ) -> Result<Vec<DataSegment>, MlError> {
        if let Some(remote) = &self.remote {
            match remote.segment(ds.clone(), dataset_id).await {
                Ok(segments) => {
                    debug!(count = segments.len(), "Received remote segments");
                    return Ok(segments);
                }
                Err(e) => log_fallback("segmentation", &e),
            }
        }
        self.local.segment(ds, dataset_id).await
    }
}

#[async_trait]
impl<R: ForecastEngine, L: ForecastEngine> ForecastEngine for OffloadFallback<R, L> {
    async fn forecast(
        &self,
        ds: Arc<RefinedDataset>,
        dataset_id: &str,
        request: &ForecastRequest,
    ) -> Result<ForecastReport, MlError> {
        if let Some(remote) = &self.remote {
            match remote.forecast(ds.clone(), dataset_id, request).await {
                Ok(report) => return Ok(report),
                Err(e) => log_fallback("forecast", &e),
            }
        }
        self.local.forecast(ds, dataset_id, request).await
    }
}

#[async_trait]
impl<R: AuditEngine, L: AuditEngine> AuditEngine for OffloadFallback<R, L> {
    async fn audit(
        &self,
        ds: Arc<RefinedDataset>,
        dataset_id: &str,
    ) -> Result<AuditResult, MlError> {
        if let Some(remote) = &self.remote {
            match remote.audit(ds.clone(), dataset_id).await {
                Ok(result) => return Ok(result),
                Err(e) => log_fallback("audit", &e),
            }
        }
        self.local.audit(ds, dataset_id).await
    }
}

#[async_trait]
impl<R: PersonaEngine, L: PersonaEngine> PersonaEngine for OffloadFallback<R, L> {
    async fn analyze(&self, context: &str) -> Result<Vec<PersonaReport>, MlError> {
        if let Some(remote) = &self.remote {
            match remote.analyze(context).await {
                Ok(reports) => return Ok(reports),
                Err(e) => log_fallback("personas", &e),
            }
        }
        self.local.analyze(context).await
    }
}

/// The four stage engines the pipeline runs.
#[derive(Clone)]
pub struct Engines {
    pub segmentation: Arc<dyn SegmentationEngine>,
    pub forecast: Arc<dyn ForecastEngine>,
    pub audit: Arc<dyn AuditEngine>,
    pub personas: Arc<dyn PersonaEngine>,
}

impl Engines {
    pub fn local(local: LocalEngine) -> Self {
        Self::with_remote(None, local)
    }

    /// Every stage wrapped in [`OffloadFallback`] around the same adapters.
    pub fn with_remote(remote: Option<RemoteEngine>, local: LocalEngine) -> Self {
        Self {
            segmentation: Arc::new(OffloadFallback::new(remote.clone(), local.clone())),
            forecast: Arc::new(OffloadFallback::new(remote.clone(), local.clone())),
            audit: Arc::new(OffloadFallback::new(remote.clone(), local.clone())),
            personas: Arc::new(OffloadFallback::new(remote, local)),
        }
    }
}
