//! Density-based segmentation with LLM-assigned segment names.

use crate::algorithms::hdbscan::{Hdbscan, NOISE};
use crate::data::RefinedDataset;
use crate::stats::{mean, standardize};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tabula_core::Brain;
use tracing::{debug, warn};

pub const MIN_ROWS: usize = 5;
const HIGH_RATIO: f64 = 1.2;
const LOW_RATIO: f64 = 0.8;
const MAX_TRAITS: usize = 3;

const NOISE_TRAITS: &str = "Outliers or niche cases";
const DEFAULT_TRAITS: &str = "General behavior";
const FALLBACK_STRATEGY: &str = "Monitor and optimize operations";
const SYSTEM_PROMPT: &str =
    "You are a business strategist specializing in market segmentation. Return valid JSON only.";
const TEMPERATURE: f32 = 0.7;

/// A named customer or operations segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSegment {
    pub name: String,
    pub size: usize,
    pub characteristics: String,
    pub growth_strategy: String,
}

/// Deterministic description of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: i32,
    pub size: usize,
    pub traits: String,
}

/// Minimum cluster size: 10% of rows, at least 2, and 2 for fewer than 10 rows.
pub fn min_cluster_size(n_rows: usize) -> usize {
    if n_rows < 10 {
        2
    } else {
        (n_rows / 10).max(2)
    }
}

/// Cluster the numeric columns and summarize each cluster, sorted by id (noise first).
/// Empty when there are fewer than [`MIN_ROWS`] rows or no numeric columns.
pub fn cluster_summaries(ds: &RefinedDataset) -> Vec<ClusterSummary> {
    let numeric = ds.numeric_columns();
    let n = ds.n_rows();
    if numeric.is_empty() || n < MIN_ROWS {
        return Vec::new();
    }

    let scaled: Vec<Vec<f64>> = numeric.iter().map(|(_, v)| standardize(v)).collect();
    let points: Vec<Vec<f64>> = (0..n)
        .map(|r| scaled.iter().map(|col| col[r]).collect())
        .collect();
    let min_size = min_cluster_size(n);
    let labels = Hdbscan::new(min_size).fit(&points);

    let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        members.entry(label).or_default().push(row);
    }
    debug!(rows = n, min_size, clusters = members.len(), "Clustered dataset");

    members
        .into_iter()
        .map(|(id, rows)| {
            let traits = if id == NOISE {
                NOISE_TRAITS.to_string()
            } else {
                describe_traits(&numeric, &rows)
            };
            ClusterSummary {
                id,
                size: rows.len(),
                traits,
            }
        })
        .collect()
}

fn describe_traits(numeric: &[(&str, &[f64])], rows: &[usize]) -> String {
    let traits: Vec<String> = numeric
        .iter()
        .filter_map(|(name, values)| {
            let global = mean(values);
            let cluster = mean(&rows.iter().map(|&r| values[r]).collect::<Vec<_>>());
            if !global.is_finite() || !cluster.is_finite() || global == 0.0 {
                return None;
            }
            if cluster > global * HIGH_RATIO {
                Some(format!("High {}", name))
            } else if cluster < global * LOW_RATIO {
                Some(format!("Low {}", name))
            } else {
                None
            }
        })
        .take(MAX_TRAITS)
        .collect();
    if traits.is_empty() {
        DEFAULT_TRAITS.to_string()
    } else {
        traits.join(", ")
    }
}

fn fallback_segment(summary: &ClusterSummary) -> DataSegment {
    DataSegment {
        name: if summary.id == NOISE {
            "Niche Cases".to_string()
        } else {
            format!("Segment {}", summary.id)
        },
        size: summary.size,
        characteristics: summary.traits.clone(),
        growth_strategy: FALLBACK_STRATEGY.to_string(),
    }
}

/// Deterministic names for every cluster.
pub fn fallback_segments(summaries: &[ClusterSummary]) -> Vec<DataSegment> {
    summaries.iter().map(fallback_segment).collect()
}

fn text_field(entry: &Value, key: &str, default: impl FnOnce() -> String) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default(),
        Some(other) => other.to_string(),
    }
}

/// Map LLM segments onto clusters by position. Clusters without a usable entry
/// keep their deterministic description.
pub fn reconcile(summaries: &[ClusterSummary], response: &Value) -> Vec<DataSegment> {
    let entries = response
        .get("segments")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();
    summaries
        .iter()
        .enumerate()
        .map(|(i, summary)| match entries.get(i) {
            Some(entry) if entry.is_object() => DataSegment {
                name: text_field(entry, "name", || format!("Segment {}", summary.id)),
                size: summary.size,
                characteristics: text_field(entry, "characteristics", || {
                    "Shared characteristics".to_string()
                }),
                growth_strategy: text_field(entry, "growth_strategy", || "Growth plan".to_string()),
            },
            _ => fallback_segment(summary),
        })
        .collect()
}

fn prompt(summaries: &[ClusterSummary]) -> String {
    let clusters = serde_json::to_string_pretty(summaries).unwrap_or_default();
    format!(
        "These clusters came from density-based clustering of a business dataset. \
Give each one a professional business name (for example \"VIP Customers\", \"Emerging Market\" \
or \"High-Cost Operations\"), describe what its members share, and propose a growth strategy. \
Cluster -1 holds outliers and unclassified points. Keep the clusters in the given order.\n\n\
Clusters:\n{}\n\n\
Return JSON:\n{{\"segments\": [{{\"name\": \"...\", \"characteristics\": \"...\", \"growth_strategy\": \"...\"}}]}}",
        clusters
    )
}

/// Ask the LLM to name the clusters, falling back to deterministic names on any failure.
pub async fn label_segments(brain: &Brain, summaries: &[ClusterSummary]) -> Vec<DataSegment> {
    if summaries.is_empty() {
        return Vec::new();
    }
    match brain.ask_json(SYSTEM_PROMPT, &prompt(summaries), TEMPERATURE).await {
        Ok(value) => reconcile(summaries, &value),
        Err(e) => {
            warn!(error = %e, "Segment naming failed, using deterministic names");
            fallback_segments(summaries)
        }
    }
}

/// Full local segmentation: clustering on a blocking thread, then naming.
pub async fn segment(ds: std::sync::Arc<RefinedDataset>, brain: &Brain) -> Vec<DataSegment> {
    let summaries = match tokio::task::spawn_blocking(move || cluster_summaries(&ds)).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Clustering task failed");
            return Vec::new();
        }
    };
    label_segments(brain, &summaries).await
}
